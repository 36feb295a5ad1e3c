//! Sort order.

use std::cmp::Ordering;

/// Order lines are sorted in. Fixed for the whole run.
///
/// Lines compare with the natural [`Ord`] of [`String`], i.e. byte lexicographic order,
/// which for UTF-8 text is the same as code point order. No locale rules are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

impl Order {
    /// Returns [`Order::Descending`] if `reverse` is set, [`Order::Ascending`] otherwise.
    pub fn from_reverse(reverse: bool) -> Self {
        if reverse {
            Order::Descending
        } else {
            Order::Ascending
        }
    }

    pub fn is_reversed(&self) -> bool {
        *self == Order::Descending
    }

    /// Compares two items. [`Ordering::Less`] means `a` goes to the output before `b`.
    pub fn compare<T: Ord + ?Sized>(&self, a: &T, b: &T) -> Ordering {
        match self {
            Order::Ascending => a.cmp(b),
            Order::Descending => a.cmp(b).reverse(),
        }
    }
}
