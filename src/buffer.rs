//! Line-count limited batch buffer.

use crate::order::Order;

/// Upper bound of the memory reserved up front by a preallocating buffer.
const MAX_PREALLOCATED_ITEMS: usize = 1 << 20;

/// Limited buffer builder.
#[derive(Debug, Clone)]
pub struct LimitedBufferBuilder {
    buffer_limit: usize,
    preallocate: bool,
}

impl LimitedBufferBuilder {
    pub fn new(buffer_limit: usize, preallocate: bool) -> Self {
        LimitedBufferBuilder {
            buffer_limit,
            preallocate,
        }
    }

    /// Creates a builder from a batch capacity. Non-positive capacity means the buffer is unbounded.
    pub fn from_capacity(capacity: i64) -> Self {
        if capacity <= 0 {
            return LimitedBufferBuilder::default();
        }

        LimitedBufferBuilder::new(usize::try_from(capacity).unwrap_or(usize::MAX), true)
    }

    pub fn limit(&self) -> usize {
        self.buffer_limit
    }

    pub fn is_unbounded(&self) -> bool {
        self.buffer_limit == usize::MAX
    }

    /// Creates a new empty buffer.
    pub fn build<T>(&self) -> LimitedBuffer<T> {
        if self.preallocate && !self.is_unbounded() {
            LimitedBuffer::with_capacity(self.buffer_limit, self.buffer_limit.min(MAX_PREALLOCATED_ITEMS))
        } else {
            LimitedBuffer::new(self.buffer_limit)
        }
    }
}

impl Default for LimitedBufferBuilder {
    fn default() -> Self {
        LimitedBufferBuilder {
            buffer_limit: usize::MAX,
            preallocate: false,
        }
    }
}

/// Buffer limited by elements count.
#[derive(Debug)]
pub struct LimitedBuffer<T> {
    limit: usize,
    inner: Vec<T>,
}

impl<T> LimitedBuffer<T> {
    pub fn new(limit: usize) -> Self {
        LimitedBuffer {
            limit,
            inner: Vec::new(),
        }
    }

    pub fn with_capacity(limit: usize, capacity: usize) -> Self {
        LimitedBuffer {
            limit,
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Adds a new element to the buffer.
    pub fn push(&mut self, item: T) {
        self.inner.push(item);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.limit
    }
}

impl<T: Ord> LimitedBuffer<T> {
    /// Sorts the buffer in place. Equal items carry no identity, so the sort is not stable.
    pub fn sort_by_order(&mut self, order: Order) {
        self.inner.sort_unstable_by(|a, b| order.compare(a, b));
    }
}

impl<T> IntoIterator for LimitedBuffer<T> {
    type Item = T;
    type IntoIter = <Vec<T> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}
