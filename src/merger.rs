//! Binary heap merger.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::error::Error;
use std::fmt::{self, Debug, Display};

use crate::order::Order;

/// Merging error.
#[derive(Debug)]
pub enum MergeError<E: Error> {
    /// A source failed to produce its next item.
    Source { index: usize, error: E },
    /// The working set ran empty while some sources were not exhausted yet.
    Underflow { pending: usize },
}

impl<E: Error + 'static> Error for MergeError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            MergeError::Source { error, .. } => Some(error),
            MergeError::Underflow { .. } => None,
        }
    }
}

impl<E: Error> Display for MergeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            MergeError::Source { index, error } => write!(f, "source {} read failed: {}", index, error),
            MergeError::Underflow { pending } => {
                write!(f, "merge working set is empty but {} sources are not exhausted", pending)
            }
        }
    }
}

/// Head item of one source.
struct HeapItem<T> {
    item: T,
    idx: usize,
    order: Order,
}

impl<T: Ord> Ord for HeapItem<T> {
    // binary heap is a max-heap, so the item to be emitted next has to compare greatest
    fn cmp(&self, other: &Self) -> Ordering {
        self.order
            .compare(&other.item, &self.item)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

impl<T: Ord> PartialOrd for HeapItem<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> PartialEq for HeapItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: Ord> Eq for HeapItem<T> {}

/// Binary heap merger implementation.
/// Merges multiple sorted inputs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of items,
/// *n* is the number of chunks (inputs). At most *n* items are held in memory at once.
///
/// Equal items coming from different sources are emitted lowest source index first.
/// After the first error the merger yields nothing more.
pub struct BinaryHeapMerger<T, E, C>
where
    T: Ord,
    E: Error,
    C: Iterator<Item = Result<T, E>>,
{
    items: BinaryHeap<HeapItem<T>>,
    chunks: Vec<C>,
    exhausted: Vec<bool>,
    order: Order,
    initiated: bool,
    failed: bool,
}

impl<T, E, C> BinaryHeapMerger<T, E, C>
where
    T: Ord,
    E: Error,
    C: Iterator<Item = Result<T, E>>,
{
    /// Creates an instance of a binary heap merger using chunks as inputs.
    /// Chunk items should be sorted in `order` otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `chunks` - Chunks to be merged in a single sorted one
    /// * `order` - Order the chunks are sorted in
    pub fn new<I>(chunks: I, order: Order) -> Self
    where
        I: IntoIterator,
        I::Item: IntoIterator<IntoIter = C, Item = Result<T, E>>,
    {
        let chunks = Vec::from_iter(chunks.into_iter().map(|c| c.into_iter()));
        let items = BinaryHeap::with_capacity(chunks.len());
        let exhausted = vec![false; chunks.len()];

        return BinaryHeapMerger {
            chunks,
            items,
            exhausted,
            order,
            initiated: false,
            failed: false,
        };
    }

    /// Number of sources that still have items.
    pub fn pending(&self) -> usize {
        self.exhausted.iter().filter(|exhausted| !**exhausted).count()
    }

    /// Reads the next head of the `idx`-th chunk into the working set.
    fn advance(&mut self, idx: usize) -> Result<(), MergeError<E>> {
        match self.chunks[idx].next() {
            Some(Ok(item)) => self.items.push(HeapItem {
                item,
                idx,
                order: self.order,
            }),
            Some(Err(error)) => return Err(MergeError::Source { index: idx, error }),
            None => self.exhausted[idx] = true,
        }

        return Ok(());
    }

    fn fail(&mut self, err: MergeError<E>) -> Option<Result<T, MergeError<E>>> {
        self.failed = true;
        return Some(Err(err));
    }
}

impl<T, E, C> Iterator for BinaryHeapMerger<T, E, C>
where
    T: Ord,
    E: Error,
    C: Iterator<Item = Result<T, E>>,
{
    type Item = Result<T, MergeError<E>>;

    /// Returns the next item from the inputs in the merger order.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        if !self.initiated {
            for idx in 0..self.chunks.len() {
                if let Err(err) = self.advance(idx) {
                    return self.fail(err);
                }
            }
            self.initiated = true;
        }

        let head = match self.items.pop() {
            Some(head) => head,
            None => {
                let pending = self.pending();
                if pending > 0 {
                    return self.fail(MergeError::Underflow { pending });
                }
                return None;
            }
        };

        if let Err(err) = self.advance(head.idx) {
            return self.fail(err);
        }

        return Some(Ok(head.item));
    }
}

impl<T, E, C> Debug for BinaryHeapMerger<T, E, C>
where
    T: Ord,
    E: Error,
    C: Iterator<Item = Result<T, E>>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryHeapMerger")
            .field("order", &self.order)
            .field("sources", &self.chunks.len())
            .field("pending", &self.pending())
            .field("heads", &self.items.len())
            .finish()
    }
}
