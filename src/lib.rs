//! `ext-line-sort` sorts text files that do not fit in memory.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. Sorting is achieved in two passes. During the
//! first pass it sorts batches of lines that each fit in RAM, during the second pass it merges the sorted batches
//! together. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! * **Bounded memory:**
//!   at most one batch of lines is held while batches are produced, and at most one line per batch
//!   while they are merged.
//! * **Whole line ordering:**
//!   lines are compared byte by byte, either ascending or descending.
//! * **Pluggable transport:**
//!   input, output and batch files can be plain text or LZ4 compressed.
//! * **Isolated runs:**
//!   every run stores its batches in a freshly created, randomly named working directory.
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io::prelude::*;
//! use std::path;
//!
//! use ext_line_sort::{ExternalSorter, ExternalSorterBuilder, Transport};
//!
//! fn main() {
//!     let input = Transport::Plain.reader(fs::File::open("input.txt").unwrap(), None);
//!     let output = Transport::Plain.writer(fs::File::create("output.txt").unwrap(), None);
//!
//!     let sorter: ExternalSorter = ExternalSorterBuilder::new()
//!         .with_tmp_dir(path::Path::new("./tmp"))
//!         .with_batch_capacity(100_000)
//!         .with_reverse(false)
//!         .build()
//!         .unwrap();
//!
//!     let summary = sorter.sort(input.lines(), output).unwrap();
//!     println!("{} lines sorted in {} batches", summary.lines, summary.batches);
//! }
//! ```

use std::error::Error;
use std::path::Path;

pub mod buffer;
pub mod merger;
pub mod order;
pub mod sort;
pub mod store;
pub mod transport;

pub use buffer::{LimitedBuffer, LimitedBufferBuilder};
pub use merger::{BinaryHeapMerger, MergeError};
pub use order::Order;
pub use sort::{ConfigError, ExternalSorter, ExternalSorterBuilder, SortConfig, SortError, SortSummary};
pub use store::{BatchHandle, BatchReader, BatchStore};
pub use transport::{LineSink, Transport, TransportReader, TransportWriter};

/// Sorts `source` into `sink` using default settings for everything but the given parameters.
///
/// # Arguments
/// * `source` - Input lines
/// * `sink` - Sink sorted lines are written to, finished on success only
/// * `capacity` - Maximum number of lines per batch, non-positive means unbounded
/// * `reverse` - Sort in descending order
/// * `tmp_dir` - Directory the run's working directory is created in
pub fn external_sort<I, E, S>(
    source: I,
    sink: S,
    capacity: i64,
    reverse: bool,
    tmp_dir: &Path,
) -> Result<SortSummary, SortError<E>>
where
    I: IntoIterator<Item = Result<String, E>>,
    E: Error,
    S: LineSink,
{
    let sorter = ExternalSorterBuilder::new()
        .with_batch_capacity(capacity)
        .with_reverse(reverse)
        .with_tmp_dir(tmp_dir)
        .build()?;

    sorter.sort(source, sink)
}
