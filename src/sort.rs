//! External sorter.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::buffer::{LimitedBuffer, LimitedBufferBuilder};
use crate::merger::{BinaryHeapMerger, MergeError};
use crate::order::Order;
use crate::store::{BatchHandle, BatchStore};
use crate::transport::{LineSink, Transport};

/// Default number of lines per batch.
pub const DEFAULT_BATCH_CAPACITY: i64 = 1_000_000;
/// Default parent of the per-run working directories.
pub const DEFAULT_TMP_DIR: &str = "tmp";
/// Default working directory name prefix.
pub const DEFAULT_DIR_PREFIX: &str = "t";
pub const DEFAULT_BATCH_NAME_PREFIX: &str = "batch-";
pub const DEFAULT_BATCH_NAME_SUFFIX: &str = ".txt";
/// Default number of working directory names tried before giving up.
pub const DEFAULT_MAX_DIR_ATTEMPTS: u32 = 128;

/// Invalid sorter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl Error for ConfigError {}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sorting error.
#[derive(Debug)]
pub enum SortError<I: Error> {
    /// Invalid configuration.
    Config(ConfigError),
    /// Working directory creation error.
    TempDir(io::Error),
    /// Common I/O error: batch creation, opening or output writing.
    IO(io::Error),
    /// Input data stream error.
    InputError(I),
    /// Batch reading error.
    BatchRead { batch: u64, source: io::Error },
    /// Merge working set ran empty before all batches were exhausted.
    MergeUnderflow { pending: usize },
    /// Merge emitted a different number of lines than the batches hold.
    LineCountMismatch { expected: u64, merged: u64 },
}

impl<I: Error> From<ConfigError> for SortError<I> {
    fn from(err: ConfigError) -> Self {
        SortError::Config(err)
    }
}

impl<I> Error for SortError<I>
where
    I: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::Config(err) => Some(err),
            SortError::TempDir(err) => Some(err),
            SortError::IO(err) => Some(err),
            SortError::InputError(err) => Some(err),
            SortError::BatchRead { source, .. } => Some(source),
            SortError::MergeUnderflow { .. } => None,
            SortError::LineCountMismatch { .. } => None,
        }
    }
}

impl<I: Error> Display for SortError<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::Config(err) => write!(f, "invalid configuration: {}", err),
            SortError::TempDir(err) => write!(f, "working directory not created: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::InputError(err) => write!(f, "input data stream error: {}", err),
            SortError::BatchRead { batch, source } => write!(f, "batch {} reading error: {}", batch, source),
            SortError::MergeUnderflow { pending } => {
                write!(f, "merge ran out of lines with {} batches not exhausted", pending)
            }
            SortError::LineCountMismatch { expected, merged } => {
                write!(f, "merged {} lines while batches hold {}", merged, expected)
            }
        }
    }
}

/// Run configuration. Built by [`ExternalSorterBuilder`] and never changed afterwards.
#[derive(Debug, Clone)]
pub struct SortConfig {
    pub(crate) batch_capacity: i64,
    pub(crate) order: Order,
    pub(crate) tmp_dir: PathBuf,
    pub(crate) dir_prefix: String,
    pub(crate) max_dir_attempts: u32,
    pub(crate) batch_name_prefix: String,
    pub(crate) batch_name_suffix: String,
    pub(crate) batch_transport: Transport,
    pub(crate) rw_buf_size: Option<usize>,
}

impl SortConfig {
    /// Maximum number of lines per batch, non-positive means unbounded.
    pub fn batch_capacity(&self) -> i64 {
        self.batch_capacity
    }

    pub fn order(&self) -> Order {
        self.order
    }

    /// Parent of the per-run working directories.
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    pub fn batch_transport(&self) -> Transport {
        self.batch_transport
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tmp_dir.as_os_str().is_empty() {
            return Err(ConfigError("temporary directory path is empty".to_string()));
        }
        if self.max_dir_attempts == 0 {
            return Err(ConfigError("working directory attempts number must be positive".to_string()));
        }
        if self.rw_buf_size == Some(0) {
            return Err(ConfigError("read/write buffer size must be positive".to_string()));
        }

        for (what, name) in [
            ("working directory prefix", &self.dir_prefix),
            ("batch name prefix", &self.batch_name_prefix),
            ("batch name suffix", &self.batch_name_suffix),
        ] {
            if name.contains(std::path::is_separator) {
                return Err(ConfigError(format!("{} {:?} contains a path separator", what, name)));
            }
        }

        return Ok(());
    }
}

impl Default for SortConfig {
    fn default() -> Self {
        SortConfig {
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            order: Order::Ascending,
            tmp_dir: PathBuf::from(DEFAULT_TMP_DIR),
            dir_prefix: DEFAULT_DIR_PREFIX.to_string(),
            max_dir_attempts: DEFAULT_MAX_DIR_ATTEMPTS,
            batch_name_prefix: DEFAULT_BATCH_NAME_PREFIX.to_string(),
            batch_name_suffix: DEFAULT_BATCH_NAME_SUFFIX.to_string(),
            batch_transport: Transport::Lz4,
            rw_buf_size: None,
        }
    }
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Debug, Clone, Default)]
pub struct ExternalSorterBuilder {
    config: SortConfig,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter, ConfigError> {
        ExternalSorter::new(self.config)
    }

    /// Sets maximum number of lines per batch. Non-positive capacity means the whole input is a single batch.
    pub fn with_batch_capacity(mut self, capacity: i64) -> ExternalSorterBuilder {
        self.config.batch_capacity = capacity;
        return self;
    }

    pub fn with_order(mut self, order: Order) -> ExternalSorterBuilder {
        self.config.order = order;
        return self;
    }

    /// Sets descending order if `reverse` is set.
    pub fn with_reverse(self, reverse: bool) -> ExternalSorterBuilder {
        self.with_order(Order::from_reverse(reverse))
    }

    /// Sets directory the per-run working directories are created in.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder {
        self.config.tmp_dir = path.into();
        return self;
    }

    /// Sets transport batches are stored with.
    pub fn with_batch_transport(mut self, transport: Transport) -> ExternalSorterBuilder {
        self.config.batch_transport = transport;
        return self;
    }

    /// Sets batch file read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder {
        self.config.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets batch file name prefix and suffix.
    pub fn with_batch_naming(mut self, prefix: &str, suffix: &str) -> ExternalSorterBuilder {
        self.config.batch_name_prefix = prefix.to_string();
        self.config.batch_name_suffix = suffix.to_string();
        return self;
    }

    /// Sets working directory name prefix.
    pub fn with_dir_prefix(mut self, prefix: &str) -> ExternalSorterBuilder {
        self.config.dir_prefix = prefix.to_string();
        return self;
    }

    /// Sets number of working directory names tried before the run fails.
    pub fn with_max_dir_attempts(mut self, attempts: u32) -> ExternalSorterBuilder {
        self.config.max_dir_attempts = attempts;
        return self;
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSummary {
    /// Working directory holding the run's batches. Left in place.
    pub working_dir: PathBuf,
    /// Number of batches produced.
    pub batches: usize,
    /// Number of lines written to the sink.
    pub lines: u64,
}

/// External sorter.
#[derive(Debug, Clone)]
pub struct ExternalSorter {
    config: SortConfig,
    buffer_builder: LimitedBufferBuilder,
}

impl ExternalSorter {
    /// Creates a new external sorter instance from a validated configuration.
    pub fn new(config: SortConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let buffer_builder = LimitedBufferBuilder::from_capacity(config.batch_capacity());
        if buffer_builder.is_unbounded() {
            log::info!("using unbounded batches");
        } else {
            log::info!("using a batch size of {} lines", buffer_builder.limit());
        }
        log::info!(
            "sorting in {} order, batches go under {} ({:?} transport)",
            if config.order().is_reversed() { "descending" } else { "ascending" },
            config.tmp_dir().display(),
            config.batch_transport()
        );

        return Ok(ExternalSorter { config, buffer_builder });
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Sorts lines from the input into the sink.
    ///
    /// Every call is a separate run with its own working directory. The sink is finished
    /// only if the whole run succeeds, on error it has to be considered incomplete.
    ///
    /// # Arguments
    /// * `input` - Input lines to be sorted
    /// * `sink` - Sink sorted lines are written to
    pub fn sort<I, E, S>(&self, input: I, mut sink: S) -> Result<SortSummary, SortError<E>>
    where
        I: IntoIterator<Item = Result<String, E>>,
        E: Error,
        S: LineSink,
    {
        let started = Instant::now();
        let mut store = BatchStore::create(&self.config).map_err(SortError::TempDir)?;

        let batches = self.produce_batches(&mut store, input)?;
        log::info!("{} batches written in {:.3?}", batches.len(), started.elapsed());

        let merge_started = Instant::now();
        let lines = self.merge_batches::<E, S>(&store, &batches, &mut sink)?;
        sink.finish().map_err(SortError::IO)?;
        log::info!("{} lines merged in {:.3?}", lines, merge_started.elapsed());
        log::info!("run completed in {:.3?}", started.elapsed());

        return Ok(SortSummary {
            working_dir: store.dir().to_path_buf(),
            batches: batches.len(),
            lines,
        });
    }

    /// Splits the input into sorted batches stored in `store`.
    /// Returns batch handles in creation order.
    pub fn produce_batches<I, E>(&self, store: &mut BatchStore, input: I) -> Result<Vec<BatchHandle>, SortError<E>>
    where
        I: IntoIterator<Item = Result<String, E>>,
        E: Error,
    {
        let mut buffer = self.buffer_builder.build();
        let mut batches = Vec::new();

        for line in input.into_iter() {
            match line {
                Ok(line) => buffer.push(line),
                Err(err) => return Err(SortError::InputError(err)),
            }

            if buffer.is_full() {
                batches.push(self.create_batch(store, buffer).map_err(SortError::IO)?);
                buffer = self.buffer_builder.build();
            }
        }

        if !buffer.is_empty() {
            batches.push(self.create_batch(store, buffer).map_err(SortError::IO)?);
        }

        log::debug!("batch production done");

        return Ok(batches);
    }

    fn create_batch(&self, store: &mut BatchStore, mut buffer: LimitedBuffer<String>) -> io::Result<BatchHandle> {
        log::debug!("sorting batch data ({} lines) ...", buffer.len());
        buffer.sort_by_order(self.config.order);

        log::debug!("saving batch data");
        store.create_batch(buffer)
    }

    /// Merges sorted batches into the sink. Returns the number of merged lines.
    ///
    /// All batches are opened before merging starts. The sink is not finished.
    pub fn merge_batches<E, S>(
        &self,
        store: &BatchStore,
        batches: &[BatchHandle],
        sink: &mut S,
    ) -> Result<u64, SortError<E>>
    where
        E: Error,
        S: LineSink,
    {
        let readers = batches
            .iter()
            .map(|batch| store.open_for_read(batch))
            .collect::<Result<Vec<_>, _>>()
            .map_err(SortError::IO)?;

        let expected: u64 = batches.iter().map(|batch| batch.len).sum();
        log::debug!("merging {} batches ({} lines)", readers.len(), expected);

        let mut merged = 0;
        for line in BinaryHeapMerger::new(readers, self.config.order) {
            let line = line.map_err(|err| match err {
                MergeError::Source { index, error } => SortError::BatchRead {
                    batch: batches[index].id,
                    source: error,
                },
                MergeError::Underflow { pending } => SortError::MergeUnderflow { pending },
            })?;

            sink.write_line(&line).map_err(SortError::IO)?;
            merged += 1;
        }

        if merged != expected {
            return Err(SortError::LineCountMismatch { expected, merged });
        }

        return Ok(merged);
    }
}

#[cfg(test)]
mod test {
    use std::cell::Cell;
    use std::fs;
    use std::io::{self, prelude::*, ErrorKind};
    use std::path::Path;
    use std::rc::Rc;

    use rand::seq::SliceRandom;
    use rand::Rng;
    use rstest::*;

    use super::{ExternalSorter, ExternalSorterBuilder, SortError};
    use crate::order::Order;
    use crate::store::BatchStore;
    use crate::transport::{LineSink, Transport};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn sorter(tmp_dir: &Path, capacity: i64, order: Order, transport: Transport) -> ExternalSorter {
        ExternalSorterBuilder::new()
            .with_batch_capacity(capacity)
            .with_order(order)
            .with_batch_transport(transport)
            .with_tmp_dir(tmp_dir)
            .build()
            .unwrap()
    }

    fn ok_lines(lines: &[&str]) -> Vec<Result<String, io::Error>> {
        Vec::from_iter(lines.iter().map(|line| Ok(line.to_string())))
    }

    fn read_batch(store: &BatchStore, batch: &crate::store::BatchHandle) -> Vec<String> {
        store.open_for_read(batch).unwrap().map(Result::unwrap).collect()
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_external_sorter(tmp_dir: tempfile::TempDir, #[case] reversed: bool) {
        let input_sorted = Vec::from_iter((0..100).map(|i| format!("{:03}", i)));

        let mut input_shuffled = input_sorted.clone();
        input_shuffled.shuffle(&mut rand::thread_rng());

        let input: Vec<Result<String, io::Error>> = Vec::from_iter(input_shuffled.into_iter().map(|item| Ok(item)));

        let sorter = ExternalSorterBuilder::new()
            .with_batch_capacity(8)
            .with_reverse(reversed)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        let mut output: Vec<String> = Vec::new();
        let summary = sorter.sort(input, &mut output).unwrap();

        let expected_result = if reversed {
            Vec::from_iter(input_sorted.into_iter().rev())
        } else {
            input_sorted
        };

        assert_eq!(output, expected_result);
        assert_eq!(summary.batches, 13);
        assert_eq!(summary.lines, 100);
    }

    #[rstest]
    fn test_sort_properties(
        tmp_dir: tempfile::TempDir,
        #[values(Order::Ascending, Order::Descending)] order: Order,
        #[values(1, 7, 500, 0, -1, 5000)] capacity: i64,
        #[values(Transport::Plain, Transport::Lz4)] transport: Transport,
    ) {
        let mut rng = rand::thread_rng();
        // few distinct values, so plenty of duplicates spread across batches
        let input = Vec::from_iter((0..500).map(|_| {
            let len = rng.gen_range(0..4);
            String::from_iter((0..len).map(|_| rng.gen_range('a'..='d')))
        }));

        let mut output: Vec<String> = Vec::new();
        let summary = sorter(tmp_dir.path(), capacity, order, transport)
            .sort(input.iter().cloned().map(Ok::<_, io::Error>), &mut output)
            .unwrap();

        assert_eq!(output.len(), input.len());
        assert!(output
            .windows(2)
            .all(|pair| order.compare(&pair[0], &pair[1]) != std::cmp::Ordering::Greater));

        let mut expected = input.clone();
        expected.sort();
        let mut actual = output.clone();
        actual.sort();
        assert_eq!(actual, expected);

        let expected_batches = if capacity <= 0 {
            1
        } else {
            (input.len() + capacity as usize - 1) / capacity as usize
        };
        assert_eq!(summary.batches, expected_batches);
        assert_eq!(fs::read_dir(&summary.working_dir).unwrap().count(), expected_batches);
    }

    #[rstest]
    #[case(Order::Ascending, vec![vec!["apple", "banana"], vec!["apple", "cherry"]], vec!["apple", "apple", "banana", "cherry"])]
    #[case(Order::Descending, vec![vec!["banana", "apple"], vec!["cherry", "apple"]], vec!["cherry", "banana", "apple", "apple"])]
    fn test_batches_and_merge(
        tmp_dir: tempfile::TempDir,
        #[case] order: Order,
        #[case] expected_batches: Vec<Vec<&str>>,
        #[case] expected_output: Vec<&str>,
    ) {
        let sorter = sorter(tmp_dir.path(), 2, order, Transport::Lz4);
        let mut store = BatchStore::create(sorter.config()).unwrap();

        let batches = sorter
            .produce_batches(&mut store, ok_lines(&["banana", "apple", "cherry", "apple"]))
            .unwrap();

        assert_eq!(batches.iter().map(|batch| batch.id).collect::<Vec<_>>(), vec![1, 2]);
        let actual_batches: Vec<Vec<String>> = batches.iter().map(|batch| read_batch(&store, batch)).collect();
        assert_eq!(actual_batches, expected_batches);

        let mut output: Vec<String> = Vec::new();
        let merged = sorter
            .merge_batches::<io::Error, _>(&store, &batches, &mut output)
            .unwrap();

        assert_eq!(merged, 4);
        assert_eq!(output, expected_output);
    }

    #[rstest]
    fn test_empty_input(tmp_dir: tempfile::TempDir) {
        let mut output: Vec<String> = Vec::new();
        let summary = sorter(tmp_dir.path(), 2, Order::Ascending, Transport::Lz4)
            .sort(ok_lines(&[]), &mut output)
            .unwrap();

        assert!(output.is_empty());
        assert_eq!(summary.batches, 0);
        assert_eq!(summary.lines, 0);
        assert!(summary.working_dir.is_dir());
        assert_eq!(fs::read_dir(&summary.working_dir).unwrap().count(), 0);
    }

    #[rstest]
    #[case(Order::Ascending)]
    #[case(Order::Descending)]
    fn test_resort_is_identical(tmp_dir: tempfile::TempDir, #[case] order: Order) {
        let input_path = tmp_dir.path().join("input.txt");
        let first_path = tmp_dir.path().join("first.txt");
        let second_path = tmp_dir.path().join("second.txt");
        fs::write(&input_path, "pear\n\nfig\nApple\nfig\nbanana\n").unwrap();

        let sorter = sorter(&tmp_dir.path().join("tmp"), 2, order, Transport::Lz4);
        for (from, to) in [(&input_path, &first_path), (&first_path, &second_path)] {
            let source = Transport::Plain.reader(fs::File::open(from).unwrap(), None);
            let sink = Transport::Plain.writer(fs::File::create(to).unwrap(), None);
            sorter.sort(source.lines(), sink).unwrap();
        }

        let first = fs::read(&first_path).unwrap();
        assert_eq!(fs::read(&second_path).unwrap(), first);

        let expected = match order {
            Order::Ascending => "\nApple\nbanana\nfig\nfig\npear\n",
            Order::Descending => "pear\nfig\nfig\nbanana\nApple\n\n",
        };
        assert_eq!(String::from_utf8(first).unwrap(), expected);
    }

    #[rstest]
    fn test_input_error(tmp_dir: tempfile::TempDir) {
        let input = vec![
            Ok("b".to_string()),
            Ok("a".to_string()),
            Ok("c".to_string()),
            Err(io::Error::new(ErrorKind::Other, "test error")),
        ];

        let mut output: Vec<String> = Vec::new();
        let result = sorter(tmp_dir.path(), 2, Order::Ascending, Transport::Lz4).sort(input, &mut output);

        assert!(matches!(result, Err(SortError::InputError(_))));
        assert!(output.is_empty());
    }

    #[rstest]
    fn test_missing_batch(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(tmp_dir.path(), 1, Order::Ascending, Transport::Plain);
        let mut store = BatchStore::create(sorter.config()).unwrap();
        let batches = sorter.produce_batches(&mut store, ok_lines(&["b", "a", "c"])).unwrap();
        fs::remove_file(&batches[1].path).unwrap();

        let mut output: Vec<String> = Vec::new();
        let result = sorter.merge_batches::<io::Error, _>(&store, &batches, &mut output);

        assert!(matches!(result, Err(SortError::IO(err)) if err.kind() == ErrorKind::NotFound));
        assert!(output.is_empty());
    }

    #[rstest]
    fn test_corrupted_batch(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(tmp_dir.path(), 2, Order::Ascending, Transport::Lz4);
        let mut store = BatchStore::create(sorter.config()).unwrap();
        let batches = sorter.produce_batches(&mut store, ok_lines(&["b", "a", "c"])).unwrap();
        fs::write(&batches[0].path, "not an lz4 frame").unwrap();

        let mut output: Vec<String> = Vec::new();
        let result = sorter.merge_batches::<io::Error, _>(&store, &batches, &mut output);

        assert!(matches!(result, Err(SortError::BatchRead { batch: 1, .. })));
    }

    #[rstest]
    fn test_line_count_mismatch(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(tmp_dir.path(), 2, Order::Ascending, Transport::Plain);
        let mut store = BatchStore::create(sorter.config()).unwrap();
        let mut batches = sorter.produce_batches(&mut store, ok_lines(&["b", "a", "c"])).unwrap();
        batches[1].len += 1;

        let mut output: Vec<String> = Vec::new();
        let result = sorter.merge_batches::<io::Error, _>(&store, &batches, &mut output);

        assert!(matches!(
            result,
            Err(SortError::LineCountMismatch { expected: 4, merged: 3 })
        ));
    }

    #[rstest]
    fn test_merge_aborts_midway(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(tmp_dir.path(), 2, Order::Ascending, Transport::Plain);
        let mut store = BatchStore::create(sorter.config()).unwrap();
        let batches = sorter.produce_batches(&mut store, ok_lines(&["b", "a", "d", "c"])).unwrap();
        // the head of batch 2 is still readable, the line after it is not
        fs::write(&batches[1].path, b"c\n\xff\xfe\n").unwrap();

        let mut output: Vec<String> = Vec::new();
        let result = sorter.merge_batches::<io::Error, _>(&store, &batches, &mut output);

        assert!(matches!(
            result,
            Err(SortError::BatchRead { batch: 2, ref source }) if source.kind() == ErrorKind::InvalidData
        ));
        assert_eq!(output, vec!["a", "b"]);
    }

    #[rstest]
    fn test_sink_not_finished_on_error(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(tmp_dir.path(), 1, Order::Ascending, Transport::Plain);
        let sink = FinishTracker::default();
        let finished = sink.finished.clone();

        let input = vec![
            Ok("b".to_string()),
            Ok("a".to_string()),
            Err(io::Error::new(ErrorKind::Other, "test error")),
        ];
        assert!(matches!(sorter.sort(input, sink), Err(SortError::InputError(_))));
        assert!(!finished.get());

        let sink = FinishTracker::default();
        let finished = sink.finished.clone();
        sorter.sort(ok_lines(&["b", "a"]), sink).unwrap();
        assert!(finished.get());
    }

    /// Sink recording whether it was finished.
    #[derive(Default)]
    struct FinishTracker {
        finished: Rc<Cell<bool>>,
    }

    impl LineSink for FinishTracker {
        fn write_line(&mut self, _line: &str) -> io::Result<()> {
            Ok(())
        }

        fn finish(self) -> io::Result<()> {
            self.finished.set(true);
            Ok(())
        }
    }

    #[rstest]
    fn test_runs_use_distinct_working_dirs(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(tmp_dir.path(), 1, Order::Ascending, Transport::Lz4);

        let first = sorter.sort(ok_lines(&["b", "a"]), Vec::<String>::new()).unwrap();
        let second = sorter.sort(ok_lines(&["b", "a"]), Vec::<String>::new()).unwrap();

        assert_ne!(first.working_dir, second.working_dir);
        assert_eq!(first.working_dir.parent().unwrap(), tmp_dir.path());
    }

    #[rstest]
    fn test_working_dir_error(tmp_dir: tempfile::TempDir) {
        let parent = tmp_dir.path().join("file");
        fs::write(&parent, "not a directory").unwrap();

        let result = sorter(&parent, 1, Order::Ascending, Transport::Lz4)
            .sort(ok_lines(&["a"]), Vec::<String>::new());
        assert!(matches!(result, Err(SortError::TempDir(_))));
    }

    #[rstest]
    #[case(ExternalSorterBuilder::new().with_tmp_dir(Path::new("")))]
    #[case(ExternalSorterBuilder::new().with_max_dir_attempts(0))]
    #[case(ExternalSorterBuilder::new().with_rw_buf_size(0))]
    #[case(ExternalSorterBuilder::new().with_dir_prefix("a/b"))]
    #[case(ExternalSorterBuilder::new().with_batch_naming("batch/", ".txt"))]
    fn test_invalid_config(#[case] builder: ExternalSorterBuilder) {
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_config_error_conversion() {
        let err = ExternalSorterBuilder::new().with_max_dir_attempts(0).build().unwrap_err();
        let err: SortError<io::Error> = err.into();

        assert!(matches!(err, SortError::Config(_)));
        assert!(err.to_string().starts_with("invalid configuration"));
    }

    #[rstest]
    fn test_config_accessors(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(tmp_dir.path(), -1, Order::Descending, Transport::Plain);
        let config = sorter.config();

        assert_eq!(config.batch_capacity(), -1);
        assert_eq!(config.order(), Order::Descending);
        assert!(config.order().is_reversed());
        assert_eq!(config.tmp_dir(), tmp_dir.path());
        assert_eq!(config.batch_transport(), Transport::Plain);
    }

    #[rstest]
    fn test_custom_naming(tmp_dir: tempfile::TempDir) {
        let sorter = ExternalSorterBuilder::new()
            .with_tmp_dir(tmp_dir.path())
            .with_batch_capacity(1)
            .with_batch_transport(Transport::Plain)
            .with_batch_naming("run-", ".lines")
            .with_dir_prefix("sort")
            .with_rw_buf_size(64)
            .build()
            .unwrap();

        let summary = sorter.sort(ok_lines(&["b", "a"]), Vec::<String>::new()).unwrap();

        let dir_name = summary.working_dir.file_name().unwrap().to_str().unwrap().to_string();
        assert!(dir_name.starts_with("sort"));
        assert_eq!(fs::read_to_string(summary.working_dir.join("run-1.lines")).unwrap(), "b\n");
        assert_eq!(fs::read_to_string(summary.working_dir.join("run-2.lines")).unwrap(), "a\n");
    }

    #[test]
    fn test_vec_sink_finish() {
        assert!(Vec::<String>::new().finish().is_ok());
    }
}
