//! Batch store.
//!
//! Sorted batches are kept as newline separated text files inside a per-run working directory:
//!
//! ```text
//! tmp/
//! └── t1804289383/
//!     ├── batch-1.txt.lz4
//!     ├── batch-2.txt.lz4
//!     └── batch-3.txt.lz4
//! ```
//!
//! The layout is private to one run.

use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::sort::SortConfig;
use crate::transport::{LineSink, Transport, TransportReader, TransportWriter};

/// Creates a fresh, randomly named sub-directory of `parent`, creating `parent` first if needed.
///
/// Names are drawn as `<prefix><random u32>` until one that does not exist yet is found. The directory is
/// created atomically with the existence check, so concurrent callers never share a directory.
/// Fails once `max_attempts` names have been found taken.
pub fn create_working_directory(parent: &Path, prefix: &str, max_attempts: u32) -> io::Result<PathBuf> {
    fs::create_dir_all(parent)?;

    let mut rng = rand::thread_rng();
    for _ in 0..max_attempts {
        let candidate = parent.join(format!("{}{}", prefix, rng.gen::<u32>()));
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                log::debug!("working directory {} already exists, retrying", candidate.display());
            }
            Err(err) => return Err(err),
        }
    }

    return Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!(
            "no fresh working directory found in {} after {} attempts",
            parent.display(),
            max_attempts
        ),
    ));
}

/// Sorted batch stored on the file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchHandle {
    /// Run-unique batch identifier, starting at 1.
    pub id: u64,
    /// Batch file location.
    pub path: PathBuf,
    /// Number of lines in the batch.
    pub len: u64,
}

/// Collection of sorted batches of one run, rooted in a freshly created working directory.
#[derive(Debug)]
pub struct BatchStore {
    dir: PathBuf,
    name_prefix: String,
    name_suffix: String,
    transport: Transport,
    rw_buf_size: Option<usize>,
    last_id: u64,
}

impl BatchStore {
    /// Creates a batch store in a new working directory under the configured parent.
    pub fn create(config: &SortConfig) -> io::Result<Self> {
        let dir = create_working_directory(&config.tmp_dir, &config.dir_prefix, config.max_dir_attempts)?;
        log::info!("using {} as a working directory", dir.display());

        return Ok(BatchStore {
            dir,
            name_prefix: config.batch_name_prefix.clone(),
            name_suffix: config.batch_name_suffix.clone(),
            transport: config.batch_transport,
            rw_buf_size: config.rw_buf_size,
            last_id: 0,
        });
    }

    /// Working directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Batch file location for the given batch identifier.
    pub fn name_for_batch(&self, id: u64) -> PathBuf {
        self.dir.join(format!(
            "{}{}{}{}",
            self.name_prefix,
            id,
            self.name_suffix,
            self.transport.file_extension()
        ))
    }

    /// Opens a new batch file for writing. Fails if the file already exists.
    pub fn open_for_write(&self, path: &Path) -> io::Result<TransportWriter<fs::File>> {
        let file = fs::OpenOptions::new().write(true).create_new(true).open(path)?;

        return Ok(self.transport.writer(file, self.rw_buf_size));
    }

    /// Opens a batch for reading.
    pub fn open_for_read(&self, batch: &BatchHandle) -> io::Result<BatchReader> {
        log::debug!("opening batch {} for reading", batch.path.display());
        let file = fs::File::open(&batch.path)?;

        return Ok(BatchReader {
            lines: self.transport.reader(file, self.rw_buf_size).lines(),
        });
    }

    /// Writes already sorted lines as the next batch.
    pub fn create_batch(&mut self, lines: impl IntoIterator<Item = String>) -> io::Result<BatchHandle> {
        self.last_id += 1;
        let id = self.last_id;
        let path = self.name_for_batch(id);

        let mut writer = self.open_for_write(&path)?;
        let mut len = 0;
        for line in lines {
            writer.write_line(&line)?;
            len += 1;
        }
        writer.finish()?;

        log::debug!("batch {} saved ({} lines)", path.display(), len);

        return Ok(BatchHandle { id, path, len });
    }

    /// Removes the working directory with all batches in it.
    pub fn remove(self) -> io::Result<()> {
        fs::remove_dir_all(&self.dir)
    }
}

/// Sequential reader over the lines of a single batch.
pub struct BatchReader {
    lines: io::Lines<TransportReader<fs::File>>,
}

impl Iterator for BatchReader {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines.next()
    }
}
