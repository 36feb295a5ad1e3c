//! Byte transports beneath line readers and line sinks.
//!
//! A [`Transport`] wraps a raw byte stream (a batch file, the input or the output) with buffering and,
//! optionally, LZ4 frame compression. The sorting core only sees lines and does not care which one is used.
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io::prelude::*;
//!
//! use ext_line_sort::transport::{LineSink, Transport};
//!
//! let mut sink = Transport::Lz4.writer(fs::File::create("lines.txt.lz4").unwrap(), None);
//! sink.write_line("hello").unwrap();
//! sink.finish().unwrap();
//!
//! let source = Transport::Lz4.reader(fs::File::open("lines.txt.lz4").unwrap(), None);
//! let lines: Vec<String> = source.lines().map(Result::unwrap).collect();
//! assert_eq!(lines, vec!["hello"]);
//! ```

use std::io::{self, prelude::*};

use lz4_flex::frame::{FrameDecoder, FrameEncoder};

/// Byte transport used to read and write lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Uncompressed buffered stream.
    Plain,
    /// LZ4 frame compressed stream.
    Lz4,
}

impl Transport {
    /// Selects [`Transport::Lz4`] if `compressed` is set, [`Transport::Plain`] otherwise.
    pub fn from_compressed(compressed: bool) -> Self {
        if compressed {
            Transport::Lz4
        } else {
            Transport::Plain
        }
    }

    /// File name extension appended to files written with this transport.
    pub fn file_extension(&self) -> &'static str {
        match self {
            Transport::Plain => "",
            Transport::Lz4 => ".lz4",
        }
    }

    /// Wraps a byte source. Lines are obtained via [`BufRead::lines`].
    pub fn reader<R: Read>(&self, inner: R, buf_size: Option<usize>) -> TransportReader<R> {
        match self {
            Transport::Plain => TransportReader::Plain(buffered_reader(inner, buf_size)),
            Transport::Lz4 => {
                TransportReader::Lz4(buffered_reader(FrameDecoder::new(buffered_reader(inner, buf_size)), buf_size))
            }
        }
    }

    /// Wraps a byte sink into a [`LineSink`].
    pub fn writer<W: Write>(&self, inner: W, buf_size: Option<usize>) -> TransportWriter<W> {
        let writer = match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, inner),
            None => io::BufWriter::new(inner),
        };

        match self {
            Transport::Plain => TransportWriter::Plain(writer),
            Transport::Lz4 => TransportWriter::Lz4(FrameEncoder::new(writer)),
        }
    }
}

fn buffered_reader<R: Read>(inner: R, buf_size: Option<usize>) -> io::BufReader<R> {
    match buf_size {
        Some(buf_size) => io::BufReader::with_capacity(buf_size, inner),
        None => io::BufReader::new(inner),
    }
}

/// Sequential line sink.
pub trait LineSink {
    /// Writes one line. The line must not contain a line terminator.
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Completes the sink. Must only be called once every line was written successfully,
    /// a sink dropped without being finished is to be treated as incomplete.
    fn finish(self) -> io::Result<()>
    where
        Self: Sized;
}

impl LineSink for Vec<String> {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.push(line.to_owned());
        Ok(())
    }

    fn finish(self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: LineSink> LineSink for &mut S {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        (**self).write_line(line)
    }

    /// Finishing a borrowed sink is a no-op, the owner finishes it.
    fn finish(self) -> io::Result<()> {
        Ok(())
    }
}

/// Reader over a byte source wrapped with a [`Transport`].
pub enum TransportReader<R: Read> {
    Plain(io::BufReader<R>),
    Lz4(io::BufReader<FrameDecoder<io::BufReader<R>>>),
}

impl<R: Read> Read for TransportReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            TransportReader::Plain(reader) => reader.read(buf),
            TransportReader::Lz4(reader) => reader.read(buf),
        }
    }
}

impl<R: Read> BufRead for TransportReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            TransportReader::Plain(reader) => reader.fill_buf(),
            TransportReader::Lz4(reader) => reader.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            TransportReader::Plain(reader) => reader.consume(amt),
            TransportReader::Lz4(reader) => reader.consume(amt),
        }
    }
}

/// Newline terminated line sink over a byte sink wrapped with a [`Transport`].
///
/// The written bytes don't tell a finished stream from an abandoned one: an LZ4 stream cut at a block
/// boundary still decodes. Whoever drives the sink has to report the abort.
pub enum TransportWriter<W: Write> {
    Plain(io::BufWriter<W>),
    Lz4(FrameEncoder<io::BufWriter<W>>),
}

impl<W: Write> Write for TransportWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            TransportWriter::Plain(writer) => writer.write(buf),
            TransportWriter::Lz4(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            TransportWriter::Plain(writer) => writer.flush(),
            TransportWriter::Lz4(encoder) => encoder.flush(),
        }
    }
}

impl<W: Write> LineSink for TransportWriter<W> {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.write_all(line.as_bytes())?;
        self.write_all(b"\n")
    }

    fn finish(self) -> io::Result<()> {
        match self {
            TransportWriter::Plain(mut writer) => writer.flush(),
            TransportWriter::Lz4(encoder) => {
                // terminates the frame, the underlying buffer still has to be flushed
                let mut writer = encoder.finish()?;
                writer.flush()
            }
        }
    }
}
