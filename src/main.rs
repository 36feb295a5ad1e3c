use std::fs;
use std::io::{self, prelude::*};
use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use ext_line_sort::{ExternalSorter, ExternalSorterBuilder, Transport};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let batch_size: i64 = arg_parser.value_of_t_or_exit("batch_size");
    let tmp_dir = arg_parser.value_of("tmp_dir").expect("value has default");
    let reverse = arg_parser.is_present("reverse");
    let keep_batches = arg_parser.is_present("keep_batches");
    let input_transport = Transport::from_compressed(arg_parser.is_present("input_lz4"));
    let output_transport = Transport::from_compressed(arg_parser.is_present("output_lz4"));
    let batch_transport = Transport::from_compressed(!arg_parser.is_present("plain_batches"));
    let rw_buf_size: Option<usize> = match arg_parser.value_of("rw_buf_size").map(parse_buf_size).transpose() {
        Ok(rw_buf_size) => rw_buf_size,
        Err(err) => {
            log::error!("{}", err);
            process::exit(1);
        }
    };

    let mut sorter_builder = ExternalSorterBuilder::new()
        .with_batch_capacity(batch_size)
        .with_reverse(reverse)
        .with_tmp_dir(path::Path::new(tmp_dir))
        .with_batch_transport(batch_transport);

    if let Some(rw_buf_size) = rw_buf_size {
        sorter_builder = sorter_builder.with_rw_buf_size(rw_buf_size);
    }

    let sorter: ExternalSorter = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    let input = arg_parser.value_of("input").expect("value is required");
    let input_stream = match fs::File::open(input) {
        Ok(file) => input_transport.reader(file, rw_buf_size),
        Err(err) => {
            log::error!("input file opening error: {}", err);
            process::exit(1);
        }
    };
    log::info!("reading from {}", input);

    let output = arg_parser.value_of("output").expect("value is required");
    let output_stream = match fs::File::create(output) {
        Ok(file) => output_transport.writer(file, rw_buf_size),
        Err(err) => {
            log::error!("output file creation error: {}", err);
            process::exit(1);
        }
    };
    log::info!("writing to {}", output);

    let summary = match sorter.sort(input_stream.lines(), output_stream) {
        Ok(summary) => summary,
        Err(err) => {
            log::error!("data sorting error: {}", err);
            // the output is incomplete, don't leave it behind looking like a result
            if let Err(err) = fs::remove_file(output) {
                log::warn!("incomplete output {} not removed: {}", output, err);
            }
            process::exit(1);
        }
    };

    log::info!(
        "{} lines sorted in {} batches ({})",
        summary.lines,
        summary.batches,
        summary.working_dir.display()
    );

    if !keep_batches {
        if let Err(err) = remove_working_dir(&summary.working_dir) {
            log::warn!("working directory {} not removed: {}", summary.working_dir.display(), err);
        }
    }
}

/// Parses a positive byte size such as `8MB` that fits the platform's `usize`.
fn parse_buf_size(v: &str) -> Result<usize, String> {
    let size = match v.parse::<ByteSize>() {
        Ok(size) => size.as_u64(),
        Err(err) => return Err(format!("Buffer size format incorrect: {}", err)),
    };
    if size == 0 {
        return Err("Buffer size must be positive".to_string());
    }

    usize::try_from(size).map_err(|err| format!("Buffer size {} not supported: {}", size, err))
}

fn remove_working_dir(dir: &path::Path) -> io::Result<()> {
    log::debug!("removing working directory {}", dir.display());
    fs::remove_dir_all(dir)
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("ext-line-sort")
        .about("external merge sort for text files")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("input_lz4")
                .long("input-lz4")
                .help("input file is LZ4 compressed"),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output_lz4")
                .long("output-lz4")
                .help("result file should be LZ4 compressed"),
        )
        .arg(
            clap::Arg::new("batch_size")
                .short('b')
                .long("batch-size")
                .help("maximum number of lines per batch (non-positive for a single batch)")
                .required(true)
                .takes_value(true)
                .allow_hyphen_values(true)
                .validator(|v| match v.parse::<i64>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Batch size format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("reverse")
                .short('r')
                .long("reverse")
                .help("sort in descending order"),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory the run's working directory is created in")
                .takes_value(true)
                .default_value("tmp"),
        )
        .arg(
            clap::Arg::new("plain_batches")
                .long("plain-batches")
                .help("store batches uncompressed"),
        )
        .arg(
            clap::Arg::new("keep_batches")
                .long("keep-batches")
                .help("keep the working directory with batch files after sorting"),
        )
        .arg(
            clap::Arg::new("rw_buf_size")
                .long("rw-buf-size")
                .help("file read/write buffer size")
                .takes_value(true)
                .validator(|v| parse_buf_size(v).map(|_| ())),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
