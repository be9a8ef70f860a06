//! Gen command implementation.
//!
//! Writes synthetic records cycling through trace..error, for trying out
//! `lumber view` on a file of any size.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lumber_logs::{AsyncSink, LogLevel, Logger, SinkConfig, SinkPolicy, SinkStats};
use tracing::info;

use crate::cli::GenArgs;
use crate::diagnostics::open_log_file;
use crate::error::CliError;

/// Module name stamped on generated records.
pub const MODULE: &str = "loggen";

/// Levels cycled through, one per line.
const LEVELS: [LogLevel; 5] = [
    LogLevel::Trace,
    LogLevel::Debug,
    LogLevel::Info,
    LogLevel::Warn,
    LogLevel::Error,
];

const SENTENCES: [&str; 12] = [
    "Lorem ipsum dolor sit amet, consectetur adipiscing elit.",
    "Sed do eiusmod tempor incididunt ut labore et dolore magna aliqua.",
    "Ut enim ad minim veniam, quis nostrud exercitation ullamco laboris.",
    "Nisi ut aliquip ex ea commodo consequat.",
    "Duis aute irure dolor in reprehenderit in voluptate velit esse.",
    "Cillum dolore eu fugiat nulla pariatur.",
    "Excepteur sint occaecat cupidatat non proident.",
    "Sunt in culpa qui officia deserunt mollit anim id est laborum.",
    "Curabitur pretium tincidunt lacus, nulla gravida orci a odio.",
    "Nullam varius, turpis et commodo pharetra, est eros bibendum elit.",
    "Integer in mauris eu nibh euismod gravida.",
    "Praesent blandit laoreet nibh, fusce convallis metus id felis luctus.",
];

/// Handler for the gen command.
pub struct GenerateCommand<'a> {
    args: &'a GenArgs,
}

impl<'a> GenerateCommand<'a> {
    /// Creates a new gen command handler.
    #[must_use]
    pub const fn new(args: &'a GenArgs) -> Self {
        Self { args }
    }

    /// Executes the gen command, printing progress to `out`.
    ///
    /// The output file is truncated. Runs on the calling thread; a blocking
    /// sink may wait for the writer.
    ///
    /// # Errors
    ///
    /// Returns error if the output file cannot be created.
    pub fn execute<W: Write>(&self, out: &mut W) -> Result<SinkStats, CliError> {
        let args = self.args;
        let file = create_truncated(&args.output)?;
        let policy = if args.dropping {
            SinkPolicy::Dropping
        } else {
            SinkPolicy::Blocking
        };
        let sink = Arc::new(AsyncSink::new(file, SinkConfig::new(policy))?);
        let log = Logger::new(MODULE, LogLevel::Trace, Arc::clone(&sink));

        let pause = Duration::from_millis(args.interval_ms);
        let step = (args.count / 100).max(1);
        for i in 0..args.count {
            if i % step == 0 {
                write!(out, "\rgenerating logs: {}%", i * 100 / args.count)?;
                out.flush()?;
            }
            log.at(LEVELS[i % LEVELS.len()])
                .field("seq", i)
                .msg(SENTENCES[i % SENTENCES.len()]);
            if !pause.is_zero() {
                std::thread::sleep(pause);
            }
        }

        sink.finalize();
        let stats = sink.stats();
        writeln!(
            out,
            "\rgenerated {} log lines into {}",
            stats.written,
            args.output.display()
        )?;
        if stats.dropped > 0 {
            writeln!(out, "dropped {} lines", stats.dropped)?;
        }

        info!(
            path = %args.output.display(),
            written = stats.written,
            dropped = stats.dropped,
            "generated logs"
        );
        Ok(stats)
    }
}

fn create_truncated(path: &Path) -> std::io::Result<std::fs::File> {
    let file = open_log_file(path)?;
    file.set_len(0)?;
    Ok(file)
}
