//! Setup of the tool's own diagnostics.
//!
//! By default diagnostics go to stderr through `tracing_subscriber::fmt`,
//! filtered by `RUST_LOG`. With `--log-file`, they are written as JSON lines
//! through a [`JsonLineLayer`], so `lumber view` can read them back.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::Arc;

use lumber_logs::{AsyncSink, JsonLineLayer, LogLevel, SinkConfig};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::error::CliError;

/// Module name stamped on diagnostic records.
pub const MODULE: &str = "lumber";

/// Maps a severity onto the closest tracing filter.
#[must_use]
pub const fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error | LogLevel::Fatal | LogLevel::Panic => LevelFilter::ERROR,
    }
}

/// Opens `path` for appending, creating it and its parent directories.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created.
pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::OpenOptions::new().create(true).append(true).open(path)
}

/// Installs the global subscriber.
///
/// Returns the sink behind `log_file`, which must be finalized before exit.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a global subscriber
/// is already installed.
pub fn init(log_file: Option<&Path>, level: LogLevel) -> Result<Option<Arc<AsyncSink>>, CliError> {
    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .try_init()
            .map_err(|e| CliError::Diagnostics(e.to_string()))?;
        return Ok(None);
    };

    let sink = Arc::new(AsyncSink::new(open_log_file(path)?, SinkConfig::default())?);
    let layer = JsonLineLayer::new(MODULE, Arc::clone(&sink)).with_filter(level_filter(level));
    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| CliError::Diagnostics(e.to_string()))?;

    Ok(Some(sink))
}
