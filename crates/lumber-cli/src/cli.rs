//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use lumber_logs::{DEFAULT_FOLLOW_INTERVAL, LogLevel};

/// Lumber - indexed JSON-line log viewer.
#[derive(Parser, Debug, Clone)]
#[command(name = "lumber")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Write the tool's own diagnostics to this file as JSON lines.
    ///
    /// Without it, diagnostics go to stderr, filtered by `RUST_LOG`.
    #[arg(long, global = true, env = "LUMBER_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Minimum level of diagnostics written to `--log-file`.
    #[arg(long, global = true, env = "LUMBER_LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show the newest lines of a log file at or above a level.
    View(ViewArgs),

    /// Generate synthetic log lines.
    Gen(GenArgs),
}

/// Arguments for the view command.
#[derive(Args, Debug, Clone)]
pub struct ViewArgs {
    /// Log file to read.
    pub path: PathBuf,

    /// Minimum severity to show.
    #[arg(short, long, default_value = "trace")]
    pub level: LogLevel,

    /// Lines per page.
    #[arg(short = 'n', long, default_value_t = 20)]
    pub lines: usize,

    /// Lines to skip back from the newest one.
    #[arg(short, long, default_value_t = 0)]
    pub offset: usize,

    /// Keep printing lines as they are appended.
    #[arg(short, long)]
    pub follow: bool,

    /// Polling interval for --follow, in milliseconds.
    #[arg(long, default_value_t = default_follow_ms())]
    pub interval_ms: u64,

    /// Disable ANSI colors.
    #[arg(long)]
    pub no_color: bool,
}

fn default_follow_ms() -> u64 {
    u64::try_from(DEFAULT_FOLLOW_INTERVAL.as_millis()).unwrap_or(u64::MAX)
}

/// Arguments for the gen command.
#[derive(Args, Debug, Clone)]
pub struct GenArgs {
    /// Number of lines to generate.
    #[arg(short = 'n', long, required = true)]
    pub count: usize,

    /// Output file; parent directories are created.
    #[arg(short, long, default_value = "./output.log")]
    pub output: PathBuf,

    /// Pause between lines, in milliseconds.
    #[arg(short, long, default_value_t = 0)]
    pub interval_ms: u64,

    /// Drop lines instead of waiting when the writer falls behind.
    #[arg(long)]
    pub dropping: bool,
}
