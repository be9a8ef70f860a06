//! CLI error types.

use thiserror::Error;

use lumber_logs::LogError;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// The log library reported an error.
    #[error(transparent)]
    Log(#[from] LogError),

    /// Writing output or creating files failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Diagnostics could not be set up.
    #[error("diagnostics error: {0}")]
    Diagnostics(String),
}
