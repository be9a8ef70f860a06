//! Error types for the log store, query actor and writers.

use thiserror::Error;

use crate::types::LogLevel;

/// Errors that can occur while indexing, querying or writing logs.
#[derive(Debug, Error)]
pub enum LogError {
    /// An I/O error occurred on the underlying log file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested level has no indexed lines yet.
    #[error("no records for the level {0}")]
    NoRecords(LogLevel),

    /// The requested page lies outside the indexed range.
    #[error("end of indexed range reached")]
    RangeExhausted,

    /// The line formatter rejected a raw line.
    #[error("format error: {0}")]
    Format(String),

    /// A page was requested before any file was opened.
    #[error("no file open for get")]
    NoFileOpen,

    /// The query actor is no longer running.
    #[error("query actor stopped")]
    ActorStopped,

    /// A severity name could not be parsed.
    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    /// A required field was not provided.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Serialization of a log record failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LogError {
    /// Returns true for the end-of-range condition.
    ///
    /// Pagers use this to tell "reached the edge of history" apart from
    /// real failures, which are shown to the user.
    #[must_use]
    pub const fn is_range_exhausted(&self) -> bool {
        matches!(self, Self::RangeExhausted)
    }
}

/// Result type alias for log operations.
pub type Result<T> = std::result::Result<T, LogError>;
