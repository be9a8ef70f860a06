//! Core types for structured JSON-line logs.
//!
//! This module provides:
//! - [`LogLevel`] - Severity levels, totally ordered from trace to panic
//! - [`LogRecord`] - One structured log line
//! - [`LogRecordBuilder`] - Builder for records
//! - [`Page`] - A formatted block of lines returned by the store

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::LogError;

/// Log severity levels, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information
    Trace = 0,
    /// Debugging information
    Debug = 1,
    /// General information
    Info = 2,
    /// Warning conditions
    Warn = 3,
    /// Error conditions
    Error = 4,
    /// Unrecoverable errors; the writer shuts the process down
    Fatal = 5,
    /// Programming errors
    Panic = 6,
}

impl LogLevel {
    /// Every level, least severe first.
    pub const ALL: [Self; 7] = [
        Self::Trace,
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Fatal,
        Self::Panic,
    ];

    /// Returns true if this level is at least as severe as the given level.
    #[must_use]
    pub fn is_at_least(&self, level: Self) -> bool {
        *self >= level
    }

    /// Returns the string representation of this level.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
            Self::Panic => "panic",
        }
    }

    /// Three-letter tag used by the pretty formatter.
    #[must_use]
    pub const fn short_tag(&self) -> &'static str {
        match self {
            Self::Trace => "TRC",
            Self::Debug => "DBG",
            Self::Info => "INF",
            Self::Warn => "WRN",
            Self::Error => "ERR",
            Self::Fatal => "FTL",
            Self::Panic => "PNC",
        }
    }

    /// Parses the lowercase wire name of a level.
    ///
    /// Used on raw bytes captured from a log line, so no allocation and no
    /// case folding.
    #[must_use]
    pub fn from_wire(name: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().as_bytes() == name)
    }

    /// Array index of this level.
    #[must_use]
    pub const fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::from_wire(lower.as_bytes()).ok_or_else(|| LogError::InvalidLevel(s.to_string()))
    }
}

/// A structured log record, serialized as one JSON object per line.
///
/// `level` is serialized first, so every raw line starts with
/// `{"level":"<name>"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Severity level
    pub level: LogLevel,
    /// When the record was created
    #[serde(serialize_with = "serialize_nanos")]
    pub time: DateTime<Utc>,
    /// Source location, `file:line`
    #[serde(default)]
    pub caller: String,
    /// Module (component) that produced the record
    #[serde(default)]
    pub module: String,
    /// The log message
    #[serde(default)]
    pub message: String,
    /// Additional structured fields
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn serialize_nanos<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

impl LogRecord {
    /// Creates a new record builder.
    #[must_use]
    pub fn builder() -> LogRecordBuilder {
        LogRecordBuilder::default()
    }

    /// Serializes the record as a newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if an extra field cannot be serialized.
    pub fn to_line(&self) -> Result<Vec<u8>, LogError> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Builder for constructing log records.
#[derive(Debug, Default)]
pub struct LogRecordBuilder {
    level: Option<LogLevel>,
    time: Option<DateTime<Utc>>,
    caller: String,
    module: String,
    message: Option<String>,
    extra: serde_json::Map<String, serde_json::Value>,
}

impl LogRecordBuilder {
    /// Sets the log level.
    #[must_use]
    pub const fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Sets the caller location.
    #[must_use]
    pub fn caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = caller.into();
        self
    }

    /// Sets the module name.
    #[must_use]
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds an extra field.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Builds the record. The timestamp defaults to now.
    ///
    /// # Errors
    ///
    /// Returns an error if the level or message is not set.
    pub fn build(self) -> Result<LogRecord, LogError> {
        let level = self.level.ok_or(LogError::MissingField("level"))?;
        let message = self.message.ok_or(LogError::MissingField("message"))?;

        Ok(LogRecord {
            level,
            time: self.time.unwrap_or_else(Utc::now),
            caller: self.caller,
            module: self.module,
            message,
            extra: self.extra,
        })
    }
}

/// A formatted block of log lines plus tailing metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Formatted lines, oldest first, joined by newlines
    pub body: Vec<u8>,
    /// Lines at or above the requested level appended since the last scan
    pub new_lines: usize,
}

impl Page {
    /// Returns the body as UTF-8 text, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
