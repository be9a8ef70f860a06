//! Structured JSON-line logger over an [`AsyncSink`].
//!
//! ```ignore
//! let sink = Arc::new(AsyncSink::new(std::io::stderr(), SinkConfig::default())?);
//! let log = Logger::new("viewer", LogLevel::Info, Arc::clone(&sink));
//! log.at(LogLevel::Warn).field("elapsed_ms", 812).msg("slow poll");
//! sink.finalize();
//! ```

use std::panic::Location;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::error;

use crate::error::Result;
use crate::sink::AsyncSink;
use crate::types::{LogLevel, LogRecord};

/// Field holding the Unix timestamp in nanoseconds.
pub const TS_FIELD: &str = "ts";

/// Writes records of at least `min_level` for one module.
#[derive(Debug, Clone)]
pub struct Logger {
    module: String,
    min_level: LogLevel,
    sink: Arc<AsyncSink>,
}

impl Logger {
    /// Creates a logger writing to `sink`.
    #[must_use]
    pub fn new(module: impl Into<String>, min_level: LogLevel, sink: Arc<AsyncSink>) -> Self {
        Self {
            module: module.into(),
            min_level,
            sink,
        }
    }

    /// Returns true if records of `level` are written.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level.is_at_least(self.min_level)
    }

    /// Starts a record of `level`.
    #[must_use]
    pub fn at(&self, level: LogLevel) -> EventBuilder<'_> {
        EventBuilder {
            logger: self,
            level,
            fields: Map::new(),
        }
    }

    /// Module name stamped on every record.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The sink records are written to.
    #[must_use]
    pub const fn sink(&self) -> &Arc<AsyncSink> {
        &self.sink
    }

    /// Writes a trace record.
    #[track_caller]
    pub fn trace(&self, message: impl Into<String>) {
        self.at(LogLevel::Trace).msg(message);
    }

    /// Writes a debug record.
    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) {
        self.at(LogLevel::Debug).msg(message);
    }

    /// Writes an info record.
    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        self.at(LogLevel::Info).msg(message);
    }

    /// Writes a warn record.
    #[track_caller]
    pub fn warn(&self, message: impl Into<String>) {
        self.at(LogLevel::Warn).msg(message);
    }

    /// Writes an error record.
    #[track_caller]
    pub fn error(&self, message: impl Into<String>) {
        self.at(LogLevel::Error).msg(message);
    }

    /// Writes a fatal record and shuts the process down through the sink.
    ///
    /// The sink's exit action runs even when the record itself is dropped or
    /// the sink is already finalized.
    #[track_caller]
    pub fn fatal(&self, message: impl Into<String>) {
        self.at(LogLevel::Fatal).msg(message);
    }
}

/// A record being assembled; written by [`EventBuilder::msg`].
#[derive(Debug)]
#[must_use = "a record is only written by `msg`"]
pub struct EventBuilder<'a> {
    logger: &'a Logger,
    level: LogLevel,
    fields: Map<String, Value>,
}

impl EventBuilder<'_> {
    /// Adds an extra field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Writes the record with `message`, stamped with the caller location.
    ///
    /// Records below the logger's level are discarded. A fatal record first
    /// arms the sink's fatal shutdown; it ends in the sink's exit action even
    /// when it is filtered out or cannot be serialized.
    #[track_caller]
    pub fn msg(self, message: impl Into<String>) {
        let fatal = self.level == LogLevel::Fatal;
        if !self.logger.enabled(self.level) {
            if fatal {
                self.logger.sink.fatal_exit();
            }
            return;
        }
        let caller = Location::caller();
        let now = Utc::now();

        let mut builder = LogRecord::builder()
            .level(self.level)
            .time(now)
            .caller(format!("{}:{}", caller.file(), caller.line()))
            .module(self.logger.module.clone())
            .message(message);
        if let Some(ts) = now.timestamp_nanos_opt() {
            builder = builder.field(TS_FIELD, Value::from(ts));
        }
        for (key, value) in self.fields {
            builder = builder.field(key, value);
        }

        let line = match builder.build().and_then(|record| record.to_line()) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "failed to serialize log record");
                if fatal {
                    self.logger.sink.fatal_exit();
                }
                return;
            }
        };

        if fatal {
            self.logger.sink.fatal_shutdown();
        }
        self.logger.sink.submit(&line);
    }
}
