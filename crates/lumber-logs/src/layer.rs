//! Tracing layer that writes events as JSON log lines.
//!
//! [`JsonLineLayer`] lets a program's own `tracing` diagnostics land in the
//! same line format the store indexes, through an [`AsyncSink`].
//!
//! Events emitted by the sink itself (target [`sink::TARGET`]) are skipped:
//! a failing target would otherwise report each failure into the queue that
//! is failing.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::sink::{self, AsyncSink};
use crate::types::{LogLevel, LogRecord};

/// A tracing layer that serializes events into an [`AsyncSink`].
#[derive(Debug, Clone)]
pub struct JsonLineLayer {
    module: String,
    sink: Arc<AsyncSink>,
}

impl JsonLineLayer {
    /// Creates a layer stamping `module` on every record.
    #[must_use]
    pub fn new(module: impl Into<String>, sink: Arc<AsyncSink>) -> Self {
        Self {
            module: module.into(),
            sink,
        }
    }

    /// The sink events are written to.
    #[must_use]
    pub const fn sink(&self) -> &Arc<AsyncSink> {
        &self.sink
    }
}

/// Maps a tracing level onto the log severity scale.
#[must_use]
pub fn severity_of(level: &Level) -> LogLevel {
    match *level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warn,
        _ => LogLevel::Error,
    }
}

impl<S> Layer<S> for JsonLineLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(sink::TARGET) {
            return;
        }

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let caller = match (metadata.file(), metadata.line()) {
            (Some(file), Some(line)) => format!("{file}:{line}"),
            (Some(file), None) => file.to_string(),
            _ => metadata.target().to_string(),
        };

        let record = LogRecord {
            level: severity_of(metadata.level()),
            time: Utc::now(),
            caller,
            module: self.module.clone(),
            message: visitor.message.unwrap_or_default(),
            extra: visitor.fields,
        };

        // Never log from inside the layer; a bad record is skipped.
        if let Ok(line) = record.to_line() {
            self.sink.submit(&line);
        }
    }
}

/// Collects the message and the remaining event fields.
#[derive(Default)]
struct JsonVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl JsonVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for JsonVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let mut buf = String::new();
        let _ = write!(&mut buf, "{value:?}");

        if field.name() == "message" {
            self.message = Some(buf);
        } else {
            self.insert(field, Value::String(buf));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.insert(field, Value::Number(n));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }
}
