//! # lumber-logs
//!
//! Indexed JSON-line logs: write them asynchronously, page through them by
//! severity.
//!
//! This crate provides:
//!
//! - [`LogLevel`] - Severity levels (Trace, Debug, Info, Warn, Error, Fatal, Panic)
//! - [`LogRecord`] - One structured log line
//! - [`SeverityIndex`] - Per-level line-end offsets of a log file
//! - [`LogStore`] - Level-filtered, paginated reads over one file
//! - [`QueryActor`] / [`QueryHandle`] - Single-owner request loop around a store
//! - [`AsyncSink`] - Bounded, single-worker writer with blocking or dropping policy
//! - [`Logger`] - JSON-line logger over a sink, with fatal shutdown
//! - [`JsonLineLayer`] - `tracing` layer writing the same line format
//! - [`PrettyFormatter`] - Colored, column-aligned rendering of lines
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lumber_logs::{AsyncSink, LogLevel, LogStore, Logger, QueryActor, SinkConfig};
//!
//! # async fn demo() -> lumber_logs::Result<()> {
//! let file = std::fs::File::create("app.log")?;
//! let sink = Arc::new(AsyncSink::new(file, SinkConfig::default())?);
//! let log = Logger::new("demo", LogLevel::Debug, Arc::clone(&sink));
//! log.at(LogLevel::Warn).field("attempt", 2).msg("retrying");
//! sink.finalize();
//!
//! let (handle, _task) = QueryActor::spawn(LogStore::default());
//! handle.open("app.log").await?;
//! let page = handle.get(0, 20, LogLevel::Info).await?;
//! println!("{}", page.text());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod actor;
pub mod error;
pub mod format;
pub mod index;
pub mod layer;
pub mod logger;
pub mod sink;
pub mod store;
pub mod traits;
pub mod types;

// Re-export main types
pub use actor::{LogRequest, QueryActor, QueryHandle, DEFAULT_FOLLOW_INTERVAL};
pub use error::{LogError, Result};
pub use format::PrettyFormatter;
pub use index::{SeverityIndex, line_level};
pub use layer::JsonLineLayer;
pub use logger::{EventBuilder, Logger};
pub use sink::{AsyncSink, Delivery, ExitAction, SinkConfig, SinkPolicy, SinkStats};
pub use store::{LogStore, StoreConfig};
pub use traits::LineFormatter;
pub use types::{LogLevel, LogRecord, LogRecordBuilder, Page};
