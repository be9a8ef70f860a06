//! # lumber-cli
//!
//! Command-line front end for `lumber-logs`.
//!
//! Provides commands for:
//! - Viewing a JSON-line log file by severity, one page at a time or following
//!   new lines
//! - Generating synthetic logs for trying the viewer out
//!
//! # Architecture
//!
//! `view` drives a [`lumber_logs::QueryActor`]; `gen` writes through a
//! [`lumber_logs::Logger`] over an [`lumber_logs::AsyncSink`].
//!
//! ```text
//! ┌────────────┐   Logger/AsyncSink   ┌──────────┐   QueryActor   ┌─────────────┐
//! │ lumber gen │─────────────────────►│ app.log  │◄───────────────│ lumber view │
//! └────────────┘                      └──────────┘                └─────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod diagnostics;
pub mod error;

pub use cli::{Cli, Commands, GenArgs, ViewArgs};
pub use error::CliError;
