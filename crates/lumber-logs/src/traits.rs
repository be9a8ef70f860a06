//! Traits for pluggable collaborators of the log store.
//!
//! This module provides the [`LineFormatter`] trait, the seam through which
//! the store turns raw JSON lines into human-readable output.

use crate::error::Result;

/// Renders one raw JSON log line for display.
///
/// The store calls this once per line inside a page, in file order. An
/// error aborts the whole page; no partial output is returned.
pub trait LineFormatter: Send + Sync {
    /// Formats a single raw line, without its trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LogError::Format`] if the line is not valid JSON.
    fn format_line(&self, raw: &str) -> Result<Vec<u8>>;
}

impl<F> LineFormatter for F
where
    F: Fn(&str) -> Result<Vec<u8>> + Send + Sync,
{
    fn format_line(&self, raw: &str) -> Result<Vec<u8>> {
        self(raw)
    }
}
