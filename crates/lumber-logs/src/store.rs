//! Paginated, level-filtered reads over one JSON-lines log file.
//!
//! This module provides:
//! - [`StoreConfig`] - Index retention limits
//! - [`LogStore`] - Owns the open file and its [`SeverityIndex`]
//!
//! Pages are addressed from the end of the file: `offset_from_end` counts
//! indexed lines of the requested level back from the newest one. Every
//! `get` also extends the index over whatever was appended since the last
//! scan, so paging and tailing share one code path.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{LogError, Result};
use crate::format::PrettyFormatter;
use crate::index::{DEFAULT_MAX_OFFSETS, DEFAULT_TRIM_COUNT, SeverityIndex, line_level};
use crate::traits::LineFormatter;
use crate::types::{LogLevel, Page};

/// Configuration for the log store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Maximum offsets retained per level.
    pub max_offsets: usize,
    /// Offsets evicted at once when a level exceeds `max_offsets`.
    pub trim_count: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_offsets: DEFAULT_MAX_OFFSETS,
            trim_count: DEFAULT_TRIM_COUNT,
        }
    }
}

impl StoreConfig {
    /// Sets the per-level retention limit.
    #[must_use]
    pub const fn with_max_offsets(mut self, max_offsets: usize) -> Self {
        self.max_offsets = max_offsets;
        self
    }

    /// Sets how many offsets are evicted per trim.
    #[must_use]
    pub const fn with_trim_count(mut self, trim_count: usize) -> Self {
        self.trim_count = trim_count;
        self
    }
}

/// A log file opened for reading, plus its severity index.
///
/// Requests are serialized by the [`crate::QueryActor`] that owns the store.
pub struct LogStore {
    config: StoreConfig,
    file: Option<File>,
    path: Option<PathBuf>,
    index: SeverityIndex,
    formatter: Arc<dyn LineFormatter>,
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("config", &self.config)
            .field("path", &self.path)
            .field("scanned_offset", &self.index.scanned_offset())
            .finish_non_exhaustive()
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(Arc::new(PrettyFormatter::new()))
    }
}

impl LogStore {
    /// Creates a closed store with default limits.
    #[must_use]
    pub fn new(formatter: Arc<dyn LineFormatter>) -> Self {
        Self::with_config(StoreConfig::default(), formatter)
    }

    /// Creates a closed store with the given limits.
    #[must_use]
    pub fn with_config(config: StoreConfig, formatter: Arc<dyn LineFormatter>) -> Self {
        Self {
            config,
            file: None,
            path: None,
            index: SeverityIndex::with_limits(config.max_offsets, config.trim_count),
            formatter,
        }
    }

    /// Opens `path` read-only and indexes it from the start.
    ///
    /// Any file already open is closed first.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Io`] if the file cannot be opened or read.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.close();

        let mut file = File::open(path)?;
        self.index.extend(&mut file, 0, LogLevel::Trace)?;

        info!(
            path = %path.display(),
            lines = self.index.len(LogLevel::Trace),
            bytes = self.index.scanned_offset(),
            "opened log file"
        );

        self.file = Some(file);
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Drops the file handle and the index. Closing a closed store is a no-op.
    pub fn close(&mut self) {
        if let Some(path) = self.path.take() {
            debug!(path = %path.display(), "closed log file");
        }
        self.file = None;
        self.index.clear();
    }

    /// Returns a page of up to `line_count` lines of at least `level`,
    /// ending `offset_from_end` lines before the newest one.
    ///
    /// When the page reaches back to the first indexed line, it is read from
    /// the start of the file.
    ///
    /// # Errors
    ///
    /// - [`LogError::NoFileOpen`] if no file is open
    /// - [`LogError::NoRecords`] if nothing of `level` is indexed
    /// - [`LogError::RangeExhausted`] if the page lies outside the index
    /// - [`LogError::Format`] if the formatter rejects a line
    /// - [`LogError::Io`] on seek or read failures
    pub fn get(&mut self, offset_from_end: i64, line_count: i64, level: LogLevel) -> Result<Page> {
        self.read_page(offset_from_end, line_count, level, None)
    }

    /// Returns the newest `line_count` records of at least `level`.
    ///
    /// Unlike [`Self::get`] the page never reaches past the requested count
    /// when it touches the first indexed line: older records are cut per
    /// formatted record, so multi-line messages stay whole. Unlevelled lines
    /// directly before the oldest kept record are kept with it.
    ///
    /// # Errors
    ///
    /// Same as [`Self::get`].
    pub fn tail(&mut self, line_count: usize, level: LogLevel) -> Result<Page> {
        let requested = i64::try_from(line_count).map_err(|_| LogError::RangeExhausted)?;
        self.read_page(0, requested, level, Some(line_count))
    }

    /// Indexes lines appended since the last scan without reading a page.
    ///
    /// Returns how many of them are at least `level`. Unlike [`Self::get`]
    /// this also works while `level` has no records yet.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::NoFileOpen`] if no file is open, or
    /// [`LogError::Io`] on read failures.
    pub fn refresh(&mut self, level: LogLevel) -> Result<usize> {
        let Some(file) = self.file.as_mut() else {
            return Err(LogError::NoFileOpen);
        };
        let scanned = self.index.scanned_offset();
        self.index.extend(file, scanned, level)
    }

    /// Returns true if a file is open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Path of the open file.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The severity index of the open file.
    #[must_use]
    pub const fn index(&self) -> &SeverityIndex {
        &self.index
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ========== Internal Methods ==========

    fn read_page(
        &mut self,
        offset_from_end: i64,
        line_count: i64,
        level: LogLevel,
        keep_last: Option<usize>,
    ) -> Result<Page> {
        let Some(file) = self.file.as_mut() else {
            return Err(LogError::NoFileOpen);
        };

        let offsets = self.index.offsets(level);
        if offsets.is_empty() {
            return Err(LogError::NoRecords(level));
        }
        let (start, end) = page_bounds(offsets.len(), offset_from_end, line_count)?;
        let start_offset = start.map_or(0, |i| offsets[i]);
        let end_offset = offsets[end];

        let raw = read_range(file, start_offset, end_offset)?;
        let mut records = format_records(self.formatter.as_ref(), &raw, level)?;
        if let Some(count) = keep_last {
            keep_last_records(&mut records, count);
        }
        let body = join_records(records);

        let scanned = self.index.scanned_offset();
        let new_lines = self.index.extend(file, scanned, level)?;

        debug!(
            offset_from_end,
            line_count,
            %level,
            start_offset,
            end_offset,
            new_lines,
            "served page"
        );

        Ok(Page { body, new_lines })
    }
}

// ========== Internal Functions ==========

/// One formatted line of a page.
struct Record {
    /// False for lines without a recognizable level.
    levelled: bool,
    text: Vec<u8>,
}

/// Formats the non-blank lines of `raw` that are at least `level`.
///
/// Lines without a recognizable level are formatted as-is.
fn format_records(formatter: &dyn LineFormatter, raw: &[u8], level: LogLevel) -> Result<Vec<Record>> {
    let mut records = Vec::new();

    for line in raw.split(|b| *b == b'\n') {
        if line.trim_ascii().is_empty() {
            continue;
        }
        let found = line_level(line);
        if found.is_some_and(|found| found < level) {
            continue;
        }
        records.push(Record {
            levelled: found.is_some(),
            text: formatter.format_line(&String::from_utf8_lossy(line))?,
        });
    }

    Ok(records)
}

/// Drops everything before the `count`-th levelled record from the end,
/// except the unlevelled records right in front of it.
fn keep_last_records(records: &mut Vec<Record>, count: usize) {
    if count == 0 {
        records.clear();
        return;
    }

    let Some(mut cut) = records
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, record)| record.levelled)
        .nth(count - 1)
        .map(|(i, _)| i)
    else {
        return;
    };
    while cut > 0 && !records[cut - 1].levelled {
        cut -= 1;
    }
    records.drain(..cut);
}

fn join_records(records: Vec<Record>) -> Vec<u8> {
    let texts: Vec<Vec<u8>> = records.into_iter().map(|record| record.text).collect();
    texts.join(&b'\n').trim_ascii().to_vec()
}

/// Resolves a page request against a sequence of `len` offsets.
///
/// Returns the index whose offset starts the page (`None` for the start of
/// the file) and the index whose offset ends it.
fn page_bounds(len: usize, offset_from_end: i64, line_count: i64) -> Result<(Option<usize>, usize)> {
    if line_count < 0 {
        return Err(LogError::RangeExhausted);
    }
    let len = i64::try_from(len).map_err(|_| LogError::RangeExhausted)?;

    let end = (len - 1)
        .checked_sub(offset_from_end)
        .filter(|end| (0..len).contains(end))
        .ok_or(LogError::RangeExhausted)?;
    let start = end - line_count;

    let to_index = |i: i64| usize::try_from(i).map_err(|_| LogError::RangeExhausted);
    let start = if start > 0 { Some(to_index(start)?) } else { None };
    Ok((start, to_index(end)?))
}

/// Reads the bytes between two line-end offsets, minus the final newline.
fn read_range(file: &mut File, start_offset: u64, end_offset: u64) -> Result<Vec<u8>> {
    let Some(length) = end_offset
        .checked_sub(start_offset + 1)
        .filter(|length| *length > 0)
    else {
        return Ok(Vec::new());
    };

    let length = usize::try_from(length).map_err(|_| LogError::RangeExhausted)?;
    let mut buf = vec![0u8; length];
    file.seek(SeekFrom::Start(start_offset))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}
