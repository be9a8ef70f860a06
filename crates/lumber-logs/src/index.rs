//! Per-severity byte-offset index over a JSON-line log file.
//!
//! This module provides:
//! - [`SeverityIndex`] - Offsets of line ends, one sequence per level
//! - [`line_level`] - Cheap severity extraction from a raw line
//!
//! A line of severity `X` is recorded in the sequence of `X` and of every
//! less severe level, so the sequence for `L` holds the lines whose
//! severity is at least `L`. The trace sequence therefore holds every
//! levelled line.

use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use once_cell::sync::Lazy;
use regex::bytes::Regex;
use tracing::debug;

use crate::error::Result;
use crate::types::LogLevel;

/// Default maximum number of offsets retained per level.
pub const DEFAULT_MAX_OFFSETS: usize = 5000;

/// Default number of oldest offsets dropped when a level overflows.
pub const DEFAULT_TRIM_COUNT: usize = 1000;

/// Matches the level field without parsing the JSON object.
static LEVEL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""level":"(trace|debug|info|warn|error|fatal|panic)""#)
        .unwrap_or_else(|_| unreachable!())
});

/// Extracts the severity of a raw log line, if it carries one.
#[must_use]
pub fn line_level(line: &[u8]) -> Option<LogLevel> {
    LEVEL_REGEX
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| LogLevel::from_wire(m.as_bytes()))
}

/// Offsets of line ends in one log file, kept per severity level.
#[derive(Debug, Clone)]
pub struct SeverityIndex {
    offsets: [Vec<u64>; LogLevel::ALL.len()],
    /// End of the last complete line scanned
    scanned_offset: u64,
    max_offsets: usize,
    trim_count: usize,
}

impl Default for SeverityIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SeverityIndex {
    /// Creates an empty index with the default retention limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_OFFSETS, DEFAULT_TRIM_COUNT)
    }

    /// Creates an empty index with custom retention limits.
    ///
    /// `trim_count` is clamped to `1..=max_offsets`.
    #[must_use]
    pub fn with_limits(max_offsets: usize, trim_count: usize) -> Self {
        let max_offsets = max_offsets.max(1);
        Self {
            offsets: Default::default(),
            scanned_offset: 0,
            max_offsets,
            trim_count: trim_count.clamp(1, max_offsets),
        }
    }

    /// Scans `reader` from `from_offset` and records every new complete line.
    ///
    /// Returns how many of the scanned lines have a severity of at least
    /// `threshold`. A trailing line without a newline is left for the next
    /// call.
    ///
    /// # Errors
    ///
    /// Returns an error if seeking or reading fails.
    pub fn extend<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        from_offset: u64,
        threshold: LogLevel,
    ) -> Result<usize> {
        reader.seek(SeekFrom::Start(from_offset))?;
        let mut reader = BufReader::new(reader);

        let mut offset = from_offset;
        let mut new_lines = 0;
        let mut line = Vec::new();

        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 || line.last() != Some(&b'\n') {
                break;
            }
            offset += read as u64;
            self.scanned_offset = self.scanned_offset.max(offset);

            let Some(level) = line_level(&line) else {
                continue;
            };
            self.record(level, offset);
            if level >= threshold {
                new_lines += 1;
            }
        }

        debug!(from_offset, scanned_offset = self.scanned_offset, new_lines, "index extended");
        Ok(new_lines)
    }

    /// Records a line of `level` ending at `offset` in every sequence it belongs to.
    fn record(&mut self, level: LogLevel, offset: u64) {
        for included in &LogLevel::ALL[..=level.index()] {
            let seq = &mut self.offsets[included.index()];
            if seq.last().is_some_and(|last| *last >= offset) {
                continue;
            }
            seq.push(offset);
            if seq.len() > self.max_offsets {
                seq.drain(..self.trim_count);
            }
        }
    }

    /// Offsets retained for `level`, oldest first.
    #[must_use]
    pub fn offsets(&self, level: LogLevel) -> &[u64] {
        &self.offsets[level.index()]
    }

    /// Number of offsets retained for `level`.
    #[must_use]
    pub fn len(&self, level: LogLevel) -> usize {
        self.offsets[level.index()].len()
    }

    /// Returns true if no line has been indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.iter().all(Vec::is_empty)
    }

    /// End of the last complete line scanned.
    #[must_use]
    pub const fn scanned_offset(&self) -> u64 {
        self.scanned_offset
    }

    /// Maximum offsets retained per level.
    #[must_use]
    pub const fn max_offsets(&self) -> usize {
        self.max_offsets
    }

    /// Drops every offset and resets the scan position.
    pub fn clear(&mut self) {
        for seq in &mut self.offsets {
            seq.clear();
        }
        self.scanned_offset = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn line(level: &str, message: &str) -> String {
        format!("{{\"level\":\"{level}\",\"time\":\"2024-03-01T21:47:55.235767000Z\",\"message\":\"{message}\"}}\n")
    }

    fn file_of(lines: &[String]) -> Cursor<Vec<u8>> {
        Cursor::new(lines.concat().into_bytes())
    }

    fn ends(lines: &[String]) -> Vec<u64> {
        let mut pos = 0u64;
        lines
            .iter()
            .map(|l| {
                pos += l.len() as u64;
                pos
            })
            .collect()
    }

    #[test]
    fn line_level_matches_raw_bytes() {
        assert_eq!(line_level(line("warn", "x").as_bytes()), Some(LogLevel::Warn));
        assert_eq!(line_level(b"{\"level\":\"verbose\"}"), None);
        assert_eq!(line_level(b"plain text line"), None);
        // Spacing after the colon is not tolerated; writers never emit it.
        assert_eq!(line_level(b"{\"level\": \"info\"}"), None);
    }

    #[test]
    fn extend_cascades_into_less_severe_levels() {
        let lines = vec![
            line("info", "a"),
            line("error", "b"),
            line("trace", "c"),
            line("panic", "d"),
        ];
        let end = ends(&lines);
        let mut index = SeverityIndex::new();
        let new = index
            .extend(&mut file_of(&lines), 0, LogLevel::Trace)
            .expect("extend");

        assert_eq!(new, 4);
        assert_eq!(index.offsets(LogLevel::Trace), &end[..]);
        assert_eq!(index.offsets(LogLevel::Debug), &[end[0], end[1], end[3]]);
        assert_eq!(index.offsets(LogLevel::Info), &[end[0], end[1], end[3]]);
        assert_eq!(index.offsets(LogLevel::Warn), &[end[1], end[3]]);
        assert_eq!(index.offsets(LogLevel::Error), &[end[1], end[3]]);
        assert_eq!(index.offsets(LogLevel::Fatal), &[end[3]]);
        assert_eq!(index.offsets(LogLevel::Panic), &[end[3]]);
    }

    #[test]
    fn extend_counts_lines_at_or_above_threshold() {
        let lines = vec![line("debug", "a"), line("warn", "b"), line("fatal", "c")];
        let mut index = SeverityIndex::new();
        let new = index
            .extend(&mut file_of(&lines), 0, LogLevel::Warn)
            .expect("extend");
        assert_eq!(new, 2);
    }

    #[test]
    fn extend_skips_unlevelled_lines() {
        let lines = vec![
            line("info", "a"),
            "not json at all\n".to_string(),
            line("info", "b"),
        ];
        let end = ends(&lines);
        let mut index = SeverityIndex::new();
        index
            .extend(&mut file_of(&lines), 0, LogLevel::Trace)
            .expect("extend");
        assert_eq!(index.offsets(LogLevel::Trace), &[end[0], end[2]]);
        assert_eq!(index.scanned_offset(), end[2]);
    }

    #[test]
    fn extend_leaves_partial_trailing_line() {
        let complete = line("info", "done");
        let mut bytes = complete.clone().into_bytes();
        bytes.extend_from_slice(b"{\"level\":\"error\",\"mess");
        let mut index = SeverityIndex::new();
        index
            .extend(&mut Cursor::new(bytes.clone()), 0, LogLevel::Trace)
            .expect("extend");
        assert_eq!(index.len(LogLevel::Trace), 1);
        assert_eq!(index.scanned_offset(), complete.len() as u64);

        // The writer finishes the line; the next scan picks it up exactly once.
        bytes.extend_from_slice(b"age\":\"late\"}\n");
        let from = index.scanned_offset();
        let new = index
            .extend(&mut Cursor::new(bytes.clone()), from, LogLevel::Error)
            .expect("extend");
        assert_eq!(new, 1);
        assert_eq!(index.len(LogLevel::Error), 1);
        assert_eq!(index.offsets(LogLevel::Trace).last(), Some(&(bytes.len() as u64)));
    }

    #[test]
    fn extend_from_scanned_offset_appends_only() {
        let mut lines = vec![line("info", "a"), line("info", "b")];
        let mut index = SeverityIndex::new();
        index
            .extend(&mut file_of(&lines), 0, LogLevel::Trace)
            .expect("extend");

        lines.push(line("warn", "c"));
        let from = index.scanned_offset();
        let new = index
            .extend(&mut file_of(&lines), from, LogLevel::Info)
            .expect("extend");
        assert_eq!(new, 1);
        assert_eq!(index.offsets(LogLevel::Trace), &ends(&lines)[..]);
    }

    #[test]
    fn rescanning_does_not_duplicate_offsets() {
        let lines = vec![line("info", "a"), line("info", "b")];
        let mut index = SeverityIndex::new();
        index
            .extend(&mut file_of(&lines), 0, LogLevel::Trace)
            .expect("extend");
        index
            .extend(&mut file_of(&lines), 0, LogLevel::Trace)
            .expect("extend");
        assert_eq!(index.len(LogLevel::Trace), 2);
    }

    #[test]
    fn trimming_drops_oldest_block_per_level() {
        let lines: Vec<String> = (0..6000).map(|i| line("debug", &format!("m{i}"))).collect();
        let end = ends(&lines);
        let mut index = SeverityIndex::new();
        index
            .extend(&mut file_of(&lines), 0, LogLevel::Trace)
            .expect("extend");

        // Crossed 5000 once at line 5001: 4001 kept, then 999 more appended.
        assert_eq!(index.len(LogLevel::Debug), 5000);
        assert_eq!(index.offsets(LogLevel::Debug)[0], end[1000]);
        assert_eq!(index.len(LogLevel::Trace), 5000);
        // Levels that never received a line stay empty.
        assert_eq!(index.len(LogLevel::Info), 0);
    }

    #[test]
    fn trimming_is_per_level() {
        let mut lines: Vec<String> = (0..12).map(|i| line("trace", &format!("t{i}"))).collect();
        lines.push(line("error", "e"));
        let mut index = SeverityIndex::with_limits(10, 4);
        index
            .extend(&mut file_of(&lines), 0, LogLevel::Trace)
            .expect("extend");

        assert_eq!(index.len(LogLevel::Error), 1);
        assert!(index.len(LogLevel::Trace) <= 10);
        assert_ne!(
            index.offsets(LogLevel::Trace).first(),
            index.offsets(LogLevel::Error).first()
        );
    }

    #[test]
    fn with_limits_clamps_trim_count() {
        let index = SeverityIndex::with_limits(0, 50);
        assert_eq!(index.max_offsets(), 1);
    }

    #[test]
    fn clear_resets_everything() {
        let lines = vec![line("info", "a")];
        let mut index = SeverityIndex::new();
        index
            .extend(&mut file_of(&lines), 0, LogLevel::Trace)
            .expect("extend");
        assert!(!index.is_empty());

        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.scanned_offset(), 0);
    }

    fn level_strategy() -> impl Strategy<Value = LogLevel> {
        (0usize..LogLevel::ALL.len()).prop_map(|i| LogLevel::ALL[i])
    }

    proptest! {
        #[test]
        fn sequences_hold_lines_at_or_above_level(
            levels in proptest::collection::vec(level_strategy(), 0..200),
            split in 0usize..200,
        ) {
            let lines: Vec<String> = levels.iter().map(|l| line(l.as_str(), "p")).collect();
            let end = ends(&lines);

            // Index in two steps to exercise incremental extension.
            let split = split.min(lines.len());
            let mut index = SeverityIndex::new();
            index.extend(&mut file_of(&lines[..split]), 0, LogLevel::Trace).expect("extend");
            let from = index.scanned_offset();
            index.extend(&mut file_of(&lines), from, LogLevel::Trace).expect("extend");

            for level in LogLevel::ALL {
                let expected: Vec<u64> = levels
                    .iter()
                    .zip(&end)
                    .filter(|(l, _)| **l >= level)
                    .map(|(_, e)| *e)
                    .collect();
                prop_assert_eq!(index.offsets(level), &expected[..]);
                prop_assert!(index.offsets(level).windows(2).all(|w| w[0] < w[1]));
            }
        }

        #[test]
        fn retained_offsets_never_exceed_limit(count in 0usize..120) {
            let lines: Vec<String> = (0..count).map(|i| line("info", &format!("{i}"))).collect();
            let mut index = SeverityIndex::with_limits(50, 10);
            index.extend(&mut file_of(&lines), 0, LogLevel::Trace).expect("extend");
            for level in LogLevel::ALL {
                prop_assert!(index.len(level) <= 50);
            }
        }
    }
}
