//! Human-readable rendering of JSON log lines.
//!
//! [`PrettyFormatter`] is the default [`LineFormatter`]: one aligned,
//! optionally colored line per record.
//!
//! ```text
//! 21:47:55.235_767_000 INF ...cli/src/commands/view.rs:71 >  opened component=backend module=viewer
//! ```

// Allow format string pushing for readability in formatter functions
#![allow(clippy::format_push_string)]

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::error::{LogError, Result};
use crate::traits::LineFormatter;
use crate::types::LogLevel;

/// Default width of the caller column.
pub const DEFAULT_CALLER_WIDTH: usize = 30;

const NO_TIME: &str = "--:--:--.---_---_---";
const CALLER_PLACEHOLDER: char = '_';

const RESET: &str = "\x1b[0m";
const BOLD: u8 = 1;
const RED: u8 = 31;
const GREEN: u8 = 32;
const YELLOW: u8 = 33;
const BLUE: u8 = 34;
const MAGENTA: u8 = 35;
const CYAN: u8 = 36;
const DARK_GRAY: u8 = 90;

/// Keys rendered in fixed columns rather than as `key=value` pairs.
const COLUMN_KEYS: [&str; 4] = ["level", "time", "caller", "message"];

/// Colored, column-aligned line formatter.
#[derive(Debug, Clone)]
pub struct PrettyFormatter {
    caller_width: usize,
    color: bool,
}

impl Default for PrettyFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl PrettyFormatter {
    /// Creates a colored formatter with the default caller width.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            caller_width: DEFAULT_CALLER_WIDTH,
            color: true,
        }
    }

    /// Sets the caller column width.
    #[must_use]
    pub const fn with_caller_width(mut self, width: usize) -> Self {
        self.caller_width = width;
        self
    }

    /// Enables or disables ANSI colors.
    #[must_use]
    pub const fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Formats an already parsed record.
    #[must_use]
    pub fn render(&self, record: &Map<String, Value>) -> String {
        let mut out = String::new();

        out.push_str(&self.paint(DARK_GRAY, &format_time(record.get("time"))));
        out.push(' ');
        out.push_str(&self.format_level(record.get("level")));
        out.push(' ');
        out.push_str(&self.format_caller(record.get("caller")));

        if let Some(message) = record.get("message").and_then(Value::as_str) {
            if !message.is_empty() {
                out.push(' ');
                out.push_str(message);
            }
        }

        let mut keys: Vec<&String> = record
            .keys()
            .filter(|k| !COLUMN_KEYS.contains(&k.as_str()))
            .collect();
        keys.sort();

        for key in keys {
            let color = if key == "module" { MAGENTA } else { BLUE };
            out.push(' ');
            out.push_str(&self.paint(color, &format!("{key}=")));
            match &record[key.as_str()] {
                Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
        }

        out
    }

    fn format_level(&self, level: Option<&Value>) -> String {
        let Some(name) = level.and_then(Value::as_str) else {
            return "???".to_string();
        };
        match name.parse::<LogLevel>() {
            Ok(LogLevel::Trace) => self.paint(MAGENTA, "TRC"),
            Ok(LogLevel::Debug) => self.paint(YELLOW, "DBG"),
            Ok(LogLevel::Info) => self.paint(GREEN, "INF"),
            Ok(LogLevel::Warn) => self.paint(RED, "WRN"),
            Ok(level) => {
                let tag = self.paint(RED, level.short_tag());
                self.paint(BOLD, &tag)
            }
            Err(_) => name.chars().take(3).collect::<String>().to_uppercase(),
        }
    }

    fn format_caller(&self, caller: Option<&Value>) -> String {
        let width = self.caller_width;
        let value = caller.and_then(Value::as_str).unwrap_or_default();
        let len = value.chars().count();

        let column = if len < width {
            let mut padded: String = std::iter::repeat_n(CALLER_PLACEHOLDER, width - len).collect();
            padded.push_str(value);
            padded
        } else if len == width || width <= 3 {
            value.to_string()
        } else {
            let tail: String = value.chars().skip(len - (width - 3)).collect();
            format!("...{tail}")
        };

        format!("{column}{}", self.paint(CYAN, " > "))
    }

    fn paint(&self, code: u8, text: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}{RESET}")
        } else {
            text.to_string()
        }
    }
}

impl LineFormatter for PrettyFormatter {
    fn format_line(&self, raw: &str) -> Result<Vec<u8>> {
        let record: Map<String, Value> =
            serde_json::from_str(raw).map_err(|e| LogError::Format(e.to_string()))?;
        Ok(self.render(&record).into_bytes())
    }
}

/// Renders an RFC3339 timestamp as `HH:MM:SS.mmm_uuu_nnn` in its own offset.
fn format_time(time: Option<&Value>) -> String {
    let Some(raw) = time.and_then(Value::as_str) else {
        return NO_TIME.to_string();
    };
    let Ok(parsed) = DateTime::parse_from_rfc3339(raw) else {
        return raw.to_string();
    };
    let nanos = parsed.timestamp_subsec_nanos() % 1_000_000_000;
    format!(
        "{}.{:03}_{:03}_{:03}",
        parsed.format("%H:%M:%S"),
        nanos / 1_000_000,
        (nanos / 1000) % 1000,
        nanos % 1000
    )
}
