//! CloudFront access-log parsing.
//!
//! Log objects are newline-separated, tab-delimited text. Lines starting with
//! `#` carry format metadata (`#Version`, `#Fields`) and are skipped, as are
//! empty lines. Every other line becomes a [`LogRecord`], even when its
//! timestamp cannot be read.

pub mod line;
pub mod object;

pub use line::{parse_timestamp, split_line, LineError, TIMESTAMP_FORMAT};
pub use object::{decompress, format_bytes, log_group_from_key, DecompressError};

use chrono::{DateTime, Utc};
use std::slice::Split;

/// A parsed access-log line ready to be shipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogRecord {
    pub fn new(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }
}

/// One produced record together with the non-fatal problem found on its line.
#[derive(Debug, Clone)]
pub struct ParsedLine {
    /// 1-based line number within the object.
    pub line_number: usize,
    pub record: LogRecord,
    /// Set when the timestamp fell back to processing time.
    pub error: Option<LineError>,
}

type LineSplit<'a> = Split<'a, u8, fn(&u8) -> bool>;

fn is_newline(b: &u8) -> bool {
    *b == b'\n'
}

/// Lazy iterator over the records of one decompressed log object.
///
/// Cloning snapshots the current position; call [`LogLines::new`] again on
/// the same bytes to walk the object from the start.
#[derive(Clone)]
pub struct LogLines<'a> {
    lines: LineSplit<'a>,
    line_number: usize,
}

impl<'a> LogLines<'a> {
    pub fn new(content: &'a [u8]) -> Self {
        Self {
            lines: content.split(is_newline as fn(&u8) -> bool),
            line_number: 0,
        }
    }

    /// Drop the per-line diagnostics and yield records only.
    pub fn records(self) -> impl Iterator<Item = LogRecord> + 'a {
        self.map(|parsed| parsed.record)
    }
}

impl Iterator for LogLines<'_> {
    type Item = ParsedLine;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = self.lines.next()?;
            self.line_number += 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() || raw[0] == b'#' {
                continue;
            }

            let text = String::from_utf8_lossy(raw);
            return Some(parse_record(self.line_number, &text));
        }
    }
}

fn parse_record(line_number: usize, text: &str) -> ParsedLine {
    match split_line(text) {
        Ok(split) => {
            // The log store rejects empty events, so a bare prefix is shipped as is.
            let message = if split.message.is_empty() { text } else { split.message };
            match parse_timestamp(split.date, split.time) {
                Ok(timestamp) => ParsedLine {
                    line_number,
                    record: LogRecord::new(timestamp, message),
                    error: None,
                },
                Err(e) => ParsedLine {
                    line_number,
                    record: LogRecord::new(Utc::now(), message),
                    error: Some(e),
                },
            }
        }
        // Without a date/time prefix there is nothing to strip; keep the line whole.
        Err(e) => ParsedLine {
            line_number,
            record: LogRecord::new(Utc::now(), text),
            error: Some(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_comments_and_empty_lines() {
        let content = b"#Version: 1.0\n#Fields: date time x-edge-location\n\n2020-06-18\t03:38:13\tSYD4\n\n";
        let parsed: Vec<_> = LogLines::new(content).collect();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].line_number, 4);
        assert_eq!(parsed[0].record.message, "SYD4");
        assert!(parsed[0].error.is_none());
    }

    #[test]
    fn test_only_comments_yields_nothing() {
        let content = b"#Version: 1.0\n#Fields: date time\n";
        assert_eq!(LogLines::new(content).count(), 0);
    }

    #[test]
    fn test_crlf_line_endings() {
        let content = b"2020-06-18\t03:38:13\tSYD4\r\n2020-06-18\t03:38:14\tSYD5\r\n";
        let records: Vec<_> = LogLines::new(content).records().collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].message, "SYD5");
    }

    #[test]
    fn test_bad_timestamp_falls_back_to_now() {
        let before = Utc::now();
        let parsed: Vec<_> = LogLines::new(b"not-a-date\t03:38:13\tSYD4").collect();
        let after = Utc::now();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].record.message, "SYD4");
        assert!(parsed[0].record.timestamp >= before && parsed[0].record.timestamp <= after);
        assert!(matches!(parsed[0].error, Some(LineError::Timestamp { .. })));
    }

    #[test]
    fn test_line_without_tabs_is_kept_whole() {
        let parsed: Vec<_> = LogLines::new(b"garbage line").collect();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].record.message, "garbage line");
        assert_eq!(parsed[0].error, Some(LineError::TooFewFields { fields: 1 }));
    }

    #[test]
    fn test_empty_remainder_keeps_whole_line() {
        let parsed: Vec<_> = LogLines::new(b"2020-06-18\t03:38:13\t\n").collect();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].record.message, "2020-06-18\t03:38:13\t");
        assert_eq!(parsed[0].record.timestamp.to_rfc3339(), "2020-06-18T03:38:13+00:00");
        assert!(parsed[0].error.is_none());
    }

    #[test]
    fn test_preserves_input_order() {
        let content = b"2020-06-18\t03:38:15\tlate\n2020-06-18\t03:38:13\tearly\n";
        let messages: Vec<_> = LogLines::new(content).records().map(|r| r.message).collect();
        assert_eq!(messages, vec!["late", "early"]);
    }

    #[test]
    fn test_restart_from_same_bytes() {
        let content = b"2020-06-18\t03:38:13\ta\n2020-06-18\t03:38:14\tb\n";
        let mut lines = LogLines::new(content);
        lines.next();

        assert_eq!(lines.count(), 1);
        assert_eq!(LogLines::new(content).count(), 2);
    }
}
