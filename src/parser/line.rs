use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// Layout of the `date` and `time` fields once joined with a single space.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const FIELD_SEPARATOR: char = '\t';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("line has {fields} tab-separated field(s), at least 3 are required")]
    TooFewFields { fields: usize },

    #[error("failed to parse timestamp '{value}' with format '{format}': {reason}")]
    Timestamp {
        value: String,
        format: &'static str,
        reason: String,
    },
}

/// A line split into its timestamp source and the message that is shipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitLine<'a> {
    pub date: &'a str,
    pub time: &'a str,
    /// Everything after the second tab, internal tabs preserved.
    pub message: &'a str,
}

/// Split an access-log data line into `date`, `time` and the remainder.
pub fn split_line(line: &str) -> Result<SplitLine<'_>, LineError> {
    let mut parts = line.splitn(3, FIELD_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(date), Some(time), Some(message)) => Ok(SplitLine {
            date,
            time,
            message,
        }),
        (_, Some(_), None) => Err(LineError::TooFewFields { fields: 2 }),
        _ => Err(LineError::TooFewFields { fields: 1 }),
    }
}

/// Parse the `date` and `time` fields as a UTC instant.
pub fn parse_timestamp(date: &str, time: &str) -> Result<DateTime<Utc>, LineError> {
    let value = format!("{} {}", date, time);
    NaiveDateTime::parse_from_str(&value, TIMESTAMP_FORMAT)
        .map(|ndt| Utc.from_utc_datetime(&ndt))
        .map_err(|e| LineError::Timestamp {
            value,
            format: TIMESTAMP_FORMAT,
            reason: e.to_string(),
        })
}
