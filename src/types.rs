use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Readings and tables
// ---------------------------------------------------------------------------

/// One timestamped meter reading. The timestamp is kept as the raw cell text
/// so partition outputs and metadata reproduce the input exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: String,
    pub value: f64,
}

impl Reading {
    pub fn parsed_time(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }
}

/// A table row: the bound reading plus every column of the original record.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub reading: Reading,
    pub record: csv::StringRecord,
}

/// Ordered rows of one CSV file, in input order.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: csv::StringRecord,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn readings(&self) -> impl Iterator<Item = &Reading> {
        self.rows.iter().map(|r| &r.reading)
    }

    /// Appends another table's rows. Headers are taken from the first
    /// non-empty table appended.
    pub fn extend(&mut self, other: Table) {
        if self.headers.is_empty() {
            self.headers = other.headers;
        }
        self.rows.extend(other.rows);
    }
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parses the timestamp shapes seen in meter exports. Offsets are dropped;
/// the wall-clock time is what the plots care about.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// ---------------------------------------------------------------------------
// Window statistics
// ---------------------------------------------------------------------------

/// Metadata record written once per window to `statistics.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowStats {
    pub id: usize,
    pub file: String,
    pub start: String,
    pub end: String,
    /// Sample standard deviation. NaN for single-row windows, stored as `null`.
    #[serde(with = "nan_as_null")]
    pub stdev: f64,
}

impl PartialEq for WindowStats {
    fn eq(&self, other: &Self) -> bool {
        let same_stdev =
            self.stdev == other.stdev || (self.stdev.is_nan() && other.stdev.is_nan());
        self.id == other.id
            && self.file == other.file
            && self.start == other.start
            && self.end == other.end
            && same_stdev
    }
}

mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_nan() {
            s.serialize_none()
        } else {
            s.serialize_f64(*v)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NAN))
    }
}

// ---------------------------------------------------------------------------
// Pipeline knobs
// ---------------------------------------------------------------------------

/// Which slice of the full series the bottom plot panel shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextScope {
    /// Rows in the same calendar month as the window's first timestamp.
    Month,
    /// The whole concatenated series.
    Full,
}

impl std::str::FromStr for ContextScope {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "month" => Ok(ContextScope::Month),
            "full" => Ok(ContextScope::Full),
            other => Err(AppError::Config(format!(
                "RENDER_CONTEXT must be 'month' or 'full', got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for ContextScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextScope::Month => write!(f, "month"),
            ContextScope::Full => write!(f, "full"),
        }
    }
}

/// What the renderer does when one window fails to plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    FailFast,
    Continue,
}

impl std::str::FromStr for FailurePolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail_fast" => Ok(FailurePolicy::FailFast),
            "continue" => Ok(FailurePolicy::Continue),
            other => Err(AppError::Config(format!(
                "RENDER_FAILURE must be 'fail_fast' or 'continue', got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::FailFast => write!(f, "fail_fast"),
            FailurePolicy::Continue => write!(f, "continue"),
        }
    }
}

// ---------------------------------------------------------------------------
// Annotation
// ---------------------------------------------------------------------------

/// One choice offered to the labeler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelOption {
    pub id: i64,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_common_timestamp_shapes() {
        let a = parse_timestamp("2016-01-01 05:30:00").unwrap();
        assert_eq!((a.month(), a.hour(), a.minute()), (1, 5, 30));

        let b = parse_timestamp("2016-03-04T10:00:00+02:00").unwrap();
        assert_eq!((b.month(), b.day(), b.hour()), (3, 4, 10));

        let c = parse_timestamp("2020-12-31").unwrap();
        assert_eq!((c.year(), c.hour()), (2020, 0));

        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn nan_stdev_round_trips_through_null() {
        let stats = WindowStats {
            id: 4,
            file: "partition_4.csv".to_string(),
            start: "a".to_string(),
            end: "a".to_string(),
            stdev: f64::NAN,
        };
        let line = serde_json::to_string(&stats).unwrap();
        assert!(line.contains("\"stdev\":null"), "line={line}");

        let back: WindowStats = serde_json::from_str(&line).unwrap();
        assert!(back.stdev.is_nan());
        assert_eq!(back, stats);
    }

    #[test]
    fn record_field_order_matches_metadata_format() {
        let stats = WindowStats {
            id: 0,
            file: "partition_0.csv".to_string(),
            start: "s".to_string(),
            end: "e".to_string(),
            stdev: 1.5,
        };
        assert_eq!(
            serde_json::to_string(&stats).unwrap(),
            r#"{"id":0,"file":"partition_0.csv","start":"s","end":"e","stdev":1.5}"#
        );
    }

    #[test]
    fn knobs_parse_from_config_strings() {
        assert_eq!("month".parse::<ContextScope>().unwrap(), ContextScope::Month);
        assert_eq!("full".parse::<ContextScope>().unwrap(), ContextScope::Full);
        assert!("weekly".parse::<ContextScope>().is_err());
        assert_eq!(
            "continue".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::Continue
        );
        assert!("retry".parse::<FailurePolicy>().is_err());
    }
}
