//! Per-column validation checks for feed rows

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A check bound to a column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub column: String,
    #[serde(flatten)]
    pub check: Check,
}

impl ColumnRule {
    pub fn new(column: impl Into<String>, check: Check) -> Self {
        Self {
            column: column.into(),
            check,
        }
    }

    /// Validate one value, returning the rejection reason on failure
    pub fn validate(&self, value: &str) -> Option<String> {
        if self.check.accepts(value) {
            None
        } else {
            Some(self.check.reason(&self.column))
        }
    }
}

/// Value checks understood by the CSV feed transformer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Check {
    /// ISO-8601 / RFC 3339 timestamp or plain date
    Timestamp,
    /// Number >= 0
    NonNegative,
    /// Number > 0
    Positive,
    Integer,
    Email,
    /// Closed vocabulary
    OneOf { values: Vec<String> },
}

impl Check {
    pub fn accepts(&self, value: &str) -> bool {
        let value = value.trim();
        match self {
            Check::Timestamp => is_timestamp(value),
            Check::NonNegative => parse_number(value).is_some_and(|n| n >= 0.0),
            Check::Positive => parse_number(value).is_some_and(|n| n > 0.0),
            Check::Integer => value.parse::<i64>().is_ok(),
            Check::Email => value.contains('@') && value.contains('.'),
            Check::OneOf { values } => values.iter().any(|v| v == value),
        }
    }

    fn reason(&self, column: &str) -> String {
        match self {
            Check::Timestamp => format!("Invalid {} timestamp", column),
            Check::NonNegative => format!("Invalid {} (must be non-negative)", column),
            Check::Positive => format!("Invalid {} (must be positive)", column),
            Check::Integer => format!("{} must be an integer", column),
            Check::Email => format!("Invalid {} format", column),
            Check::OneOf { values } => {
                format!("Invalid {} (must be one of {})", column, values.join(", "))
            },
        }
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|n| n.is_finite())
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn is_timestamp(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }

    // RFC 3339 requires an offset; `Z` is accepted as UTC
    if DateTime::parse_from_rfc3339(value).is_ok() {
        return true;
    }

    if NAIVE_DATETIME_FORMATS
        .iter()
        .any(|fmt| NaiveDateTime::parse_from_str(value, fmt).is_ok())
    {
        return true;
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}
