//! Cell values and column types for sample tables.

use crate::error::{CellCountError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Storage format used when a timestamp is rendered as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Tokens read as a missing value.
const MISSING_TOKENS: [&str; 5] = ["", "NA", "na", "NaN", "nan"];

/// A single cell in a sample table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Whole number (counts, integer-coded metadata).
    Integer(i64),
    /// Floating point number.
    Real(f64),
    /// True/false flag.
    Boolean(bool),
    /// Date and time without timezone.
    Timestamp(NaiveDateTime),
    /// Free text.
    Text(String),
    /// Missing value.
    Missing,
}

impl Value {
    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Try to get as an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as a float. Integers widen.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render as a categorical level. `None` for missing values.
    pub fn label(&self) -> Option<String> {
        match self {
            Value::Missing => None,
            other => Some(other.to_string()),
        }
    }

    /// Check whether this value equals a literal given as text.
    ///
    /// Numbers compare numerically, booleans case-insensitively, everything
    /// else by its rendered label. Missing never matches.
    pub fn matches_literal(&self, literal: &str) -> bool {
        let literal = literal.trim();
        match self {
            Value::Missing => false,
            Value::Integer(v) => match literal.parse::<f64>() {
                Ok(x) => (*v as f64) == x,
                Err(_) => false,
            },
            Value::Real(v) => match literal.parse::<f64>() {
                Ok(x) => *v == x,
                Err(_) => false,
            },
            Value::Boolean(b) => parse_bool(literal) == Some(*b),
            Value::Timestamp(ts) => parse_timestamp(literal) == Some(*ts),
            Value::Text(s) => s == literal,
        }
    }

    /// Total order used for sorting group keys: missing first, then numbers,
    /// then everything else by label.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self.as_real(), other.as_real()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            _ => match (self.label(), other.label()) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => match (self.as_real(), other.as_real()) {
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    _ => a.cmp(&b),
                },
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Value::Text(s) => write!(f, "{}", s),
            Value::Missing => write!(f, "NA"),
        }
    }
}

/// Declared semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Real,
    Boolean,
    Timestamp,
    Text,
}

impl ColumnType {
    /// SQL type name used in table definitions.
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Text => "TEXT",
        }
    }

    /// Map a declared SQL type back to a column type.
    ///
    /// Unrecognised declarations fall back to text, like SQLite's own
    /// affinity rules do for unknown names.
    pub fn from_sql_name(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();
        if upper.starts_with("INT") {
            ColumnType::Integer
        } else if upper == "REAL" || upper == "FLOAT" || upper == "DOUBLE" {
            ColumnType::Real
        } else if upper == "BOOLEAN" || upper == "BOOL" {
            ColumnType::Boolean
        } else if upper == "TIMESTAMP" || upper == "DATETIME" {
            ColumnType::Timestamp
        } else {
            ColumnType::Text
        }
    }

    /// Whether every present raw value could be read as this type.
    fn accepts(&self, raw: &str) -> bool {
        match self {
            ColumnType::Integer => raw.parse::<i64>().is_ok(),
            ColumnType::Real => raw.parse::<f64>().is_ok(),
            ColumnType::Boolean => parse_bool(raw).is_some(),
            ColumnType::Timestamp => parse_timestamp(raw).is_some(),
            ColumnType::Text => true,
        }
    }

    /// Infer the narrowest type that accepts every non-missing raw value.
    ///
    /// Columns with no present values are text.
    pub fn infer<'a, I>(raw_values: I) -> Self
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        let present = || raw_values.clone().into_iter().map(str::trim).filter(|v| !is_missing_token(v));
        if present().next().is_none() {
            return ColumnType::Text;
        }
        [
            ColumnType::Integer,
            ColumnType::Real,
            ColumnType::Boolean,
            ColumnType::Timestamp,
        ]
        .into_iter()
        .find(|ty| present().all(|v| ty.accepts(v)))
        .unwrap_or(ColumnType::Text)
    }

    /// Parse a raw text field into a value of this type.
    pub fn parse(&self, raw: &str, column: &str, row: usize) -> Result<Value> {
        let trimmed = raw.trim();
        if is_missing_token(trimmed) {
            return Ok(Value::Missing);
        }
        let invalid = || CellCountError::InvalidValue {
            value: raw.to_string(),
            column: column.to_string(),
            row,
        };
        match self {
            ColumnType::Integer => trimmed.parse().map(Value::Integer).map_err(|_| invalid()),
            ColumnType::Real => trimmed.parse().map(Value::Real).map_err(|_| invalid()),
            ColumnType::Boolean => parse_bool(trimmed).map(Value::Boolean).ok_or_else(invalid),
            ColumnType::Timestamp => parse_timestamp(trimmed)
                .map(Value::Timestamp)
                .ok_or_else(invalid),
            ColumnType::Text => Ok(Value::Text(trimmed.to_string())),
        }
    }

    /// Check whether an already-typed value can be stored in a column of this type.
    pub fn admits(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Missing)
                | (ColumnType::Integer, Value::Integer(_))
                | (ColumnType::Real, Value::Real(_))
                | (ColumnType::Real, Value::Integer(_))
                | (ColumnType::Boolean, Value::Boolean(_))
                | (ColumnType::Timestamp, Value::Timestamp(_))
                | (ColumnType::Text, Value::Text(_))
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

/// Check whether a trimmed raw field denotes a missing value.
pub fn is_missing_token(raw: &str) -> bool {
    MISSING_TOKENS.contains(&raw)
}

fn parse_bool(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Parse the timestamp layouts accepted in input files.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
        return Some(ts);
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(ts);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
