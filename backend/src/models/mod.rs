//! Domain models for the chart data pipeline.
//!
//! This module contains the core data structures every stage works on:
//!
//! - [`FieldValue`] - A typed, possibly-null cell value
//! - [`FieldType`] - The type of a field (Number, Datetime, String)
//! - [`Row`], [`Dataset`], [`TypeMap`] - Rows, ordered row sets and per-field types
//! - [`ChartData`] - The final `{data, types}` result
//!
//! Rows and type maps are [`IndexMap`]s so field order is deterministic across runs.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

// =============================================================================
// Field Type
// =============================================================================

/// Type of a field, fixed by its first non-null value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Number,
    Datetime,
    String,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Number => "Number",
            FieldType::Datetime => "Datetime",
            FieldType::String => "String",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Field Value
// =============================================================================

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Datetime(DateTime<Utc>),
    String(String),
    Null,
}

/// Shared null returned for fields absent from a row.
pub static NULL: FieldValue = FieldValue::Null;

impl FieldValue {
    /// Type of this value, `None` for null.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            FieldValue::Number(_) => Some(FieldType::Number),
            FieldValue::Datetime(_) => Some(FieldType::Datetime),
            FieldValue::String(_) => Some(FieldType::String),
            FieldValue::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Rank used to order values of different tags. Null is always last.
    fn rank(&self) -> u8 {
        match self {
            FieldValue::Number(_) => 0,
            FieldValue::Datetime(_) => 1,
            FieldValue::String(_) => 2,
            FieldValue::Null => 3,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Datetime(d) => f.write_str(&format_datetime(d)),
            FieldValue::String(s) => write!(f, "{:?}", s),
            FieldValue::Null => f.write_str("null"),
        }
    }
}

/// Largest integer an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Values serialize natively: numbers, RFC 3339 datetimes, strings, null.
///
/// Whole numbers serialize as integers so `7` does not come out as `7.0`.
impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER => {
                serializer.serialize_i64(*n as i64)
            }
            FieldValue::Number(n) => serializer.serialize_f64(*n),
            FieldValue::Datetime(d) => serializer.serialize_str(&format_datetime(d)),
            FieldValue::String(s) => serializer.serialize_str(s),
            FieldValue::Null => serializer.serialize_none(),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(d: DateTime<Utc>) -> Self {
        FieldValue::Datetime(d)
    }
}

/// Total order over field values.
///
/// Null sorts after any non-null value, datetimes compare by instant, numbers numerically
/// and strings by code point. Values of different types order by tag.
pub fn compare_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a, b) {
        (FieldValue::Number(x), FieldValue::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (FieldValue::Datetime(x), FieldValue::Datetime(y)) => x.cmp(y),
        (FieldValue::String(x), FieldValue::String(y)) => x.cmp(y),
        _ => a.rank().cmp(&b.rank()),
    }
}

// =============================================================================
// Rows and Datasets
// =============================================================================

/// A row: field name to value. A missing field reads as null.
pub type Row = IndexMap<String, FieldValue>;

/// An ordered sequence of rows.
pub type Dataset = Vec<Row>;

/// Field name to type, in first-seen order.
pub type TypeMap = IndexMap<String, FieldType>;

/// Read a field from a row, treating absence as null.
pub fn value_of<'a>(row: &'a Row, field: &str) -> &'a FieldValue {
    row.get(field).unwrap_or(&NULL)
}

/// Final pipeline output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChartData {
    /// Transformed rows.
    pub data: Dataset,
    /// Type of every field that may appear in `data`.
    pub types: TypeMap,
}

// =============================================================================
// Datetime helpers
// =============================================================================

/// Format an instant like `2024-03-01T00:00:00.000Z`.
pub fn format_datetime(d: &DateTime<Utc>) -> String {
    d.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The instant of a wall-clock time in the local timezone.
///
/// Ambiguous times resolve to the earlier instant; times skipped by a DST gap fall back to
/// reading the wall-clock time as UTC.
pub fn local_instant(naive: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Local midnight of a calendar date.
pub fn local_midnight(date: NaiveDate) -> DateTime<Utc> {
    local_instant(date.and_time(NaiveTime::MIN))
}
