//! Type inference and validation of raw rows.
//!
//! Two passes over a single dataset:
//!
//! 1. **Inference** - the first decisive value of each field fixes its [`FieldType`].
//! 2. **Conversion** - every value is converted to its field's type, or the whole dataset
//!    is rejected with [`ValidationError::InvalidFieldValue`].
//!
//! # Source Modes
//!
//! ## CSV
//! Every raw value is a string. Only the `"null"` sentinel is a null; an empty cell is an
//! empty string. Strings that parse as finite numbers are numbers.
//!
//! ## JSON
//! Values keep their native JSON type. Strings are never read as numbers.
//!
//! In both modes a string matching `YYYY-MM-DD` or a full ISO-8601 timestamp is a datetime.
//! Date-only strings become local midnight of that calendar day.

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{ValidationError, ValidationResult};
use crate::models::{local_midnight, Dataset, FieldType, FieldValue, Row, TypeMap};
use crate::parser::{RawRow, NULL_SENTINEL};

static DATE_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("valid date pattern"));

static DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}(\.[0-9]{3})?(Z|[+-][0-9]{2}:[0-9]{2})$")
        .expect("valid datetime pattern")
});

/// Where raw rows came from; decides how strings are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Csv,
    Json,
}

/// Whether a string matches one of the two strict date patterns.
pub fn is_date_string(s: &str) -> bool {
    DATE_ONLY.is_match(s) || DATE_TIME.is_match(s)
}

/// Parse a strict date-only or ISO-8601 string into an instant.
///
/// Date-only strings map to local midnight. Returns `None` for anything else, including
/// pattern-shaped strings that are not real dates (`2024-02-30`).
pub fn parse_datetime_string(s: &str) -> Option<DateTime<Utc>> {
    if DATE_ONLY.is_match(s) {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(local_midnight);
    }
    if DATE_TIME.is_match(s) {
        return DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc));
    }
    None
}

/// Parse a string as a finite number.
pub fn parse_finite_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Whether a raw value counts as absent.
fn is_absent(value: &Value, mode: SourceMode) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) if mode == SourceMode::Csv => s == NULL_SENTINEL,
        _ => false,
    }
}

/// Type a single raw value would give its field, `None` if it is not decisive.
fn infer_value_type(value: &Value, mode: SourceMode) -> Option<FieldType> {
    if is_absent(value, mode) {
        return None;
    }
    match value {
        Value::Number(_) => Some(FieldType::Number),
        Value::String(s) if is_date_string(s) => Some(FieldType::Datetime),
        Value::String(s) if mode == SourceMode::Csv && parse_finite_number(s).is_some() => {
            Some(FieldType::Number)
        }
        _ => Some(FieldType::String),
    }
}

/// Infer the type of every field, in first-seen field order.
///
/// Fields that never hold a non-null value are typed String.
pub fn infer_types(rows: &[RawRow], mode: SourceMode) -> TypeMap {
    let mut inferred: IndexMap<String, Option<FieldType>> = IndexMap::new();

    for row in rows {
        for (field, value) in row {
            let slot = inferred.entry(field.clone()).or_insert(None);
            if slot.is_none() {
                *slot = infer_value_type(value, mode);
            }
        }
    }

    inferred
        .into_iter()
        .map(|(field, ty)| (field, ty.unwrap_or(FieldType::String)))
        .collect()
}

/// Convert one raw value to `ty`.
fn convert_value(field: &str, value: &Value, ty: FieldType, mode: SourceMode) -> ValidationResult<FieldValue> {
    if is_absent(value, mode) {
        return Ok(FieldValue::Null);
    }

    let converted = match (ty, value) {
        (FieldType::Number, Value::Number(n)) => n.as_f64().map(FieldValue::Number),
        (FieldType::Number, Value::String(s)) if mode == SourceMode::Csv => {
            parse_finite_number(s).map(FieldValue::Number)
        }
        (FieldType::Datetime, Value::String(s)) => parse_datetime_string(s).map(FieldValue::Datetime),
        (FieldType::String, Value::String(s)) => Some(FieldValue::String(s.clone())),
        _ => None,
    };

    converted.ok_or_else(|| ValidationError::InvalidFieldValue {
        field: field.to_string(),
        value: value.to_string(),
        expected: ty,
    })
}

/// Infer types and convert every row.
///
/// # Example
/// ```
/// use chartdata::{parse_csv, validate_rows, FieldType, FieldValue, SourceMode};
///
/// let rows = parse_csv("a,b\n1,3\n2,4\n");
/// let (data, types) = validate_rows(&rows, SourceMode::Csv).unwrap();
///
/// assert_eq!(types["a"], FieldType::Number);
/// assert_eq!(data[1]["b"], FieldValue::Number(4.0));
/// ```
pub fn validate_rows(rows: &[RawRow], mode: SourceMode) -> ValidationResult<(Dataset, TypeMap)> {
    let types = infer_types(rows, mode);

    let data = rows
        .iter()
        .map(|raw| {
            raw.iter()
                .map(|(field, value)| {
                    let ty = types.get(field).copied().unwrap_or(FieldType::String);
                    Ok((field.clone(), convert_value(field, value, ty, mode)?))
                })
                .collect::<ValidationResult<Row>>()
        })
        .collect::<ValidationResult<Dataset>>()?;

    Ok((data, types))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_csv;
    use chrono::{Local, TimeZone};
    use serde_json::json;

    fn json_rows(value: Value) -> Vec<RawRow> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn test_csv_numbers() {
        let rows = parse_csv("a,b\n1,3\n2,4\n");
        let (data, types) = validate_rows(&rows, SourceMode::Csv).unwrap();

        assert_eq!(types["a"], FieldType::Number);
        assert_eq!(types["b"], FieldType::Number);
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["a"], FieldValue::Number(1.0));
        assert_eq!(data[0]["b"], FieldValue::Number(3.0));
        assert_eq!(data[1]["a"], FieldValue::Number(2.0));
        assert_eq!(data[1]["b"], FieldValue::Number(4.0));
    }

    #[test]
    fn test_sentinel_cells_are_null() {
        let rows = parse_csv("a,b,c\nnull,null,x\n5");
        let (data, types) = validate_rows(&rows, SourceMode::Csv).unwrap();

        assert_eq!(types["a"], FieldType::Number);
        assert_eq!(types["b"], FieldType::String);
        assert_eq!(types["c"], FieldType::String);
        assert!(data[0]["a"].is_null());
        assert!(data[0]["b"].is_null());
        assert_eq!(data[1]["a"], FieldValue::Number(5.0));
        assert!(data[1]["c"].is_null());
    }

    #[test]
    fn test_empty_cell_in_number_field_rejected() {
        let rows = parse_csv("a,b\n1,2\n3,\n");
        let err = validate_rows(&rows, SourceMode::Csv).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Invalid field value"));
        assert!(msg.contains("'b'"));
    }

    #[test]
    fn test_leading_empty_cell_makes_field_string() {
        let rows = parse_csv("b\n\n5\n");
        let (data, types) = validate_rows(&rows, SourceMode::Csv).unwrap();

        assert_eq!(types["b"], FieldType::String);
        assert_eq!(data[0]["b"], FieldValue::String(String::new()));
        assert_eq!(data[1]["b"], FieldValue::String("5".into()));
    }

    #[test]
    fn test_first_value_fixes_type() {
        let rows = parse_csv("a\n1\nabc");
        let err = validate_rows(&rows, SourceMode::Csv).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Invalid field value"));
        assert!(msg.contains("'a'"));
    }

    #[test]
    fn test_string_first_accepts_numbers_as_text() {
        let rows = parse_csv("a\nabc\n12");
        let (data, types) = validate_rows(&rows, SourceMode::Csv).unwrap();
        assert_eq!(types["a"], FieldType::String);
        assert_eq!(data[1]["a"], FieldValue::String("12".into()));
    }

    #[test]
    fn test_non_finite_numbers_are_strings() {
        let rows = parse_csv("a,b\nNaN,inf");
        let (_, types) = validate_rows(&rows, SourceMode::Csv).unwrap();
        assert_eq!(types["a"], FieldType::String);
        assert_eq!(types["b"], FieldType::String);
    }

    #[test]
    fn test_date_only_is_local_midnight() {
        let rows = parse_csv("d\n2024-03-15");
        let (data, types) = validate_rows(&rows, SourceMode::Csv).unwrap();

        assert_eq!(types["d"], FieldType::Datetime);
        let expected = Local.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap().with_timezone(&Utc);
        assert_eq!(data[0]["d"], FieldValue::Datetime(expected));
    }

    #[test]
    fn test_full_datetime_keeps_instant() {
        let rows = json_rows(json!([{ "t": "2024-03-15T10:30:00.000+02:00" }, { "t": "2024-03-15T08:00:00Z" }]));
        let (data, types) = validate_rows(&rows, SourceMode::Json).unwrap();

        assert_eq!(types["t"], FieldType::Datetime);
        assert_eq!(
            data[0]["t"],
            FieldValue::Datetime(Utc.with_ymd_and_hms(2024, 3, 15, 8, 30, 0).unwrap())
        );
        assert_eq!(
            data[1]["t"],
            FieldValue::Datetime(Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_loose_dates_are_not_datetimes() {
        assert!(!is_date_string("2024-3-15"));
        assert!(!is_date_string("2024-03-15 10:00:00"));
        assert!(!is_date_string("2024-03-15T10:00:00"));
        assert!(!is_date_string("2024-03-15T10:00:00.1Z"));
        assert!(is_date_string("2024-03-15T10:00:00.123-05:00"));
    }

    #[test]
    fn test_impossible_date_rejected() {
        let rows = parse_csv("d\n2024-02-30");
        assert!(validate_rows(&rows, SourceMode::Csv).is_err());
    }

    #[test]
    fn test_json_strings_stay_strings() {
        let rows = json_rows(json!([{ "a": "1", "b": 2, "c": null }, { "a": "x", "b": 3.5, "c": "null" }]));
        let (data, types) = validate_rows(&rows, SourceMode::Json).unwrap();

        assert_eq!(types["a"], FieldType::String);
        assert_eq!(types["b"], FieldType::Number);
        assert_eq!(types["c"], FieldType::String);
        assert!(data[0]["c"].is_null());
        assert_eq!(data[1]["c"], FieldValue::String("null".into()));
        assert_eq!(data[1]["b"], FieldValue::Number(3.5));
    }

    #[test]
    fn test_json_number_field_rejects_numeric_string() {
        let rows = json_rows(json!([{ "a": 1 }, { "a": "2" }]));
        assert!(validate_rows(&rows, SourceMode::Json).is_err());
    }

    #[test]
    fn test_json_boolean_rejected() {
        let rows = json_rows(json!([{ "flag": true }]));
        let err = validate_rows(&rows, SourceMode::Json).unwrap_err();
        assert!(err.to_string().contains("flag"));
    }

    #[test]
    fn test_all_null_field_is_string() {
        let rows = parse_csv("a,b\n1,null\n2,null");
        let (_, types) = validate_rows(&rows, SourceMode::Csv).unwrap();
        assert_eq!(types["b"], FieldType::String);
    }

    #[test]
    fn test_fields_only_in_later_rows() {
        let rows = json_rows(json!([{ "a": 1 }, { "a": 2, "extra": "x" }]));
        let (data, types) = validate_rows(&rows, SourceMode::Json).unwrap();

        let fields: Vec<&String> = types.keys().collect();
        assert_eq!(fields, ["a", "extra"]);
        assert!(!data[0].contains_key("extra"));
    }

    #[test]
    fn test_inference_is_deterministic() {
        let rows = parse_csv("n,s,d\nnull,x,2020-01-01\n3,4,null\n");
        let first = infer_types(&rows, SourceMode::Csv);
        let second = infer_types(&rows, SourceMode::Csv);
        assert_eq!(first, second);
        assert_eq!(first["n"], FieldType::Number);
        assert_eq!(first["s"], FieldType::String);
        assert_eq!(first["d"], FieldType::Datetime);
    }
}
