//! Grouped aggregation of rows into one row per category key.
//!
//! ```text
//! Input rows                  →  Aggregated output
//! ┌──────────────────┐          ┌──────────────────────┐
//! │ a: 1, b: 3       │          │ a: 1, SUM(b): 7      │
//! │ a: 1, b: 4       │    →     ├──────────────────────┤
//! │ a: 2, b: 5       │          │ a: 2, SUM(b): 5      │
//! └──────────────────┘          └──────────────────────┘
//! ```
//!
//! Groups are emitted in the order their key was first seen. Rows with a null category value
//! belong to no group and are dropped.

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveTime, Timelike, Utc};

use crate::api::logs::log_warning;
use crate::chart::{AggregateFunction, AggregationSpec, CategorySpec, Granularity, MeasureSpec};
use crate::error::{TransformError, TransformResult};
use crate::models::{compare_values, local_instant, value_of, Dataset, FieldType, FieldValue, Row, TypeMap};

use super::buckets::{BucketKey, KeyPart, OrderedBuckets};

/// Output field name of a category.
pub fn category_name(category: &CategorySpec) -> String {
    match category.bucket {
        Some(granularity) => format!("{}({})", granularity.label(), category.field),
        None => category.field.clone(),
    }
}

/// Output field name of a measure.
pub fn measure_name(measure: &MeasureSpec) -> String {
    format!("{}({})", measure.function.label(), measure.field)
}

/// Truncate `instant` to `granularity` in local time.
pub fn truncate_datetime(instant: DateTime<Utc>, granularity: Granularity) -> DateTime<Utc> {
    let local = instant.with_timezone(&Local).naive_local();
    let date = local.date();

    let truncated = match granularity {
        Granularity::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).map(|d| d.and_time(NaiveTime::MIN)),
        Granularity::Month => date.with_day(1).map(|d| d.and_time(NaiveTime::MIN)),
        Granularity::Day => Some(date.and_time(NaiveTime::MIN)),
        Granularity::Hour => NaiveTime::from_hms_opt(local.hour(), 0, 0).map(|t| date.and_time(t)),
    };

    truncated.map(local_instant).unwrap_or(instant)
}

/// Accumulator for one group: category values once, measure values as they arrive.
struct Group {
    categories: Vec<FieldValue>,
    measures: Vec<Vec<FieldValue>>,
}

/// Aggregate `rows` by the spec's categories, reducing each measure per group.
pub fn apply_aggregation(
    rows: Dataset,
    types: &TypeMap,
    spec: &AggregationSpec,
) -> TransformResult<(Dataset, TypeMap)> {
    let out_types = output_types(types, spec)?;
    let category_names: Vec<String> = spec.categories.iter().map(category_name).collect();
    let measure_names: Vec<String> = spec.measures.iter().map(measure_name).collect();

    let mut groups: OrderedBuckets<Group> = OrderedBuckets::new();
    let mut skipped = 0usize;
    'rows: for row in &rows {
        let mut values = Vec::with_capacity(spec.categories.len());
        for category in &spec.categories {
            let value = category_value(row, category);
            if value.is_null() {
                skipped += 1;
                continue 'rows;
            }
            values.push(value);
        }

        let key: BucketKey = values.iter().map(KeyPart::from).collect();
        let group = groups.entry_or_insert_with(key, || Group {
            categories: values,
            measures: vec![Vec::new(); spec.measures.len()],
        });
        for (measure, collected) in spec.measures.iter().zip(group.measures.iter_mut()) {
            let value = value_of(row, &measure.field);
            if !value.is_null() {
                collected.push(value.clone());
            }
        }
    }

    if skipped > 0 {
        log_warning(format!("aggregation: skipped {} row(s) with a null category", skipped));
    }

    let output = groups
        .into_values()
        .map(|group| {
            let mut out = Row::with_capacity(category_names.len() + measure_names.len());
            for (name, value) in category_names.iter().zip(group.categories) {
                out.insert(name.clone(), value);
            }
            for ((name, measure), values) in measure_names.iter().zip(&spec.measures).zip(group.measures) {
                out.insert(name.clone(), reduce(measure.function, values));
            }
            out
        })
        .collect();

    Ok((output, out_types))
}

fn category_value(row: &Row, category: &CategorySpec) -> FieldValue {
    match (value_of(row, &category.field), category.bucket) {
        (FieldValue::Datetime(d), Some(granularity)) => FieldValue::Datetime(truncate_datetime(*d, granularity)),
        (value, _) => value.clone(),
    }
}

fn reduce(function: AggregateFunction, values: Vec<FieldValue>) -> FieldValue {
    if values.is_empty() {
        return FieldValue::Null;
    }

    match function {
        AggregateFunction::Count => FieldValue::Number(values.len() as f64),
        AggregateFunction::Sum => FieldValue::Number(sum(&values)),
        AggregateFunction::Average => FieldValue::Number(sum(&values) / values.len() as f64),
        AggregateFunction::Max => values
            .into_iter()
            .reduce(|best, v| if compare_values(&v, &best).is_gt() { v } else { best })
            .unwrap_or(FieldValue::Null),
        AggregateFunction::Min => values
            .into_iter()
            .reduce(|best, v| if compare_values(&v, &best).is_lt() { v } else { best })
            .unwrap_or(FieldValue::Null),
    }
}

fn sum(values: &[FieldValue]) -> f64 {
    values.iter().filter_map(FieldValue::as_number).sum()
}

/// Validate the spec against `types` and build the output type map.
fn output_types(types: &TypeMap, spec: &AggregationSpec) -> TransformResult<TypeMap> {
    let field_type = |field: &String| {
        types.get(field).copied().ok_or_else(|| TransformError::UnknownField {
            stage: "aggregation",
            field: field.clone(),
        })
    };

    let mut out = TypeMap::new();

    for category in &spec.categories {
        let ty = field_type(&category.field)?;
        if let Some(granularity) = category.bucket {
            if ty != FieldType::Datetime {
                return Err(TransformError::AggregationFunction {
                    field: category.field.clone(),
                    message: format!("{} bucket requires a Datetime field, found {}", granularity.label(), ty),
                });
            }
        }
        out.insert(category_name(category), ty);
    }

    for measure in &spec.measures {
        let ty = field_type(&measure.field)?;
        if measure.function.requires_number() && ty != FieldType::Number {
            return Err(TransformError::AggregationFunction {
                field: measure.field.clone(),
                message: format!("{} requires a Number field, found {}", measure.function.label(), ty),
            });
        }
        let out_type = match measure.function {
            AggregateFunction::Count | AggregateFunction::Sum | AggregateFunction::Average => FieldType::Number,
            AggregateFunction::Max | AggregateFunction::Min => ty,
        };
        out.insert(measure_name(measure), out_type);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::local_midnight;
    use chrono::{NaiveDateTime, TimeZone};

    fn row(values: &[(&str, FieldValue)]) -> Row {
        values.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn n(v: f64) -> FieldValue {
        FieldValue::Number(v)
    }

    fn local(s: &str) -> DateTime<Utc> {
        let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap();
        Local.from_local_datetime(&naive).unwrap().with_timezone(&Utc)
    }

    fn spec(categories: Vec<CategorySpec>, measures: Vec<MeasureSpec>) -> AggregationSpec {
        AggregationSpec { categories, measures }
    }

    fn sample() -> (Dataset, TypeMap) {
        let rows = vec![
            row(&[("a", n(1.0)), ("b", n(3.0))]),
            row(&[("a", n(1.0)), ("b", n(4.0))]),
            row(&[("a", n(2.0)), ("b", n(5.0))]),
        ];
        let types = TypeMap::from([("a".to_string(), FieldType::Number), ("b".to_string(), FieldType::Number)]);
        (rows, types)
    }

    #[test]
    fn test_sum_by_category() {
        let (rows, types) = sample();
        let spec = spec(
            vec![CategorySpec::new("a")],
            vec![MeasureSpec::new("b", AggregateFunction::Sum)],
        );

        let (data, out_types) = apply_aggregation(rows, &types, &spec).unwrap();

        assert_eq!(
            data,
            vec![
                row(&[("a", n(1.0)), ("SUM(b)", n(7.0))]),
                row(&[("a", n(2.0)), ("SUM(b)", n(5.0))]),
            ]
        );
        let fields: Vec<&String> = out_types.keys().collect();
        assert_eq!(fields, ["a", "SUM(b)"]);
    }

    #[test]
    fn test_every_function() {
        let (rows, types) = sample();
        let measures = [
            AggregateFunction::Average,
            AggregateFunction::Count,
            AggregateFunction::Max,
            AggregateFunction::Min,
            AggregateFunction::Sum,
        ]
        .into_iter()
        .map(|f| MeasureSpec::new("b", f))
        .collect();

        let (data, _) = apply_aggregation(rows, &types, &spec(vec![], measures)).unwrap();

        assert_eq!(data.len(), 1);
        let out = &data[0];
        assert_eq!(out["AVERAGE(b)"], n(4.0));
        assert_eq!(out["COUNT(b)"], n(3.0));
        assert_eq!(out["MAX(b)"], n(5.0));
        assert_eq!(out["MIN(b)"], n(3.0));
        assert_eq!(out["SUM(b)"], n(12.0));
    }

    #[test]
    fn test_groups_keep_first_seen_order() {
        let types = TypeMap::from([("k".to_string(), FieldType::String)]);
        let rows: Dataset = ["z", "a", "z", "m", "a"]
            .iter()
            .map(|k| row(&[("k", FieldValue::from(*k))]))
            .collect();

        let (data, _) = apply_aggregation(
            rows,
            &types,
            &spec(vec![CategorySpec::new("k")], vec![MeasureSpec::new("k", AggregateFunction::Count)]),
        )
        .unwrap();

        let keys: Vec<&FieldValue> = data.iter().map(|r| &r["k"]).collect();
        assert_eq!(keys, [&FieldValue::from("z"), &FieldValue::from("a"), &FieldValue::from("m")]);
        assert_eq!(data[0]["COUNT(k)"], n(2.0));
    }

    #[test]
    fn test_null_measures_ignored_and_empty_is_null() {
        let types = TypeMap::from([("a".to_string(), FieldType::Number), ("b".to_string(), FieldType::Number)]);
        let rows = vec![
            row(&[("a", n(1.0)), ("b", FieldValue::Null)]),
            row(&[("a", n(1.0))]),
            row(&[("a", n(2.0)), ("b", n(6.0))]),
            row(&[("a", n(2.0)), ("b", FieldValue::Null)]),
        ];
        let measures = vec![
            MeasureSpec::new("b", AggregateFunction::Average),
            MeasureSpec::new("b", AggregateFunction::Max),
        ];

        let (data, _) = apply_aggregation(rows, &types, &spec(vec![CategorySpec::new("a")], measures)).unwrap();

        assert_eq!(data[0]["AVERAGE(b)"], FieldValue::Null);
        assert_eq!(data[0]["MAX(b)"], FieldValue::Null);
        assert_eq!(data[1]["AVERAGE(b)"], n(6.0));
    }

    #[test]
    fn test_count_total_matches_non_null_categories() {
        let types = TypeMap::from([("c".to_string(), FieldType::String), ("v".to_string(), FieldType::Number)]);
        let rows = vec![
            row(&[("c", "x".into()), ("v", n(1.0))]),
            row(&[("c", FieldValue::Null), ("v", n(1.0))]),
            row(&[("c", "y".into()), ("v", n(1.0))]),
            row(&[("v", n(1.0))]),
            row(&[("c", "x".into()), ("v", n(1.0))]),
        ];

        let (data, _) = apply_aggregation(
            rows,
            &types,
            &spec(vec![CategorySpec::new("c")], vec![MeasureSpec::new("v", AggregateFunction::Count)]),
        )
        .unwrap();

        let total: f64 = data.iter().filter_map(|r| r["COUNT(v)"].as_number()).sum();
        assert_eq!(total, 3.0);
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_skipped_rows_are_reported() {
        use crate::api::logs::{LogLevel, LOG_BROADCASTER};
        use tokio::sync::broadcast::error::TryRecvError;

        let mut rx = LOG_BROADCASTER.subscribe();
        let types = TypeMap::from([("c".to_string(), FieldType::String)]);
        let rows = (0..7).map(|_| row(&[("c", FieldValue::Null)])).collect();

        let (data, _) = apply_aggregation(rows, &types, &spec(vec![CategorySpec::new("c")], vec![])).unwrap();
        assert!(data.is_empty());

        let mut warned = false;
        loop {
            match rx.try_recv() {
                Ok(entry) => {
                    warned |= entry.level == LogLevel::Warning && entry.message.contains("skipped 7 row(s)");
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        assert!(warned);
    }

    #[test]
    fn test_datetime_bucketing() {
        let types = TypeMap::from([("d".to_string(), FieldType::Datetime), ("v".to_string(), FieldType::Number)]);
        let rows = vec![
            row(&[("d", local("2024-03-05 10:30:00").into()), ("v", n(1.0))]),
            row(&[("d", local("2024-03-20 08:00:00").into()), ("v", n(2.0))]),
            row(&[("d", local("2024-04-01 00:00:00").into()), ("v", n(4.0))]),
        ];
        let spec = spec(
            vec![CategorySpec::bucketed("d", Granularity::Month)],
            vec![MeasureSpec::new("v", AggregateFunction::Sum)],
        );

        let (data, out_types) = apply_aggregation(rows, &types, &spec).unwrap();

        let march = local_midnight(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["MONTH(d)"], FieldValue::Datetime(march));
        assert_eq!(data[0]["SUM(v)"], n(3.0));
        assert_eq!(out_types["MONTH(d)"], FieldType::Datetime);
    }

    #[test]
    fn test_truncate_granularities() {
        let instant = local("2023-07-14 16:42:09");
        assert_eq!(truncate_datetime(instant, Granularity::Year), local("2023-01-01 00:00:00"));
        assert_eq!(truncate_datetime(instant, Granularity::Month), local("2023-07-01 00:00:00"));
        assert_eq!(truncate_datetime(instant, Granularity::Day), local("2023-07-14 00:00:00"));
        assert_eq!(truncate_datetime(instant, Granularity::Hour), local("2023-07-14 16:00:00"));
    }

    #[test]
    fn test_max_min_keep_source_type() {
        let types = TypeMap::from([("s".to_string(), FieldType::String)]);
        let rows: Dataset = ["pear", "apple", "quince"].iter().map(|s| row(&[("s", (*s).into())])).collect();
        let measures = vec![
            MeasureSpec::new("s", AggregateFunction::Max),
            MeasureSpec::new("s", AggregateFunction::Min),
        ];

        let (data, out_types) = apply_aggregation(rows, &types, &spec(vec![], measures)).unwrap();

        assert_eq!(data[0]["MAX(s)"], FieldValue::from("quince"));
        assert_eq!(data[0]["MIN(s)"], FieldValue::from("apple"));
        assert_eq!(out_types["MAX(s)"], FieldType::String);
    }

    #[test]
    fn test_empty_input_yields_no_groups() {
        let (_, types) = sample();
        let (data, out_types) = apply_aggregation(
            Vec::new(),
            &types,
            &spec(vec![], vec![MeasureSpec::new("b", AggregateFunction::Count)]),
        )
        .unwrap();
        assert!(data.is_empty());
        assert_eq!(out_types["COUNT(b)"], FieldType::Number);
    }

    #[test]
    fn test_sum_requires_number() {
        let types = TypeMap::from([("s".to_string(), FieldType::String)]);
        let err = apply_aggregation(
            Vec::new(),
            &types,
            &spec(vec![], vec![MeasureSpec::new("s", AggregateFunction::Sum)]),
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::AggregationFunction { .. }));
    }

    #[test]
    fn test_bucket_requires_datetime() {
        let (_, types) = sample();
        let err = apply_aggregation(
            Vec::new(),
            &types,
            &spec(vec![CategorySpec::bucketed("a", Granularity::Year)], vec![]),
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::AggregationFunction { ref field, .. } if field == "a"));
    }

    #[test]
    fn test_unknown_measure_field() {
        let (_, types) = sample();
        let err = apply_aggregation(
            Vec::new(),
            &types,
            &spec(vec![], vec![MeasureSpec::new("nope", AggregateFunction::Count)]),
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::UnknownField { stage: "aggregation", .. }));
    }
}
