//! Resolution of chart-spec values to literal [`FieldValue`]s.
//!
//! Variable references are looked up (recursively) in the variables mapping; live values are
//! computed from an injected [`Clock`] so runs are reproducible in tests.

use chrono::{DateTime, Datelike, Days, Local, Months, NaiveDate, Utc};
use indexmap::IndexMap;

use crate::chart::{Literal, LiveUnit, LiveValue, ValueRef};
use crate::error::{TransformError, TransformResult};
use crate::models::{local_midnight, FieldValue};
use crate::validation::parse_datetime_string;

/// Variable name to value, as found in chart specs and load options.
pub type Variables = IndexMap<String, ValueRef>;

/// Source of "now" for live values.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Chart-level variables overridden by options-level ones of the same name.
pub fn merge_variables(chart: &Variables, options: &Variables) -> Variables {
    let mut merged = chart.clone();
    for (name, value) in options {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

/// Resolve `value` down to a literal.
pub fn resolve_value(value: &ValueRef, variables: &Variables, clock: &dyn Clock) -> TransformResult<FieldValue> {
    let mut visiting = Vec::new();
    resolve_inner(value, variables, clock, &mut visiting)
}

fn resolve_inner<'a>(
    value: &'a ValueRef,
    variables: &'a Variables,
    clock: &dyn Clock,
    visiting: &mut Vec<&'a str>,
) -> TransformResult<FieldValue> {
    match value {
        ValueRef::Variable { variable } => {
            if visiting.contains(&variable.as_str()) {
                return Err(TransformError::VariableCycle(variable.clone()));
            }
            let target = variables
                .get(variable)
                .ok_or_else(|| TransformError::UnknownVariable(variable.clone()))?;
            visiting.push(variable.as_str());
            resolve_inner(target, variables, clock, visiting)
        }
        ValueRef::Live { live } => resolve_live(live, clock.now()).map(FieldValue::Datetime),
        ValueRef::Literal(None) => Ok(FieldValue::Null),
        ValueRef::Literal(Some(literal)) => resolve_literal(literal),
    }
}

fn resolve_literal(literal: &Literal) -> TransformResult<FieldValue> {
    match literal {
        Literal::Number(n) => Ok(FieldValue::Number(*n)),
        Literal::String(s) => Ok(FieldValue::String(s.clone())),
        Literal::Datetime(s) => parse_datetime_string(s)
            .map(FieldValue::Datetime)
            .ok_or_else(|| TransformError::InvalidLiteral {
                kind: "datetime",
                value: s.clone(),
            }),
    }
}

/// Local midnight of today, the first of this month or January 1st of this year, shifted by
/// `live.index` days, months or years.
pub fn resolve_live(live: &LiveValue, now: DateTime<Utc>) -> TransformResult<DateTime<Utc>> {
    let today = now.with_timezone(&Local).date_naive();

    let date = match live.value {
        LiveUnit::Today => shift_days(today, live.index),
        LiveUnit::Month => today.with_day0(0).and_then(|first| shift_months(first, live.index)),
        LiveUnit::Year => NaiveDate::from_ymd_opt(today.year(), 1, 1)
            .and_then(|first| shift_months(first, live.index.checked_mul(12)?)),
    };

    date.map(local_midnight).ok_or_else(|| TransformError::InvalidLiteral {
        kind: "live",
        value: format!("{:?}{:+}", live.value, live.index),
    })
}

fn shift_days(date: NaiveDate, days: i32) -> Option<NaiveDate> {
    let delta = Days::new(u64::from(days.unsigned_abs()));
    if days >= 0 {
        date.checked_add_days(delta)
    } else {
        date.checked_sub_days(delta)
    }
}

fn shift_months(date: NaiveDate, months: i32) -> Option<NaiveDate> {
    let delta = Months::new(months.unsigned_abs());
    if months >= 0 {
        date.checked_add_months(delta)
    } else {
        date.checked_sub_months(delta)
    }
}
