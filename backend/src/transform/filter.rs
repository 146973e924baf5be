//! Row filtering by per-field predicates.
//!
//! Every filter must hold for a row to be kept. A null (or absent) field value passes its
//! filter unconditionally. Operands are resolved once, before any row is visited, and must
//! have the type of the field they are compared with.

use std::cmp::Ordering;

use crate::chart::{FilterSpec, ValueRef};
use crate::error::{TransformError, TransformResult};
use crate::models::{compare_values, value_of, Dataset, FieldType, FieldValue, Row, TypeMap};

use super::resolve::{resolve_value, Clock, Variables};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparison {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Lte => ordering != Ordering::Greater,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Gte => ordering != Ordering::Less,
        }
    }
}

/// A filter with all operands resolved to literals.
#[derive(Debug, Clone)]
struct CompiledFilter {
    field: String,
    comparisons: Vec<(Comparison, FieldValue)>,
    include: Option<Vec<FieldValue>>,
    exclude: Option<Vec<FieldValue>>,
}

impl CompiledFilter {
    fn compile(
        filter: &FilterSpec,
        types: &TypeMap,
        variables: &Variables,
        clock: &dyn Clock,
    ) -> TransformResult<Self> {
        let ty = *types.get(&filter.field).ok_or_else(|| TransformError::UnknownField {
            stage: "filter",
            field: filter.field.clone(),
        })?;
        let resolve = |value: &ValueRef| resolve_operand(&filter.field, ty, value, variables, clock);

        let mut comparisons = Vec::new();
        for (comparison, operand) in [
            (Comparison::Lt, &filter.lt),
            (Comparison::Lte, &filter.lte),
            (Comparison::Gt, &filter.gt),
            (Comparison::Gte, &filter.gte),
        ] {
            if let Some(operand) = operand {
                comparisons.push((comparison, resolve(operand)?));
            }
        }

        let resolve_all = |values: &Option<Vec<ValueRef>>| -> TransformResult<Option<Vec<FieldValue>>> {
            values
                .as_ref()
                .map(|values| values.iter().map(resolve).collect())
                .transpose()
        };

        Ok(Self {
            field: filter.field.clone(),
            comparisons,
            include: resolve_all(&filter.include)?,
            exclude: resolve_all(&filter.exclude)?,
        })
    }

    fn matches(&self, row: &Row) -> bool {
        let value = value_of(row, &self.field);
        if value.is_null() {
            return true;
        }

        let equals = |operand: &FieldValue| compare_values(value, operand) == Ordering::Equal;

        self.comparisons
            .iter()
            .all(|(comparison, operand)| comparison.holds(compare_values(value, operand)))
            && self.include.as_ref().map_or(true, |values| values.iter().any(equals))
            && self.exclude.as_ref().map_or(true, |values| !values.iter().any(equals))
    }
}

fn resolve_operand(
    field: &str,
    ty: FieldType,
    value: &ValueRef,
    variables: &Variables,
    clock: &dyn Clock,
) -> TransformResult<FieldValue> {
    let resolved = resolve_value(value, variables, clock)?;
    match resolved.field_type() {
        Some(actual) if actual != ty => Err(TransformError::FilterValueType {
            field: field.to_string(),
            expected: ty,
            actual,
        }),
        _ => Ok(resolved),
    }
}

/// Keep the rows passing every filter, in their original order.
pub fn apply_filters(
    rows: Dataset,
    types: &TypeMap,
    filters: &[FilterSpec],
    variables: &Variables,
    clock: &dyn Clock,
) -> TransformResult<Dataset> {
    let compiled = filters
        .iter()
        .map(|filter| CompiledFilter::compile(filter, types, variables, clock))
        .collect::<TransformResult<Vec<_>>>()?;

    Ok(rows
        .into_iter()
        .filter(|row| compiled.iter().all(|filter| filter.matches(row)))
        .collect())
}
