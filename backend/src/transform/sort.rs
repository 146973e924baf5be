//! Stable multi-key sort.

use std::cmp::Ordering;

use crate::chart::SortSpec;
use crate::error::{TransformError, TransformResult};
use crate::models::{compare_values, value_of, Dataset, Row, TypeMap};

/// Sort `rows` by `sorts`, first key first. Rows equal on every key keep their input order.
pub fn apply_sort(mut rows: Dataset, types: &TypeMap, sorts: &[SortSpec]) -> TransformResult<Dataset> {
    if let Some(unknown) = sorts.iter().find(|sort| !types.contains_key(&sort.field)) {
        return Err(TransformError::UnknownField {
            stage: "sort",
            field: unknown.field.clone(),
        });
    }

    if !sorts.is_empty() {
        // `sort_by` is stable.
        rows.sort_by(|a, b| compare_rows(a, b, sorts));
    }
    Ok(rows)
}

fn compare_rows(a: &Row, b: &Row, sorts: &[SortSpec]) -> Ordering {
    sorts
        .iter()
        .map(|sort| {
            let ordering = compare_values(value_of(a, &sort.field), value_of(b, &sort.field));
            if sort.desc {
                ordering.reverse()
            } else {
                ordering
            }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}
