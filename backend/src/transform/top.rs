//! Positional top-N per category bucket.
//!
//! This is truncation, not ranking: each bucket keeps its first `count` rows in input order.
//! Sort first for ranked results.

use crate::chart::TopSpec;
use crate::error::{TransformError, TransformResult};
use crate::models::{Dataset, Row, TypeMap};

use super::buckets::{row_key, OrderedBuckets};

/// Keep the first `top.count` rows of every bucket over `top.category_fields`.
///
/// Output lists buckets in first-seen order, each with its kept rows in input order.
pub fn apply_top(rows: Dataset, types: &TypeMap, top: &TopSpec) -> TransformResult<Dataset> {
    if let Some(unknown) = top.category_fields.iter().find(|field| !types.contains_key(*field)) {
        return Err(TransformError::UnknownField {
            stage: "top",
            field: unknown.clone(),
        });
    }

    let mut buckets: OrderedBuckets<Vec<Row>> = OrderedBuckets::new();
    for row in rows {
        let bucket = buckets.entry_or_insert_with(row_key(&row, &top.category_fields), Vec::new);
        if bucket.len() < top.count {
            bucket.push(row);
        }
    }

    Ok(buckets.into_values().flatten().collect())
}
