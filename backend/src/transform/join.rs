//! Left outer join of a secondary dataset into the running one.
//!
//! ```text
//! left                 right            output
//! ┌──────┬──────┐     ┌──────┬──────┐   ┌──────┬──────┬──────┬──────┐
//! │ a: 1 │ b: 5 │  ⋈  │ a: 1 │ c:10 │ → │ a: 1 │ b: 5 │ a2: 1│ c:10 │
//! │ a: 3 │ b: 8 │     └──────┴──────┘   │ a: 3 │ b: 8 │      │      │
//! └──────┴──────┘                       └──────┴──────┴──────┴──────┘
//! ```
//!
//! Right fields whose names are taken get the lowest free numeric suffix starting at 2.
//! Unmatched left rows pass through unchanged: right fields are absent, not null.

use crate::chart::JoinSpec;
use crate::error::{TransformError, TransformResult};
use crate::models::{Dataset, Row, TypeMap};

use super::buckets::{row_key, OrderedBuckets};

/// Join `right` into `left` according to `join`.
pub fn apply_join(
    left: Dataset,
    left_types: TypeMap,
    right: &[Row],
    right_types: &TypeMap,
    join: &JoinSpec,
) -> TransformResult<(Dataset, TypeMap)> {
    let left_fields = &join.left_fields;
    let right_fields = join.right_fields();
    validate_join_fields(&left_types, right_types, join)?;

    // Right rows by key, duplicates kept in input order.
    let mut lookup: OrderedBuckets<Vec<&Row>> = OrderedBuckets::new();
    for row in right {
        lookup.push(row_key(row, right_fields), row);
    }

    // Output names for every right field, merged into the running type map.
    let mut types = left_types;
    let mut renames: Vec<(&str, String)> = Vec::with_capacity(right_types.len());
    for (name, ty) in right_types {
        let output = if types.contains_key(name) {
            unused_name(&types, name)
        } else {
            name.clone()
        };
        types.insert(output.clone(), *ty);
        renames.push((name.as_str(), output));
    }

    let mut output = Vec::with_capacity(left.len());
    for row in left {
        let Some(matches) = lookup.get(&row_key(&row, left_fields)) else {
            output.push(row);
            continue;
        };
        for matched in matches {
            let mut joined = row.clone();
            for (name, renamed) in &renames {
                if let Some(value) = matched.get(*name) {
                    joined.insert(renamed.clone(), value.clone());
                }
            }
            output.push(joined);
        }
    }

    Ok((output, types))
}

fn validate_join_fields(left_types: &TypeMap, right_types: &TypeMap, join: &JoinSpec) -> TransformResult<()> {
    let left_fields = &join.left_fields;
    let right_fields = join.right_fields();

    if left_fields.len() != right_fields.len() {
        return Err(TransformError::JoinShape {
            url: join.url.clone(),
            message: format!(
                "{} left fields but {} right fields",
                left_fields.len(),
                right_fields.len()
            ),
        });
    }

    for (left_field, right_field) in left_fields.iter().zip(right_fields) {
        let left_type = left_types.get(left_field).ok_or_else(|| TransformError::UnknownJoinField {
            url: join.url.clone(),
            side: "left",
            field: left_field.clone(),
        })?;
        let right_type = right_types.get(right_field).ok_or_else(|| TransformError::UnknownJoinField {
            url: join.url.clone(),
            side: "right",
            field: right_field.clone(),
        })?;
        if left_type != right_type {
            return Err(TransformError::JoinShape {
                url: join.url.clone(),
                message: format!(
                    "field '{}' is {} but '{}' is {}",
                    left_field, left_type, right_field, right_type
                ),
            });
        }
    }

    Ok(())
}

/// `name` with the lowest numeric suffix (from 2) not already in `types`.
fn unused_name(types: &TypeMap, name: &str) -> String {
    (2..)
        .map(|n| format!("{}{}", name, n))
        .find(|candidate| !types.contains_key(candidate))
        .unwrap_or_else(|| name.to_string())
}
