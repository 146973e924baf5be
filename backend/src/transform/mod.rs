//! Transformation stages.
//!
//! This module turns loaded datasets into chart rows:
//! - Join: left outer joins with column renaming
//! - Filter: per-field predicates over resolved values
//! - Aggregate: grouping with datetime bucketing
//! - Sort / Top: stable ordering and per-bucket truncation
//! - Pipeline: the orchestrator running every stage in order

pub mod aggregate;
pub mod buckets;
pub mod filter;
pub mod join;
pub mod pipeline;
pub mod resolve;
pub mod sort;
pub mod top;

pub use aggregate::{apply_aggregation, category_name, measure_name, truncate_datetime};
pub use buckets::{row_key, BucketKey, KeyPart, OrderedBuckets};
pub use filter::apply_filters;
pub use join::apply_join;
pub use pipeline::{apply_stages, load_chart_data, LoadOptions};
pub use resolve::{merge_variables, resolve_live, resolve_value, Clock, FixedClock, SystemClock, Variables};
pub use sort::apply_sort;
pub use top::apply_top;
