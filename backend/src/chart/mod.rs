//! Chart specification wire types.
//!
//! A chart specification arrives already shape-validated; this module only gives it Rust types.
//! Keys the pipeline does not use (marks, axes, titles...) are ignored on deserialization.
//!
//! ```json
//! {
//!   "dataURL": "sales.csv",
//!   "joins": [{ "url": "regions.csv", "leftFields": ["region"] }],
//!   "filters": [{ "field": "year", "gte": { "number": 2020 } }],
//!   "aggregation": {
//!     "categories": [{ "field": "date", "bucket": "Month" }],
//!     "measures": [{ "field": "amount", "function": "Sum" }]
//!   },
//!   "sort": [{ "field": "MONTH(date)" }],
//!   "top": { "count": 12 }
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The data-related part of a chart specification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    /// Primary resource, absolute or relative to the document base URL.
    #[serde(rename = "dataURL")]
    pub data_url: String,

    /// Secondary resources merged into the primary one, in order.
    #[serde(default)]
    pub joins: Vec<JoinSpec>,

    /// Row predicates, all of which must hold.
    #[serde(default)]
    pub filters: Vec<FilterSpec>,

    #[serde(default)]
    pub aggregation: Option<AggregationSpec>,

    /// Sort keys, most significant first.
    #[serde(default, alias = "sorts")]
    pub sort: Vec<SortSpec>,

    #[serde(default)]
    pub top: Option<TopSpec>,

    /// Chart-level variables; options-level variables of the same name win.
    #[serde(default)]
    pub variables: IndexMap<String, ValueRef>,
}

impl ChartSpec {
    /// A spec that only loads `data_url`.
    pub fn new(data_url: impl Into<String>) -> Self {
        Self {
            data_url: data_url.into(),
            ..Self::default()
        }
    }

    /// Parse a chart specification from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// =============================================================================
// Joins
// =============================================================================

/// A left outer join against another resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSpec {
    pub url: String,
    pub left_fields: Vec<String>,
    /// Defaults to `left_fields`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_fields: Option<Vec<String>>,
}

impl JoinSpec {
    pub fn right_fields(&self) -> &[String] {
        self.right_fields.as_deref().unwrap_or(&self.left_fields)
    }
}

// =============================================================================
// Filters
// =============================================================================

/// Predicates on a single field. A null field value always passes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<ValueRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<ValueRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<ValueRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<ValueRef>,
    /// Keep rows equal to at least one of these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<ValueRef>>,
    /// Drop rows equal to any of these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<ValueRef>>,
}

impl FilterSpec {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }
}

// =============================================================================
// Aggregation
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationSpec {
    #[serde(default)]
    pub categories: Vec<CategorySpec>,
    #[serde(default)]
    pub measures: Vec<MeasureSpec>,
}

/// A grouping key, optionally bucketed when the field is a datetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySpec {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<Granularity>,
}

impl CategorySpec {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            bucket: None,
        }
    }

    pub fn bucketed(field: impl Into<String>, bucket: Granularity) -> Self {
        Self {
            field: field.into(),
            bucket: Some(bucket),
        }
    }
}

/// Datetime truncation granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    Year,
    Month,
    Day,
    Hour,
}

impl Granularity {
    /// Upper-case name used in output field names, e.g. `MONTH(date)`.
    pub fn label(&self) -> &'static str {
        match self {
            Granularity::Year => "YEAR",
            Granularity::Month => "MONTH",
            Granularity::Day => "DAY",
            Granularity::Hour => "HOUR",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureSpec {
    pub field: String,
    pub function: AggregateFunction,
}

impl MeasureSpec {
    pub fn new(field: impl Into<String>, function: AggregateFunction) -> Self {
        Self {
            field: field.into(),
            function,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Average,
    Count,
    Max,
    Min,
    Sum,
}

impl AggregateFunction {
    /// Upper-case name used in output field names, e.g. `SUM(amount)`.
    pub fn label(&self) -> &'static str {
        match self {
            AggregateFunction::Average => "AVERAGE",
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Sum => "SUM",
        }
    }

    /// Whether the function only applies to Number fields.
    pub fn requires_number(&self) -> bool {
        matches!(self, AggregateFunction::Average | AggregateFunction::Sum)
    }
}

// =============================================================================
// Sort / Top
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub desc: bool,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            desc: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            desc: true,
        }
    }
}

/// Keep the first `count` rows of every category bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopSpec {
    pub count: usize,
    #[serde(default)]
    pub category_fields: Vec<String>,
}

// =============================================================================
// Values
// =============================================================================

/// A field value as written in a chart specification.
///
/// Either a literal (`{"number": 1}`, `{"string": "x"}`, `{"datetime": "2024-01-01"}`, `null`)
/// or an indirection resolved at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueRef {
    /// `{"variable": "name"}`
    Variable { variable: String },
    /// `{"live": {"value": "Today", "index": -7}}`
    Live { live: LiveValue },
    Literal(Option<Literal>),
}

impl ValueRef {
    pub fn number(n: f64) -> Self {
        ValueRef::Literal(Some(Literal::Number(n)))
    }

    pub fn string(s: impl Into<String>) -> Self {
        ValueRef::Literal(Some(Literal::String(s.into())))
    }

    pub fn datetime(s: impl Into<String>) -> Self {
        ValueRef::Literal(Some(Literal::Datetime(s.into())))
    }

    pub fn null() -> Self {
        ValueRef::Literal(None)
    }

    pub fn variable(name: impl Into<String>) -> Self {
        ValueRef::Variable {
            variable: name.into(),
        }
    }

    pub fn live(value: LiveUnit, index: i32) -> Self {
        ValueRef::Live {
            live: LiveValue { value, index },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Literal {
    /// Date-only or full ISO-8601 text.
    Datetime(String),
    Number(f64),
    String(String),
}

/// A date relative to the current instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveValue {
    pub value: LiveUnit,
    #[serde(default)]
    pub index: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiveUnit {
    Today,
    Month,
    Year,
}
