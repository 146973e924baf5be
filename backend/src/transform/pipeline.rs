//! High-level pipeline API: chart specification in, typed rows out.
//!
//! Stages run in a fixed order:
//!
//! ```text
//! load ──▶ joins ──▶ filters ──▶ aggregation ──▶ sort ──▶ top
//! ```
//!
//! Only loading is asynchronous; every later stage is a pure transformation of the rows the
//! previous one produced.
//!
//! # Example
//!
//! ```rust,ignore
//! use chartdata::{load_chart_data, ChartSpec, LoadOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let spec = ChartSpec::from_json(r#"{"dataURL": "https://example.com/sales.csv"}"#)?;
//!     let chart = load_chart_data(&spec, LoadOptions::default()).await?;
//!     println!("{} rows", chart.data.len());
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use reqwest::Url;
use tokio_util::sync::CancellationToken;

use crate::api::logs::{log_info, log_info_indent, log_success};
use crate::chart::ChartSpec;
use crate::error::{PipelineResult, TransformResult};
use crate::loader::{load_resources, DefaultFetcher, LoadedResource, LoadedResources, ResourceFetcher};
use crate::models::{ChartData, Dataset, TypeMap};

use super::aggregate::apply_aggregation;
use super::filter::apply_filters;
use super::join::apply_join;
use super::resolve::{merge_variables, Clock, SystemClock, Variables};
use super::sort::apply_sort;
use super::top::apply_top;

/// Options for a pipeline run
#[derive(Clone)]
pub struct LoadOptions {
    /// Base for relative resource URLs
    pub base_url: Option<Url>,

    /// Variables overriding the chart's own
    pub variables: Variables,

    /// How resources are fetched
    pub fetcher: Arc<dyn ResourceFetcher>,

    /// Source of "now" for live values
    pub clock: Arc<dyn Clock>,

    /// Abandons resource loading when cancelled
    pub cancel: CancellationToken,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            variables: Variables::new(),
            fetcher: Arc::new(DefaultFetcher::default()),
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
        }
    }
}

impl LoadOptions {
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Load and transform the data of one chart.
///
/// Fetches the primary resource and every join resource concurrently, then applies joins,
/// filters, aggregation, sort and top-N as described by `spec`.
pub async fn load_chart_data(spec: &ChartSpec, options: LoadOptions) -> PipelineResult<ChartData> {
    log_info(format!("📥 Loading chart data from {}", spec.data_url));

    let LoadedResources { data, joins } = load_resources(
        spec,
        options.base_url.as_ref(),
        options.fetcher.as_ref(),
        &options.cancel,
    )
    .await?;

    let variables = merge_variables(&spec.variables, &options.variables);
    let chart = apply_stages(spec, data, &joins, &variables, options.clock.as_ref())?;

    log_success(format!("{} rows, {} fields", chart.data.len(), chart.types.len()));
    Ok(chart)
}

/// Apply every stage after loading to already-validated resources.
///
/// `joins` holds one resource per entry of `spec.joins`, in the same order.
pub fn apply_stages(
    spec: &ChartSpec,
    data: LoadedResource,
    joins: &[LoadedResource],
    variables: &Variables,
    clock: &dyn Clock,
) -> TransformResult<ChartData> {
    let mut rows: Dataset = data.data;
    let mut types: TypeMap = data.types;

    for (join, right) in spec.joins.iter().zip(joins) {
        let before = rows.len();
        (rows, types) = apply_join(rows, types, &right.data, &right.types, join)?;
        log_stage(&format!("Join {}", right.url), before, rows.len());
    }

    if !spec.filters.is_empty() {
        let before = rows.len();
        rows = apply_filters(rows, &types, &spec.filters, variables, clock)?;
        log_stage("Filter", before, rows.len());
    }

    if let Some(aggregation) = &spec.aggregation {
        let before = rows.len();
        (rows, types) = apply_aggregation(rows, &types, aggregation)?;
        log_stage("Aggregate", before, rows.len());
    }

    if !spec.sort.is_empty() {
        rows = apply_sort(rows, &types, &spec.sort)?;
        log_stage("Sort", rows.len(), rows.len());
    }

    if let Some(top) = &spec.top {
        let before = rows.len();
        rows = apply_top(rows, &types, top)?;
        log_stage("Top", before, rows.len());
    }

    Ok(ChartData { data: rows, types })
}

fn log_stage(stage: &str, before: usize, after: usize) {
    log_info_indent(format!("{}: {} → {} rows", stage, before, after), 1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{
        AggregateFunction, AggregationSpec, CategorySpec, FilterSpec, Granularity, JoinSpec, MeasureSpec, SortSpec,
        TopSpec, ValueRef,
    };
    use crate::error::{FetchError, FetchResult, PipelineError, TransformError};
    use crate::models::{local_midnight, value_of, FieldType, FieldValue};
    use crate::transform::resolve::FixedClock;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use std::collections::HashMap;

    struct MemoryFetcher(HashMap<String, String>);

    #[async_trait]
    impl ResourceFetcher for MemoryFetcher {
        async fn fetch(&self, url: &Url) -> FetchResult<String> {
            self.0.get(url.as_str()).cloned().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
                status_text: None,
            })
        }
    }

    const SALES: &str = "date,region,amount\n\
        2024-01-15,north,10\n\
        2024-01-20,south,5\n\
        2024-02-03,north,7\n\
        2024-02-10,east,null\n\
        2024-03-01,north,3\n";

    const MANAGERS: &str = r#"[
        {"region": "north", "manager": "Ada"},
        {"region": "south", "manager": "Grace"}
    ]"#;

    fn options() -> LoadOptions {
        let fetcher = MemoryFetcher(HashMap::from([
            ("https://example.com/data/sales.csv".to_string(), SALES.to_string()),
            ("https://example.com/data/managers.json".to_string(), MANAGERS.to_string()),
        ]));
        LoadOptions::default()
            .with_base_url(Url::parse("https://example.com/data/").unwrap())
            .with_fetcher(Arc::new(fetcher))
            .with_clock(Arc::new(FixedClock(Utc::now())))
    }

    fn month(m: u32) -> FieldValue {
        FieldValue::Datetime(local_midnight(NaiveDate::from_ymd_opt(2024, m, 1).unwrap()))
    }

    #[tokio::test]
    async fn test_load_only() {
        let chart = load_chart_data(&ChartSpec::new("sales.csv"), options()).await.unwrap();

        assert_eq!(chart.data.len(), 5);
        assert_eq!(chart.types["date"], FieldType::Datetime);
        assert_eq!(chart.types["region"], FieldType::String);
        assert_eq!(chart.types["amount"], FieldType::Number);
        assert!(chart.data[3]["amount"].is_null());
    }

    #[tokio::test]
    async fn test_full_pipeline() {
        let mut spec = ChartSpec::new("sales.csv");
        spec.variables.insert("min".to_string(), ValueRef::number(4.0));
        spec.filters.push(FilterSpec {
            gte: Some(ValueRef::variable("min")),
            ..FilterSpec::new("amount")
        });
        spec.aggregation = Some(AggregationSpec {
            categories: vec![CategorySpec::bucketed("date", Granularity::Month)],
            measures: vec![MeasureSpec::new("amount", AggregateFunction::Sum)],
        });
        spec.sort.push(SortSpec::desc("SUM(amount)"));
        spec.top = Some(TopSpec {
            count: 1,
            category_fields: Vec::new(),
        });

        let chart = load_chart_data(&spec, options()).await.unwrap();

        assert_eq!(chart.data.len(), 1);
        assert_eq!(chart.data[0]["MONTH(date)"], month(1));
        assert_eq!(chart.data[0]["SUM(amount)"], FieldValue::Number(15.0));
        let fields: Vec<&String> = chart.types.keys().collect();
        assert_eq!(fields, ["MONTH(date)", "SUM(amount)"]);
    }

    #[tokio::test]
    async fn test_option_variables_override_chart_variables() {
        let mut spec = ChartSpec::new("sales.csv");
        spec.variables.insert("min".to_string(), ValueRef::number(100.0));
        spec.filters.push(FilterSpec {
            gt: Some(ValueRef::variable("min")),
            ..FilterSpec::new("amount")
        });

        let overrides = Variables::from([("min".to_string(), ValueRef::number(6.0))]);
        let chart = load_chart_data(&spec, options().with_variables(overrides)).await.unwrap();

        // 10, 7 and the null amount
        assert_eq!(chart.data.len(), 3);
    }

    #[tokio::test]
    async fn test_join_then_sort() {
        let mut spec = ChartSpec::new("sales.csv");
        spec.joins.push(JoinSpec {
            url: "managers.json".to_string(),
            left_fields: vec!["region".to_string()],
            right_fields: None,
        });
        spec.sort.push(SortSpec::asc("manager"));

        let chart = load_chart_data(&spec, options()).await.unwrap();

        assert_eq!(chart.types["region2"], FieldType::String);
        let managers: Vec<&FieldValue> = chart.data.iter().map(|r| value_of(r, "manager")).collect();
        assert_eq!(managers[0], &FieldValue::from("Ada"));
        assert_eq!(managers[3], &FieldValue::from("Grace"));
        // The unmatched east row sorts last and has no joined fields
        assert!(!chart.data[4].contains_key("manager"));
    }

    #[tokio::test]
    async fn test_stage_error_propagates() {
        let mut spec = ChartSpec::new("sales.csv");
        spec.sort.push(SortSpec::asc("missing"));

        let err = load_chart_data(&spec, options()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Transform(TransformError::UnknownField { stage: "sort", .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let fetcher = Arc::new(PendingFetcher);
        let err = load_chart_data(
            &ChartSpec::new("sales.csv"),
            options().with_fetcher(fetcher).with_cancel(cancel),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    struct PendingFetcher;

    #[async_trait]
    impl ResourceFetcher for PendingFetcher {
        async fn fetch(&self, _url: &Url) -> FetchResult<String> {
            std::future::pending().await
        }
    }
}
