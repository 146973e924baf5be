//! # Chartdata - typed chart data pipeline
//!
//! Chartdata turns raw tabular resources (CSV or JSON) into a typed, transformed row set
//! ready for visualization, driven by a declarative chart specification.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  CSV / JSON │────▶│   Loader    │────▶│  Validator  │────▶│  Transform  │──▶ {data, types}
//! │ (http/file) │     │ (concurrent)│     │ (inference) │     │ join…top    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chartdata::{load_chart_data, ChartSpec, LoadOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let spec = ChartSpec::from_json(r#"{"dataURL": "https://example.com/sales.csv"}"#).unwrap();
//!     let chart = load_chart_data(&spec, LoadOptions::default()).await.unwrap();
//!     println!("{} rows", chart.data.len());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Field values, types, rows
//! - [`chart`] - Chart specification
//! - [`parser`] - CSV tokenizer and text decoding
//! - [`validation`] - Type inference and conversion
//! - [`loader`] - Resource fetching
//! - [`transform`] - Join, filter, aggregate, sort, top and the pipeline
//! - [`config`] - Environment configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;
pub mod chart;

// Parsing
pub mod parser;

// Validation
pub mod validation;

// Loading
pub mod loader;

// Transformation
pub mod transform;

// Configuration
pub mod config;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, FetchError, PipelineError, PipelineResult, ServerError, TransformError, ValidationError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{compare_values, ChartData, Dataset, FieldType, FieldValue, Row, TypeMap};

pub use chart::{
    AggregateFunction, AggregationSpec, CategorySpec, ChartSpec, FilterSpec, Granularity, JoinSpec, LiveUnit,
    LiveValue, MeasureSpec, SortSpec, TopSpec, ValueRef,
};

// =============================================================================
// Re-exports - Parsing and validation
// =============================================================================

pub use parser::{decode_bytes_auto, detect_encoding, parse_csv, RawRow};

pub use validation::{infer_types, validate_rows, SourceMode};

// =============================================================================
// Re-exports - Loading
// =============================================================================

pub use loader::{load_resources, DefaultFetcher, FileFetcher, HttpFetcher, ResourceFetcher};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::{load_chart_data, Clock, FixedClock, LoadOptions, SystemClock, Variables};

pub use config::Config;

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
