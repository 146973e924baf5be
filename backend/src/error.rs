//! Error types for the chart data pipeline.
//!
//! One enum per layer, chained with `From` so `?` works across boundaries:
//!
//! - [`FetchError`] - Resource fetch failures (HTTP status, transport, file I/O)
//! - [`ValidationError`] - Type inference / conversion failures
//! - [`TransformError`] - Join, filter, aggregation, sort and top-N failures
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ConfigError`] - Environment configuration errors
//! - [`ServerError`] - HTTP API errors
//!
//! Every error is fatal to the pipeline call that produced it.

use thiserror::Error;

use crate::models::FieldType;

// =============================================================================
// Fetch Errors
// =============================================================================

/// Errors raised while fetching a resource.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("Failed to fetch {url}: HTTP {status}{}", status_suffix(.status_text))]
    Status {
        url: String,
        status: u16,
        status_text: Option<String>,
    },

    /// The request could not be completed.
    #[error("Failed to fetch {url}: {message}")]
    Request { url: String, message: String },

    /// A local file could not be read.
    #[error("Failed to read {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// No fetcher handles this URL scheme.
    #[error("Unsupported URL scheme '{scheme}' for {url}")]
    UnsupportedScheme { url: String, scheme: String },
}

fn status_suffix(status_text: &Option<String>) -> String {
    status_text
        .as_deref()
        .map(|text| format!(" {}", text))
        .unwrap_or_default()
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors raised by type inference and conversion.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A value does not convert to its field's type.
    #[error("Invalid field value {value} for field '{field}' (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: FieldType,
    },
}

// =============================================================================
// Transform Errors
// =============================================================================

/// Errors raised by the join, filter, aggregation, sort and top-N stages.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A stage references a field missing from the current type map.
    #[error("Unknown {stage} field '{field}'")]
    UnknownField { stage: &'static str, field: String },

    /// A join references a field missing on one side.
    #[error("Unknown {side} field '{field}' in join with {url}")]
    UnknownJoinField {
        url: String,
        side: &'static str,
        field: String,
    },

    /// Join field counts or types disagree between both sides.
    #[error("Invalid join with {url}: {message}")]
    JoinShape { url: String, message: String },

    /// Aggregation function or bucket incompatible with the field type.
    #[error("Invalid aggregation of field '{field}': {message}")]
    AggregationFunction { field: String, message: String },

    /// A resolved filter operand has the wrong type.
    #[error("Filter value for field '{field}' has type {actual}, expected {expected}")]
    FilterValueType {
        field: String,
        expected: FieldType,
        actual: FieldType,
    },

    /// A variable reference names no variable.
    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),

    /// Variable references form a cycle.
    #[error("Variable '{0}' references itself")]
    VariableCycle(String),

    /// A literal value cannot be interpreted.
    #[error("Invalid {kind} literal '{value}'")]
    InvalidLiteral { kind: &'static str, value: String },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
///
/// This is the error type returned by [`crate::transform::pipeline::load_chart_data`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Resource fetch error.
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Type validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Transform stage error.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// A resource URL cannot be resolved.
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// A JSON resource is not an array of row objects.
    #[error("Invalid JSON resource {url}: {message}")]
    Decode { url: String, message: String },

    /// The caller abandoned the load.
    #[error("Chart data load cancelled")]
    Cancelled,
}

// =============================================================================
// Config Errors
// =============================================================================

/// Environment configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set to an unusable value.
    #[error("Invalid value '{value}' for {name}: {message}")]
    Invalid {
        name: &'static str,
        value: String,
        message: String,
    },
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result type for transform stages.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
