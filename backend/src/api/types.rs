//! REST API types.
//!
//! Wire names are camelCase; rows and types keep their field order.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::chart::ChartSpec;
use crate::models::{ChartData, Dataset, TypeMap};
use crate::transform::Variables;

/// Body of `POST /api/chart-data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataRequest {
    /// Chart specification to run
    pub spec: ChartSpec,

    /// Variables overriding the chart's own
    #[serde(default)]
    pub variables: Variables,

    /// Base for relative resource URLs (falls back to the server's configured base)
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Response to `POST /api/chart-data`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataResponse {
    /// Unique request identifier, also used in server logs
    pub request_id: String,

    pub row_count: usize,

    pub data: Dataset,

    pub types: TypeMap,
}

impl ChartDataResponse {
    pub fn new(request_id: Uuid, chart: ChartData) -> Self {
        Self {
            request_id: request_id.to_string(),
            row_count: chart.data.len(),
            data: chart.data,
            types: chart.types,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "requestId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error
    })
}
