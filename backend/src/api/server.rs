//! HTTP Server for the chartdata API.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | POST   | `/api/chart-data` | Run a chart specification            |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use reqwest::Url;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, ChartDataRequest, ChartDataResponse};
use crate::config::Config;
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::loader::ResourceFetcher;
use crate::transform::pipeline::{load_chart_data, LoadOptions};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub base_url: Option<Url>,
    pub fetcher: Arc<dyn ResourceFetcher>,
}

impl AppState {
    /// State for serving untrusted clients: `file` URLs are refused.
    pub fn from_config(config: &Config) -> ServerResult<Self> {
        let fetcher = config.remote_fetcher().map_err(|e| ServerError::Internal(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.clone(),
            fetcher: Arc::new(fetcher),
        })
    }
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Pipeline(PipelineError::Fetch(_)) => StatusCode::BAD_GATEWAY,
            ServerError::Pipeline(PipelineError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Pipeline(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(error_response(&self.to_string()))).into_response()
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/chart-data", post(chart_data))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(AppState::from_config(&config)?);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    eprintln!("🚀 Chartdata server running on http://localhost:{}", config.port);
    eprintln!("   POST /api/chart-data - Run a chart specification");
    eprintln!("   GET  /api/logs       - SSE log stream");
    eprintln!("   GET  /health         - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "chartdata",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "chartData": "POST /api/chart-data",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers skip what they missed
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Chart data endpoint
async fn chart_data(
    State(state): State<AppState>,
    payload: Result<Json<ChartDataRequest>, JsonRejection>,
) -> ServerResult<Json<ChartDataResponse>> {
    let Json(request) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    run_request(&state, request).await.map(Json)
}

/// Run one chart-data request against `state`.
pub async fn run_request(state: &AppState, request: ChartDataRequest) -> ServerResult<ChartDataResponse> {
    let request_id = Uuid::new_v4();

    let base_url = match request.base_url.as_deref() {
        Some(raw) => Some(
            Url::parse(raw).map_err(|e| ServerError::BadRequest(format!("Invalid baseUrl '{}': {}", raw, e)))?,
        ),
        None => state.base_url.clone(),
    };

    log_info(format!("📊 Request {}: {}", request_id, request.spec.data_url));

    let mut options = LoadOptions::default()
        .with_fetcher(Arc::clone(&state.fetcher))
        .with_variables(request.variables);
    options.base_url = base_url;

    let chart = load_chart_data(&request.spec, options).await.map_err(|e| {
        log_error(format!("Request {} failed: {}", request_id, e));
        ServerError::from(e)
    })?;

    Ok(ChartDataResponse::new(request_id, chart))
}
