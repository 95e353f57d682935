//! Loki-compatible HTTP API.
//!
//! Routes:
//! - `GET  /`                          -> `{"hello":"loki"}`
//! - `POST /api/prom/push`             -> ingest, `200` with an empty body
//! - `GET  /api/prom/query`            -> streams for one exact label set
//! - `GET  /api/prom/label`            -> all label names
//! - `GET  /api/prom/label/:name/values` -> values for one name
//! - `GET  /health`                    -> status and buffer statistics

use crate::application::Pipeline;
use crate::buffer::BufferStats;
use crate::core::GatewayError;
use crate::index::LabelCatalog;
use crate::ingest::PushRequest;
use crate::query::{QueryParams, QueryResponse};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// API server state.
#[derive(Clone)]
pub struct ApiState {
    pipeline: Arc<Pipeline>,
    started: Instant,
}

impl ApiState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            started: Instant::now(),
        }
    }
}

/// `{ "values": [...] }` body of both label endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelValuesResponse {
    pub values: Vec<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
    pub uptime_seconds: u64,
    pub series: usize,
    pub buffers: BuffersHealth,
}

#[derive(Debug, Serialize)]
pub struct BuffersHealth {
    pub samples: BufferStats,
    pub labels: BufferStats,
}

/// Build the router with tracing, CORS and a global in-flight limit.
pub fn create_router(state: ApiState, max_connections: usize) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/prom/push", post(push_handler))
        .route("/api/prom/query", get(query_handler))
        .route("/api/prom/label", get(label_names_handler))
        .route("/api/prom/label/:name/values", get(label_values_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(tower_http::cors::Any)
                        .allow_methods(tower_http::cors::Any)
                        .allow_headers(tower_http::cors::Any),
                )
                .layer(GlobalConcurrencyLimitLayer::new(max_connections)),
        )
        .with_state(state)
}

async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "hello": "loki" }))
}

/// POST /api/prom/push - acknowledged before anything reaches the backend
async fn push_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json");

    if content_type.contains("application/x-protobuf") {
        return Err(ApiError::UnsupportedMediaType(
            "only JSON push bodies are supported".to_string(),
        ));
    }

    let request: PushRequest = serde_json::from_slice(&body).map_err(GatewayError::from)?;

    tracing::debug!(bytes = body.len(), streams = request.streams.len(), "Push received");
    state.pipeline.ingester.ingest(&request);

    Ok(StatusCode::OK)
}

/// GET /api/prom/query
async fn query_handler(
    State(state): State<ApiState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryResponse>, ApiError> {
    Ok(Json(state.pipeline.query.query(&params).await?))
}

/// GET /api/prom/label
async fn label_names_handler(State(state): State<ApiState>) -> Json<LabelValuesResponse> {
    Json(LabelValuesResponse {
        values: state.pipeline.index.label_names(),
    })
}

/// GET /api/prom/label/:name/values
async fn label_values_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Json<LabelValuesResponse> {
    Json(LabelValuesResponse {
        values: state.pipeline.index.label_values(&name),
    })
}

/// GET /health
async fn health_handler(State(state): State<ApiState>) -> Json<HealthResponse> {
    let pipeline = &state.pipeline;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: pipeline.backend.name(),
        uptime_seconds: state.started.elapsed().as_secs(),
        series: pipeline.index.series_count(),
        buffers: BuffersHealth {
            samples: pipeline.samples.stats(),
            labels: pipeline.labels.stats(),
        },
    })
}

/// HTTP-specific error type.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    UnsupportedMediaType(String),
    BadGateway(String),
    Internal(String),
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match &err {
            GatewayError::Parse { .. }
            | GatewayError::InvalidRequest(_)
            | GatewayError::Serialization(_) => ApiError::BadRequest(err.to_string()),
            GatewayError::Backend { .. }
            | GatewayError::Unreachable(_)
            | GatewayError::Http(_)
            | GatewayError::Timeout { .. }
            | GatewayError::MalformedRow(_) => {
                tracing::warn!(category = err.category(), "Backend read failed: {}", err);
                ApiError::BadGateway(err.to_string())
            },
            _ => {
                tracing::error!(category = err.category(), "Request failed: {}", err);
                ApiError::Internal(err.to_string())
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::UnsupportedMediaType(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::UnsupportedMediaType(msg) => write!(f, "Unsupported Media Type: {}", msg),
            ApiError::BadGateway(msg) => write!(f, "Bad Gateway: {}", msg),
            ApiError::Internal(msg) => write!(f, "Internal Error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}
