// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only view over the result sink for dashboards. All endpoints live under
// `/api/v1/` and return exactly what the pipeline last published:
//
//   GET /api/v1/health
//   GET /api/v1/status/:symbol
//   GET /api/v1/analysis/:symbol/:interval
//   GET /api/v1/summary
//
// A missing key is 404; a stored ERROR status is still a 200. Sink failures
// surface as 503.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

use crate::clock::Clock;
use crate::error::PipelineError;
use crate::market_data::Interval;
use crate::runtime_config::normalize_symbol;
use crate::store::{get_json, keys, ResultSink};

/// Shared state for the read API.
pub struct ApiState {
    pub sink: Arc<dyn ResultSink>,
    pub clock: Arc<dyn Clock>,
}

type ApiError = (StatusCode, Json<Value>);
type ApiResult = Result<Json<Value>, ApiError>;

// =============================================================================
// Router construction
// =============================================================================

/// Build the REST API router with CORS middleware and shared state.
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/status/:symbol", get(market_status))
        .route("/api/v1/analysis/:symbol/:interval", get(analysis))
        .route("/api/v1/summary", get(summary))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: i64,
}

async fn health(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        server_time: state.clock.now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Published records
// =============================================================================

async fn market_status(
    State(state): State<Arc<ApiState>>,
    Path(symbol): Path<String>,
) -> ApiResult {
    let symbol = normalize_symbol(&symbol);
    read_key(&state, &keys::market_status_key(&symbol)).await
}

async fn analysis(
    State(state): State<Arc<ApiState>>,
    Path((symbol, interval)): Path<(String, String)>,
) -> ApiResult {
    let interval: Interval = interval.parse().map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("{e}") })),
        )
    })?;
    let symbol = normalize_symbol(&symbol);
    read_key(&state, &keys::analysis_key(&symbol, interval)).await
}

async fn summary(State(state): State<Arc<ApiState>>) -> ApiResult {
    read_key(&state, keys::MARKET_SUMMARY_KEY).await
}

async fn read_key(state: &ApiState, key: &str) -> ApiResult {
    match get_json::<Value>(state.sink.as_ref(), key).await {
        Ok(Some(value)) => Ok(Json(value)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("{key} not found") })),
        )),
        Err(PipelineError::Serialization(e)) => {
            error!(key, error = %e, "stored value is not valid JSON");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "stored value is corrupt" })),
            ))
        }
        Err(e) => {
            warn!(key, error = %e, "result sink read failed");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": format!("{e}") })),
            ))
        }
    }
}
