//! Health check endpoint

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::api::server::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "mirage",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "uptime_secs": state.started_at.elapsed().as_secs(),
            "rate_limit_keys": state.rate_limiter.tracked_keys(),
        })),
    )
}
