use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;

/// Liveness. Always 200; reports `degraded` while no API key is configured.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.analyzer.is_configured() {
        "ok"
    } else {
        "degraded"
    };

    Json(json!({
        "status": status,
        "service": "attendance-service",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.config.gemini.model,
    }))
}

/// Readiness. Not ready until a vision provider is configured.
pub async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    if state.analyzer.is_configured() {
        Ok(StatusCode::OK)
    } else {
        Err(AppError::ServiceUnavailable(
            "GEMINI_API_KEY is not configured".to_string(),
        ))
    }
}

pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        crate::services::metrics::get_metrics(),
    )
}
