//! Health check endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    store: &'static str,
}

/// Readiness check (is the attempt store reachable?)
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<Json<ReadyResponse>, StatusCode> {
    match state.tracker.ping().await {
        Ok(()) => Ok(Json(ReadyResponse {
            status: "ready",
            store: state.tracker.backend(),
        })),
        Err(e) => {
            tracing::warn!(error = %e, "Attempt store not ready");
            // Return 503 if not ready
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

#[derive(Serialize)]
pub struct MetricsResponse {
    store: &'static str,
    tracked_identifiers: usize,
    active_lockouts: usize,
    attempt_window_secs: u64,
    uptime_secs: u64,
}

/// Metrics endpoint (for monitoring)
pub async fn metrics(
    State(state): State<AppState>,
) -> Result<Json<MetricsResponse>, ApiError> {
    let stats = state.tracker.stats().await?;

    Ok(Json(MetricsResponse {
        store: state.tracker.backend(),
        tracked_identifiers: stats.tracked_identifiers,
        active_lockouts: stats.active_lockouts,
        attempt_window_secs: state.config.lockout.attempt_window_secs,
        uptime_secs: state.uptime().as_secs(),
    }))
}
