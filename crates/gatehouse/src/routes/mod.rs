//! HTTP route handlers for Gatehouse.

use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod health;
mod login;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/metrics", get(health::metrics))

        // Login attempt tracking (called by the login endpoint)
        .route("/login-attempts", post(login::track_login_attempt))

        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))

        // Add shared state
        .with_state(state)
}
