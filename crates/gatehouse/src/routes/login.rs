//! Login attempt tracking endpoint.
//!
//! One POST endpoint dispatched on `action`:
//! - `check`: is this email/IP currently locked out?
//! - `record`: report the outcome of a login attempt
//! - `clear`: administrative reset

use axum::{
    Json,
    extract::{ConnectInfo, State, rejection::JsonRejection},
    http::{Extensions, HeaderMap, header},
};
use std::net::SocketAddr;

use bastion_common::{Action, TrackRequest, TrackResponse};

use crate::client_ip::resolve_client_ip;
use crate::error::ApiError;
use crate::state::AppState;

/// Track a login attempt
///
/// Returns:
/// - 200: verdict (locked or not) or confirmation
/// - 400: malformed body, missing field, or unknown action
/// - 500: store failure
pub async fn track_login_attempt(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    payload: Result<Json<TrackRequest>, JsonRejection>,
) -> Result<Json<TrackResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected login-attempt body");
        ApiError::validation(format!("Invalid request body: {}", rejection.body_text()))
    })?;

    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = resolve_client_ip(&headers, peer);
    let email = request
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty());

    tracing::debug!(action = ?request.action, ip = %ip, "Login attempt request");

    match request.action {
        Action::Check => {
            let verdict = state.tracker.check(email, &ip).await?;
            Ok(Json(verdict.into()))
        }
        Action::Record => {
            let email = email.ok_or_else(|| ApiError::validation("Email is required"))?;
            let success = request
                .success
                .ok_or_else(|| ApiError::validation("Success flag is required"))?;
            let user_agent = request.user_agent.or_else(|| {
                headers
                    .get(header::USER_AGENT)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            });

            let verdict = state
                .tracker
                .record(email, &ip, success, user_agent.as_deref())
                .await?;
            Ok(Json(verdict.into()))
        }
        Action::Clear => {
            state.tracker.clear(email, &ip).await?;
            Ok(Json(TrackResponse::message("Lockout cleared")))
        }
        Action::Unknown => Err(ApiError::validation(
            "Invalid action. Must be one of: check, record, clear",
        )),
    }
}
