//! HTTP mapping of handler errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bastion_common::{BastionError, TrackResponse};
use thiserror::Error;

/// Error returned from handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Bastion(#[from] BastionError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Bastion(BastionError::Validation(message.into()))
    }

    /// The typed error, also when it travelled through `anyhow`
    fn bastion(&self) -> Option<&BastionError> {
        match self {
            Self::Bastion(err) => Some(err),
            Self::Internal(err) => err.downcast_ref::<BastionError>(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.bastion() {
            Some(err) if err.is_client_error() => (
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_REQUEST),
                err.to_string(),
            ),
            Some(err) if matches!(err, BastionError::Store(_)) => {
                tracing::error!("Attempt store unavailable: {:#}", self);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Attempt store unavailable".to_string(),
                )
            }
            _ => {
                // Log the real error server-side, return generic message to client
                tracing::error!("Internal error: {:#}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(TrackResponse::error(message))).into_response()
    }
}
