//! Common error types for Bastion components.

use thiserror::Error;

/// Common errors across Bastion components
#[derive(Debug, Error)]
pub enum BastionError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or malformed request field
    #[error("{0}")]
    Validation(String),

    /// Attempt store (Redis) operation error
    #[error("Store error: {0}")]
    Store(String),
}

impl BastionError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::Validation(_) => 400,
            Self::Store(_) => 503,
        }
    }

    /// Returns true if the message is safe to show to the caller
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
