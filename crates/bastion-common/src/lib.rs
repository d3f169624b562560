//! # Bastion Common
//!
//! Shared types, constants, and utilities used across Bastion components.
//!
//! ## Modules
//! - `types` - Wire types and attempt records (LoginAttempt, TrackResponse, etc.)
//! - `identifier` - Hashed identifier keys for the attempt buckets
//! - `error` - Common error types
//! - `constants` - Shared configuration constants

pub mod constants;
pub mod error;
pub mod identifier;
pub mod types;

pub use error::BastionError;
pub use identifier::{Dimension, IdentifierKey};
pub use types::*;
