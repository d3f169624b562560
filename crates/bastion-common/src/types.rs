//! Core types shared across Bastion components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifier::Dimension;

/// One login attempt as reported by the login endpoint.
///
/// The same record is appended to the email bucket and the IP bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttempt {
    /// Normalized email the attempt was made for
    pub email: String,

    /// Client IP the attempt came from
    pub ip: String,

    /// When the attempt was recorded
    pub timestamp: DateTime<Utc>,

    /// Whether the credentials were accepted
    pub success: bool,

    /// Client user agent, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Action requested from the tracking endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Check,
    Record,
    Clear,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Request body of the tracking endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    #[serde(default)]
    pub action: Action,

    #[serde(default)]
    pub email: Option<String>,

    /// Outcome of the login, required for `record`
    #[serde(default)]
    pub success: Option<bool>,

    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Outcome of a `check` or `record` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptVerdict {
    /// Not locked; this many failures remain before a lockout
    Allowed { remaining_attempts: u32 },

    /// Locked until the given instant
    Locked {
        until: DateTime<Utc>,
        dimension: Dimension,
    },

    /// Successful login wiped the counters
    Reset,
}

impl AttemptVerdict {
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}

/// Response body of the tracking endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockout_until: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrackResponse {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

impl From<AttemptVerdict> for TrackResponse {
    fn from(verdict: AttemptVerdict) -> Self {
        match verdict {
            AttemptVerdict::Allowed { remaining_attempts } => Self {
                success: true,
                locked: Some(false),
                remaining_attempts: Some(remaining_attempts),
                ..Default::default()
            },
            AttemptVerdict::Locked { until, dimension } => Self {
                success: false,
                locked: Some(true),
                lockout_until: Some(until),
                reason: Some(dimension.lockout_reason().to_string()),
                ..Default::default()
            },
            AttemptVerdict::Reset => Self {
                locked: Some(false),
                ..Self::message("Login successful, attempt history cleared")
            },
        }
    }
}

/// Result of one cleanup pass over the attempt store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Attempt records that fell out of the window
    pub attempts_pruned: usize,

    /// Buckets left empty and removed
    pub buckets_dropped: usize,

    /// Lockouts that had expired
    pub lockouts_released: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.attempts_pruned == 0 && self.buckets_dropped == 0 && self.lockouts_released == 0
    }
}

/// Snapshot of tracked state for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    /// Identifiers (email or IP) with at least one attempt in the window
    pub tracked_identifiers: usize,

    /// Identifiers currently locked out
    pub active_lockouts: usize,
}
