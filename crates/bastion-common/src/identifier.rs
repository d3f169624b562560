//! Hashed identifier keys.
//!
//! Buckets and lockouts are keyed by a digest of the raw email or IP so that
//! raw PII never ends up as a map or Redis key. SHA-256 is used only as a
//! stable hash here; the tracker is an abuse deterrent, not an access-control
//! boundary, and collisions are tolerated.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::constants::reasons;

/// Bytes of the digest kept in the key
const DIGEST_LEN: usize = 12;

/// The two independent dimensions attempts are counted along
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Email,
    Ip,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Ip => "ip",
        }
    }

    /// Reason reported when this dimension triggers a lockout
    pub fn lockout_reason(&self) -> &'static str {
        match self {
            Self::Email => reasons::EMAIL_LOCKED,
            Self::Ip => reasons::IP_LOCKED,
        }
    }
}

/// Opaque bucket key: `{dimension}:{base64url(sha256(value)[..12])}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentifierKey(String);

impl IdentifierKey {
    /// Key for an email; trimmed and lower-cased before hashing
    pub fn email(raw: &str) -> Self {
        Self::derive(Dimension::Email, &normalize_email(raw))
    }

    /// Key for a client IP
    pub fn ip(raw: &str) -> Self {
        Self::derive(Dimension::Ip, raw.trim())
    }

    fn derive(dimension: Dimension, value: &str) -> Self {
        let digest = Sha256::digest(value.as_bytes());
        Self(format!(
            "{}:{}",
            dimension.as_str(),
            URL_SAFE_NO_PAD.encode(&digest[..DIGEST_LEN])
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentifierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical form of an email for counting purposes
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}
