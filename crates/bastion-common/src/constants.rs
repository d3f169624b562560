//! Shared constants for Bastion components.

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default Gatehouse HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8890";

/// Failed attempts per email before lockout
pub const MAX_ATTEMPTS_PER_EMAIL: u32 = 5;

/// Failed attempts per client IP before lockout
pub const MAX_ATTEMPTS_PER_IP: u32 = 10;

/// Lockout duration in seconds (15 minutes)
pub const LOCKOUT_DURATION_SECS: u64 = 900;

/// Trailing window over which failed attempts are counted (15 minutes)
pub const ATTEMPT_WINDOW_SECS: u64 = 900;

/// Background sweep interval in seconds (1 hour)
pub const CLEANUP_INTERVAL_SECS: u64 = 3600;

/// Upper bound for any configured duration (7 days)
pub const MAX_DURATION_SECS: u64 = 7 * 24 * 3600;

/// Client IP used when no header or peer address resolves
pub const UNKNOWN_IP: &str = "unknown";

/// Lockout reasons reported to callers
pub mod reasons {
    pub const EMAIL_LOCKED: &str = "Too many failed attempts for this email";
    pub const IP_LOCKED: &str = "Too many failed attempts from this IP address";
}

/// Redis key prefixes
pub mod redis_keys {
    /// Attempt bucket (sorted set scored by timestamp): bastion:attempts:{key}
    pub const ATTEMPTS_PREFIX: &str = "bastion:attempts:";

    /// Lockout expiry (millis since epoch): bastion:lockout:{key}
    pub const LOCKOUT_PREFIX: &str = "bastion:lockout:";
}

/// HTTP header names
pub mod headers {
    /// Proxy chain, client first
    pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

    /// Single client address set by nginx-style proxies
    pub const X_REAL_IP: &str = "x-real-ip";
}
