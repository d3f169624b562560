//! Configuration management for Gatehouse.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use bastion_common::BastionError;
use bastion_common::constants::{
    ATTEMPT_WINDOW_SECS, CLEANUP_INTERVAL_SECS, DEFAULT_LISTEN_ADDR, DEFAULT_REDIS_URL,
    LOCKOUT_DURATION_SECS, MAX_ATTEMPTS_PER_EMAIL, MAX_ATTEMPTS_PER_IP, MAX_DURATION_SECS,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Where attempt buckets and lockouts live
    #[serde(default)]
    pub store: StoreBackend,

    /// Redis connection URL (only used by the redis backend)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Lockout policy
    #[serde(default)]
    pub lockout: LockoutConfig,
}

/// Attempt store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Per-process maps; state is lost on restart
    #[default]
    Memory,
    /// Shared across every instance using the same Redis
    Redis,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
        }
    }
}

/// Lockout policy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    /// Failed attempts per email before lockout
    #[serde(default = "default_max_per_email")]
    pub max_attempts_per_email: u32,

    /// Failed attempts per client IP before lockout
    #[serde(default = "default_max_per_ip")]
    pub max_attempts_per_ip: u32,

    /// Lockout duration in seconds
    #[serde(default = "default_lockout_duration")]
    pub lockout_duration_secs: u64,

    /// Window over which failures are counted, in seconds
    #[serde(default = "default_attempt_window")]
    pub attempt_window_secs: u64,

    /// Background sweep interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_email: default_max_per_email(),
            max_attempts_per_ip: default_max_per_ip(),
            lockout_duration_secs: default_lockout_duration(),
            attempt_window_secs: default_attempt_window(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl LockoutConfig {
    pub fn lockout_duration(&self) -> Duration {
        Duration::from_secs(self.lockout_duration_secs)
    }

    pub fn attempt_window(&self) -> Duration {
        Duration::from_secs(self.attempt_window_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Reject limits that would lock everyone out, never count anything,
    /// or overflow timestamp arithmetic
    pub fn validate(&self) -> Result<(), BastionError> {
        let limits = [
            ("max_attempts_per_email", self.max_attempts_per_email as u64),
            ("max_attempts_per_ip", self.max_attempts_per_ip as u64),
        ];
        let durations = [
            ("lockout_duration_secs", self.lockout_duration_secs),
            ("attempt_window_secs", self.attempt_window_secs),
            ("cleanup_interval_secs", self.cleanup_interval_secs),
        ];

        if let Some((field, _)) = limits
            .iter()
            .chain(durations.iter())
            .find(|(_, value)| *value == 0)
        {
            return Err(BastionError::Config(format!(
                "lockout.{field} must be greater than zero"
            )));
        }

        if let Some((field, value)) = durations
            .iter()
            .find(|(_, value)| *value > MAX_DURATION_SECS)
        {
            return Err(BastionError::Config(format!(
                "lockout.{field} = {value} exceeds the maximum of {MAX_DURATION_SECS} seconds"
            )));
        }

        Ok(())
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_max_per_email() -> u32 { MAX_ATTEMPTS_PER_EMAIL }
fn default_max_per_ip() -> u32 { MAX_ATTEMPTS_PER_IP }
fn default_lockout_duration() -> u64 { LOCKOUT_DURATION_SECS }
fn default_attempt_window() -> u64 { ATTEMPT_WINDOW_SECS }
fn default_cleanup_interval() -> u64 { CLEANUP_INTERVAL_SECS }

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = Self::from_file(config_path)?;

        // Apply CLI overrides
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(store) = args.store {
            config.store = store;
        }
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = redis_url.clone();
        }

        config
            .lockout
            .validate()
            .context("Invalid lockout configuration")?;

        Ok(config)
    }

    fn from_file(config_path: &str) -> Result<Self> {
        if !Path::new(config_path).exists() {
            // Use defaults if config file doesn't exist
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path))
            .build()
            .context("Failed to load config file")?;

        settings
            .try_deserialize()
            .context("Failed to parse config")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            store: StoreBackend::default(),
            redis_url: default_redis_url(),
            lockout: LockoutConfig::default(),
        }
    }
}
