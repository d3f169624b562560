//! Application state and shared resources.

use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::attempts::{AttemptStore, LockoutPolicy, LoginTracker, MemoryStore, RedisStore};
use crate::config::{AppConfig, StoreBackend};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Login attempt tracker
    pub tracker: Arc<LoginTracker>,

    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Create new application state, connecting to Redis if configured
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store = match config.store {
            StoreBackend::Memory => AttemptStore::Memory(MemoryStore::new()),
            StoreBackend::Redis => {
                let store = RedisStore::connect(
                    &config.redis_url,
                    config.lockout.attempt_window(),
                    config.lockout.lockout_duration(),
                )
                .await?;
                tracing::info!(redis_url = %config.redis_url, "✅ Redis connected");
                AttemptStore::Redis(store)
            }
        };

        let tracker = Arc::new(LoginTracker::new(
            LockoutPolicy::try_from(&config.lockout)?,
            store,
        ));

        Ok(Self {
            config,
            tracker,
            started_at: Instant::now(),
        })
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
