//! Attempt bucket and lockout storage.

use anyhow::Result;
use bastion_common::{IdentifierKey, LoginAttempt, SweepReport, TrackerStats};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use super::redis_store::RedisStore;

/// Storage backend behind the tracker
pub enum AttemptStore {
    /// Per-process maps
    Memory(MemoryStore),
    /// Shared Redis keyspace
    Redis(RedisStore),
}

impl AttemptStore {
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Redis(_) => "redis",
        }
    }

    /// Drop out-of-window attempts, empty buckets, and expired lockouts
    pub async fn sweep(&self, now: DateTime<Utc>, window_start: DateTime<Utc>) -> Result<SweepReport> {
        match self {
            Self::Memory(store) => Ok(store.sweep(now, window_start).await),
            // Redis expires attempts and lockouts through key TTLs
            Self::Redis(_) => Ok(SweepReport::default()),
        }
    }

    /// Active lockout expiry for `key`; a stale entry is removed
    pub async fn lockout_until(
        &self,
        key: &IdentifierKey,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        match self {
            Self::Memory(store) => Ok(store.lockout_until(key, now).await),
            Self::Redis(store) => store.lockout_until(key, now).await,
        }
    }

    /// Failed attempts for `key` at or after `window_start`
    pub async fn failed_count(&self, key: &IdentifierKey, window_start: DateTime<Utc>) -> Result<u32> {
        match self {
            Self::Memory(store) => Ok(store.failed_count(key, window_start).await),
            Self::Redis(store) => store.failed_count(key, window_start).await,
        }
    }

    /// Append one attempt to every bucket in `keys` as a single operation
    pub async fn append(&self, keys: &[&IdentifierKey], attempt: &LoginAttempt) -> Result<()> {
        match self {
            Self::Memory(store) => {
                store.append(keys, attempt).await;
                Ok(())
            }
            Self::Redis(store) => store.append(keys, attempt).await,
        }
    }

    pub async fn set_lockout(&self, key: &IdentifierKey, until: DateTime<Utc>) -> Result<()> {
        match self {
            Self::Memory(store) => {
                store.set_lockout(key, until).await;
                Ok(())
            }
            Self::Redis(store) => store.set_lockout(key, until).await,
        }
    }

    /// Forget the bucket and any lockout for `key`
    pub async fn reset(&self, key: &IdentifierKey) -> Result<()> {
        match self {
            Self::Memory(store) => {
                store.reset(key).await;
                Ok(())
            }
            Self::Redis(store) => store.reset(key).await,
        }
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> Result<TrackerStats> {
        match self {
            Self::Memory(store) => Ok(store.stats(now).await),
            Self::Redis(store) => store.stats().await,
        }
    }

    /// Is the backend reachable?
    pub async fn ping(&self) -> Result<()> {
        match self {
            Self::Memory(_) => Ok(()),
            Self::Redis(store) => store.ping().await,
        }
    }
}

#[derive(Default)]
struct Buckets {
    attempts: HashMap<IdentifierKey, VecDeque<LoginAttempt>>,
    lockouts: HashMap<IdentifierKey, DateTime<Utc>>,
}

/// In-process attempt store.
///
/// Both maps sit behind one mutex, so each operation is atomic with respect
/// to every other request handler. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Buckets>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sweep(&self, now: DateTime<Utc>, window_start: DateTime<Utc>) -> SweepReport {
        let mut guard = self.inner.lock().await;
        let buckets = &mut *guard;
        let mut report = SweepReport::default();

        buckets.attempts.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain(|attempt| attempt.timestamp >= window_start);
            report.attempts_pruned += before - bucket.len();

            if bucket.is_empty() {
                report.buckets_dropped += 1;
                false
            } else {
                true
            }
        });

        let before = buckets.lockouts.len();
        buckets.lockouts.retain(|_, until| now < *until);
        report.lockouts_released = before - buckets.lockouts.len();

        report
    }

    async fn lockout_until(&self, key: &IdentifierKey, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut buckets = self.inner.lock().await;

        match buckets.lockouts.get(key).copied() {
            Some(until) if now < until => Some(until),
            Some(_) => {
                buckets.lockouts.remove(key);
                None
            }
            None => None,
        }
    }

    async fn failed_count(&self, key: &IdentifierKey, window_start: DateTime<Utc>) -> u32 {
        let buckets = self.inner.lock().await;

        buckets.attempts.get(key).map_or(0, |bucket| {
            bucket
                .iter()
                .filter(|attempt| !attempt.success && attempt.timestamp >= window_start)
                .count() as u32
        })
    }

    async fn append(&self, keys: &[&IdentifierKey], attempt: &LoginAttempt) {
        let mut buckets = self.inner.lock().await;

        for key in keys {
            buckets
                .attempts
                .entry((*key).clone())
                .or_default()
                .push_back(attempt.clone());
        }
    }

    async fn set_lockout(&self, key: &IdentifierKey, until: DateTime<Utc>) {
        self.inner.lock().await.lockouts.insert(key.clone(), until);
    }

    async fn reset(&self, key: &IdentifierKey) {
        let mut buckets = self.inner.lock().await;
        buckets.attempts.remove(key);
        buckets.lockouts.remove(key);
    }

    async fn stats(&self, now: DateTime<Utc>) -> TrackerStats {
        let buckets = self.inner.lock().await;

        TrackerStats {
            tracked_identifiers: buckets.attempts.len(),
            active_lockouts: buckets.lockouts.values().filter(|until| now < **until).count(),
        }
    }
}
