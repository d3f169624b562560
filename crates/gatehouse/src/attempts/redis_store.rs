//! Redis-backed attempt store for multi-instance deployments.
//!
//! Layout:
//! - `bastion:attempts:{key}` sorted set, scored by attempt time in millis,
//!   TTL refreshed to the attempt window on every append
//! - `bastion:lockout:{key}` lockout expiry in millis, `PX` set to the
//!   lockout duration

use anyhow::{Context, Result};
use bastion_common::constants::redis_keys::{ATTEMPTS_PREFIX, LOCKOUT_PREFIX};
use bastion_common::{BastionError, IdentifierKey, LoginAttempt, TrackerStats};
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sorted-set member; the nonce keeps identical attempts from collapsing
#[derive(Serialize, Deserialize)]
struct StoredAttempt {
    nonce: u64,
    #[serde(flatten)]
    attempt: LoginAttempt,
}

/// Attempt store on a shared Redis
pub struct RedisStore {
    /// Redis connection manager (auto-reconnecting)
    redis: ConnectionManager,
    /// Attempt window, also the bucket TTL
    attempt_window: Duration,
    /// Lockout key TTL
    lockout_duration: Duration,
}

impl RedisStore {
    /// Connect to Redis
    pub async fn connect(
        redis_url: &str,
        attempt_window: Duration,
        lockout_duration: Duration,
    ) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let redis = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            redis,
            attempt_window,
            lockout_duration,
        })
    }

    pub async fn lockout_until(
        &self,
        key: &IdentifierKey,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let lockout_key = lockout_key(key);
        let mut conn = self.redis.clone();
        let raw: Option<i64> = conn
            .get(&lockout_key)
            .await
            .map_err(store_error("Failed to read lockout"))?;

        match raw.and_then(DateTime::from_timestamp_millis) {
            Some(until) if now < until => Ok(Some(until)),
            Some(_) => {
                let _: () = conn
                    .del(&lockout_key)
                    .await
                    .map_err(store_error("Failed to clear stale lockout"))?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub async fn failed_count(&self, key: &IdentifierKey, window_start: DateTime<Utc>) -> Result<u32> {
        let mut conn = self.redis.clone();
        let members: Vec<String> = conn
            .zrangebyscore(attempts_key(key), window_start.timestamp_millis(), "+inf")
            .await
            .map_err(store_error("Failed to read attempt bucket"))?;

        Ok(count_failed(key, &members))
    }

    /// Append to every bucket in one MULTI/EXEC, trimming out-of-window members
    pub async fn append(&self, keys: &[&IdentifierKey], attempt: &LoginAttempt) -> Result<()> {
        let member = serde_json::to_string(&StoredAttempt {
            nonce: rand::random(),
            attempt: attempt.clone(),
        })?;
        let score = attempt.timestamp.timestamp_millis();
        let cutoff = score - self.attempt_window.as_millis() as i64;
        let ttl = self.attempt_window.as_secs() as i64;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in keys {
            let bucket = attempts_key(key);
            pipe.zadd(&bucket, &member, score)
                .ignore()
                .zrembyscore(&bucket, "-inf", format!("({cutoff}"))
                .ignore()
                .expire(&bucket, ttl)
                .ignore();
        }

        let mut conn = self.redis.clone();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(store_error("Failed to append attempt"))?;

        Ok(())
    }

    pub async fn set_lockout(&self, key: &IdentifierKey, until: DateTime<Utc>) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: () = conn
            .pset_ex(
                lockout_key(key),
                until.timestamp_millis(),
                self.lockout_duration.as_millis() as u64,
            )
            .await
            .map_err(store_error("Failed to set lockout"))?;

        Ok(())
    }

    pub async fn reset(&self, key: &IdentifierKey) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: () = conn
            .del(vec![attempts_key(key), lockout_key(key)])
            .await
            .map_err(store_error("Failed to reset identifier"))?;

        Ok(())
    }

    pub async fn stats(&self) -> Result<TrackerStats> {
        Ok(TrackerStats {
            tracked_identifiers: self.count_keys(&format!("{ATTEMPTS_PREFIX}*")).await?,
            active_lockouts: self.count_keys(&format!("{LOCKOUT_PREFIX}*")).await?,
        })
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_error("Redis did not answer PING"))?;

        Ok(())
    }

    /// Count keys matching `pattern` with SCAN (never KEYS)
    async fn count_keys(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.redis.clone();
        let mut cursor: u64 = 0;
        let mut total = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await
                .map_err(store_error("Failed to scan keys"))?;

            total += keys.len();
            if next == 0 {
                return Ok(total);
            }
            cursor = next;
        }
    }
}

/// Failed attempts among bucket members.
///
/// A member that does not decode counts as a failure, so a corrupt bucket
/// can only tighten the lockout.
fn count_failed(key: &IdentifierKey, members: &[String]) -> u32 {
    members
        .iter()
        .filter(|member| match serde_json::from_str::<StoredAttempt>(member) {
            Ok(stored) => !stored.attempt.success,
            Err(e) => {
                tracing::warn!(identifier = %key, error = %e, "Undecodable attempt in bucket");
                true
            }
        })
        .count() as u32
}

/// Redis failures surface as `Store` so handlers answer 503
fn store_error(action: &'static str) -> impl FnOnce(redis::RedisError) -> BastionError {
    move |e| BastionError::Store(format!("{action}: {e}"))
}

fn attempts_key(key: &IdentifierKey) -> String {
    format!("{ATTEMPTS_PREFIX}{key}")
}

fn lockout_key(key: &IdentifierKey) -> String {
    format!("{LOCKOUT_PREFIX}{key}")
}
