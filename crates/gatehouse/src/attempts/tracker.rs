//! Per-email and per-IP failed login tracking with temporary lockouts.

use anyhow::Result;
use bastion_common::constants::{
    ATTEMPT_WINDOW_SECS, LOCKOUT_DURATION_SECS, MAX_ATTEMPTS_PER_EMAIL, MAX_ATTEMPTS_PER_IP,
};
use bastion_common::identifier::normalize_email;
use bastion_common::{
    AttemptVerdict, BastionError, Dimension, IdentifierKey, LoginAttempt, SweepReport,
    TrackerStats,
};
use chrono::{DateTime, TimeDelta, Utc};

use super::store::AttemptStore;
use crate::config::LockoutConfig;

/// Limits applied by the tracker
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    /// Failed attempts per email before lockout
    pub max_attempts_per_email: u32,
    /// Failed attempts per IP before lockout
    pub max_attempts_per_ip: u32,
    /// How long a lockout lasts
    pub lockout_duration: TimeDelta,
    /// Trailing span over which failures count
    pub attempt_window: TimeDelta,
}

impl LockoutPolicy {
    /// Failures left before the tighter of the two limits is hit
    fn remaining(&self, email_failed: u32, ip_failed: u32) -> u32 {
        self.max_attempts_per_email
            .saturating_sub(email_failed)
            .min(self.max_attempts_per_ip.saturating_sub(ip_failed))
    }
}

impl TryFrom<&LockoutConfig> for LockoutPolicy {
    type Error = BastionError;

    fn try_from(config: &LockoutConfig) -> Result<Self, BastionError> {
        config.validate()?;

        Ok(Self {
            max_attempts_per_email: config.max_attempts_per_email,
            max_attempts_per_ip: config.max_attempts_per_ip,
            lockout_duration: seconds("lockout_duration_secs", config.lockout_duration_secs)?,
            attempt_window: seconds("attempt_window_secs", config.attempt_window_secs)?,
        })
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_email: MAX_ATTEMPTS_PER_EMAIL,
            max_attempts_per_ip: MAX_ATTEMPTS_PER_IP,
            lockout_duration: TimeDelta::seconds(LOCKOUT_DURATION_SECS as i64),
            attempt_window: TimeDelta::seconds(ATTEMPT_WINDOW_SECS as i64),
        }
    }
}

fn seconds(field: &str, secs: u64) -> Result<TimeDelta, BastionError> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| BastionError::Config(format!("lockout.{field} is out of range")))
}

/// Login attempt tracking service.
///
/// Every attempt lands in two buckets, one keyed by email and one keyed by
/// client IP, and each dimension is locked independently against its own
/// limit. The `*_at` variants take the current time explicitly.
pub struct LoginTracker {
    policy: LockoutPolicy,
    store: AttemptStore,
}

impl LoginTracker {
    pub fn new(policy: LockoutPolicy, store: AttemptStore) -> Self {
        Self { policy, store }
    }

    /// Name of the storage backend
    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Should a login for `email` from `ip` be refused right now?
    pub async fn check(&self, email: Option<&str>, ip: &str) -> Result<AttemptVerdict> {
        self.check_at(email, ip, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        email: Option<&str>,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<AttemptVerdict> {
        self.sweep_at(now).await?;

        let email_key = email.map(IdentifierKey::email);
        let ip_key = IdentifierKey::ip(ip);

        let email_lock = match &email_key {
            Some(key) => self.store.lockout_until(key, now).await?,
            None => None,
        };
        let ip_lock = self.store.lockout_until(&ip_key, now).await?;

        if let Some(verdict) = lockout_verdict(email_lock, ip_lock) {
            return Ok(verdict);
        }

        let window_start = now - self.policy.attempt_window;
        let email_failed = match &email_key {
            Some(key) => self.store.failed_count(key, window_start).await?,
            None => 0,
        };
        let ip_failed = self.store.failed_count(&ip_key, window_start).await?;

        Ok(AttemptVerdict::Allowed {
            remaining_attempts: self.policy.remaining(email_failed, ip_failed),
        })
    }

    /// Record the outcome of a login attempt
    pub async fn record(
        &self,
        email: &str,
        ip: &str,
        success: bool,
        user_agent: Option<&str>,
    ) -> Result<AttemptVerdict> {
        self.record_at(email, ip, success, user_agent, Utc::now()).await
    }

    pub async fn record_at(
        &self,
        email: &str,
        ip: &str,
        success: bool,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AttemptVerdict> {
        self.sweep_at(now).await?;

        let email_key = IdentifierKey::email(email);
        let ip_key = IdentifierKey::ip(ip);

        let attempt = LoginAttempt {
            email: normalize_email(email),
            ip: ip.to_string(),
            timestamp: now,
            success,
            user_agent: user_agent.map(str::to_string),
        };
        self.store.append(&[&email_key, &ip_key], &attempt).await?;

        if success {
            self.store.reset(&email_key).await?;
            self.store.reset(&ip_key).await?;
            tracing::debug!(email = %email_key, ip = %ip_key, "Successful login, counters reset");
            return Ok(AttemptVerdict::Reset);
        }

        let window_start = now - self.policy.attempt_window;
        let email_failed = self.store.failed_count(&email_key, window_start).await?;
        let ip_failed = self.store.failed_count(&ip_key, window_start).await?;

        if email_failed >= self.policy.max_attempts_per_email {
            return self.lock(&email_key, Dimension::Email, email_failed, now).await;
        }
        if ip_failed >= self.policy.max_attempts_per_ip {
            return self.lock(&ip_key, Dimension::Ip, ip_failed, now).await;
        }

        tracing::debug!(
            email = %email_key,
            ip = %ip_key,
            email_failed,
            ip_failed,
            "Failed login recorded"
        );

        Ok(AttemptVerdict::Allowed {
            remaining_attempts: self.policy.remaining(email_failed, ip_failed),
        })
    }

    async fn lock(
        &self,
        key: &IdentifierKey,
        dimension: Dimension,
        failed_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<AttemptVerdict> {
        let until = now + self.policy.lockout_duration;
        self.store.set_lockout(key, until).await?;

        tracing::warn!(
            identifier = %key,
            dimension = dimension.as_str(),
            failed_attempts,
            until = %until,
            "Identifier locked out after failed login attempts"
        );

        Ok(AttemptVerdict::Locked { until, dimension })
    }

    /// Administrative reset of the email (if given) and the IP
    pub async fn clear(&self, email: Option<&str>, ip: &str) -> Result<()> {
        if let Some(email) = email {
            self.store.reset(&IdentifierKey::email(email)).await?;
        }
        let ip_key = IdentifierKey::ip(ip);
        self.store.reset(&ip_key).await?;

        tracing::info!(ip = %ip_key, email_cleared = email.is_some(), "Lockout cleared");

        Ok(())
    }

    /// Drop attempts outside the window and expired lockouts
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        self.store
            .sweep(now, now - self.policy.attempt_window)
            .await
    }

    pub async fn stats(&self) -> Result<TrackerStats> {
        self.store.stats(Utc::now()).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }
}

/// Email lockout wins the reason; the later expiry wins the deadline
fn lockout_verdict(
    email_lock: Option<DateTime<Utc>>,
    ip_lock: Option<DateTime<Utc>>,
) -> Option<AttemptVerdict> {
    let (until, dimension) = match (email_lock, ip_lock) {
        (Some(email), Some(ip)) => (email.max(ip), Dimension::Email),
        (Some(email), None) => (email, Dimension::Email),
        (None, Some(ip)) => (ip, Dimension::Ip),
        (None, None) => return None,
    };

    Some(AttemptVerdict::Locked { until, dimension })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempts::MemoryStore;
    use chrono::TimeZone;

    fn tracker() -> LoginTracker {
        LoginTracker::new(
            LockoutPolicy::default(),
            AttemptStore::Memory(MemoryStore::new()),
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn minutes(n: i64) -> TimeDelta {
        TimeDelta::minutes(n)
    }

    async fn fail(tracker: &LoginTracker, email: &str, ip: &str, at: DateTime<Utc>) -> AttemptVerdict {
        tracker.record_at(email, ip, false, None, at).await.unwrap()
    }

    #[tokio::test]
    async fn test_fresh_identifier_is_allowed() {
        let tracker = tracker();
        let verdict = tracker.check_at(Some("a@x.com"), "1.2.3.4", t0()).await.unwrap();
        assert_eq!(verdict, AttemptVerdict::Allowed { remaining_attempts: 5 });
    }

    #[tokio::test]
    async fn test_below_limit_stays_unlocked() {
        let tracker = tracker();
        for i in 0..4 {
            let verdict = fail(&tracker, "a@x.com", "1.2.3.4", t0() + minutes(i)).await;
            assert_eq!(verdict, AttemptVerdict::Allowed {
                remaining_attempts: 4 - i as u32,
            });
        }

        let verdict = tracker
            .check_at(Some("a@x.com"), "1.2.3.4", t0() + minutes(5))
            .await
            .unwrap();
        assert_eq!(verdict, AttemptVerdict::Allowed { remaining_attempts: 1 });
    }

    #[tokio::test]
    async fn test_fifth_failure_locks_email() {
        let tracker = tracker();
        for i in 0..4 {
            fail(&tracker, "a@x.com", "1.2.3.4", t0() + minutes(i)).await;
        }

        let locked_at = t0() + minutes(4);
        let verdict = fail(&tracker, "a@x.com", "1.2.3.4", locked_at).await;
        assert_eq!(verdict, AttemptVerdict::Locked {
            until: locked_at + minutes(15),
            dimension: Dimension::Email,
        });

        let verdict = tracker
            .check_at(Some("A@X.com"), "1.2.3.4", locked_at + minutes(1))
            .await
            .unwrap();
        assert_eq!(verdict, AttemptVerdict::Locked {
            until: locked_at + minutes(15),
            dimension: Dimension::Email,
        });
    }

    #[tokio::test]
    async fn test_email_lockout_follows_user_to_new_ip() {
        let tracker = tracker();
        for i in 0..5 {
            fail(&tracker, "a@x.com", "1.2.3.4", t0() + minutes(i)).await;
        }

        let verdict = tracker
            .check_at(Some("a@x.com"), "8.8.8.8", t0() + minutes(6))
            .await
            .unwrap();
        assert!(verdict.is_locked());

        // Other users behind the same IP are unaffected
        let verdict = tracker
            .check_at(Some("b@x.com"), "1.2.3.4", t0() + minutes(6))
            .await
            .unwrap();
        assert_eq!(verdict, AttemptVerdict::Allowed { remaining_attempts: 5 });
    }

    #[tokio::test]
    async fn test_attempts_outside_window_are_ignored() {
        let tracker = tracker();
        for _ in 0..4 {
            fail(&tracker, "a@x.com", "1.2.3.4", t0()).await;
        }

        let verdict = tracker
            .check_at(Some("a@x.com"), "1.2.3.4", t0() + minutes(16))
            .await
            .unwrap();
        assert_eq!(verdict, AttemptVerdict::Allowed { remaining_attempts: 5 });

        // A fifth failure after the window starts a new count
        let verdict = fail(&tracker, "a@x.com", "1.2.3.4", t0() + minutes(16)).await;
        assert_eq!(verdict, AttemptVerdict::Allowed { remaining_attempts: 4 });
    }

    #[tokio::test]
    async fn test_lockout_expires_lazily() {
        let tracker = tracker();
        for _ in 0..5 {
            fail(&tracker, "a@x.com", "1.2.3.4", t0()).await;
        }
        assert_eq!(tracker.stats().await.unwrap().tracked_identifiers, 2);

        let verdict = tracker
            .check_at(Some("a@x.com"), "1.2.3.4", t0() + minutes(16))
            .await
            .unwrap();
        assert_eq!(verdict, AttemptVerdict::Allowed { remaining_attempts: 5 });
    }

    #[tokio::test]
    async fn test_ip_lockout_across_many_emails() {
        let tracker = tracker();
        for i in 0..9 {
            let email = format!("user{i}@x.com");
            let verdict = fail(&tracker, &email, "9.9.9.9", t0() + minutes(1)).await;
            assert!(!verdict.is_locked());
        }

        let verdict = fail(&tracker, "user9@x.com", "9.9.9.9", t0() + minutes(2)).await;
        assert_eq!(verdict, AttemptVerdict::Locked {
            until: t0() + minutes(17),
            dimension: Dimension::Ip,
        });

        let verdict = tracker
            .check_at(Some("someone@else.com"), "9.9.9.9", t0() + minutes(3))
            .await
            .unwrap();
        assert_eq!(verdict, AttemptVerdict::Locked {
            until: t0() + minutes(17),
            dimension: Dimension::Ip,
        });

        // IP lockout applies without an email too
        let verdict = tracker.check_at(None, "9.9.9.9", t0() + minutes(3)).await.unwrap();
        assert!(verdict.is_locked());
    }

    #[tokio::test]
    async fn test_remaining_attempts_capped_by_ip() {
        let tracker = tracker();
        for i in 0..8 {
            fail(&tracker, &format!("user{i}@x.com"), "9.9.9.9", t0()).await;
        }

        let verdict = tracker
            .check_at(Some("fresh@x.com"), "9.9.9.9", t0() + minutes(1))
            .await
            .unwrap();
        assert_eq!(verdict, AttemptVerdict::Allowed { remaining_attempts: 2 });
    }

    #[tokio::test]
    async fn test_email_reason_wins_when_both_locked() {
        let tracker = tracker();
        // Lock the IP first with ten distinct emails
        for i in 0..10 {
            fail(&tracker, &format!("user{i}@x.com"), "9.9.9.9", t0()).await;
        }
        // Then lock a@x.com from another IP, later
        for _ in 0..5 {
            fail(&tracker, "a@x.com", "7.7.7.7", t0() + minutes(5)).await;
        }

        let verdict = tracker
            .check_at(Some("a@x.com"), "9.9.9.9", t0() + minutes(6))
            .await
            .unwrap();
        assert_eq!(verdict, AttemptVerdict::Locked {
            until: t0() + minutes(20),
            dimension: Dimension::Email,
        });
    }

    #[tokio::test]
    async fn test_success_resets_both_dimensions() {
        let tracker = tracker();
        for _ in 0..4 {
            fail(&tracker, "b@x.com", "5.5.5.5", t0()).await;
        }

        let verdict = tracker
            .record_at("b@x.com", "5.5.5.5", true, Some("Mozilla/5.0"), t0() + minutes(1))
            .await
            .unwrap();
        assert_eq!(verdict, AttemptVerdict::Reset);

        let verdict = tracker
            .check_at(Some("b@x.com"), "5.5.5.5", t0() + minutes(1))
            .await
            .unwrap();
        assert_eq!(verdict, AttemptVerdict::Allowed { remaining_attempts: 5 });
        assert_eq!(tracker.stats().await.unwrap(), TrackerStats::default());
    }

    #[tokio::test]
    async fn test_success_lifts_existing_lockout() {
        let tracker = tracker();
        for _ in 0..5 {
            fail(&tracker, "a@x.com", "1.2.3.4", t0()).await;
        }

        tracker
            .record_at("a@x.com", "1.2.3.4", true, None, t0() + minutes(1))
            .await
            .unwrap();

        let verdict = tracker
            .check_at(Some("a@x.com"), "1.2.3.4", t0() + minutes(1))
            .await
            .unwrap();
        assert!(!verdict.is_locked());
    }

    #[tokio::test]
    async fn test_clear_unlocks_immediately() {
        let tracker = tracker();
        for _ in 0..5 {
            fail(&tracker, "a@x.com", "1.2.3.4", t0()).await;
        }

        tracker.clear(Some("a@x.com"), "1.2.3.4").await.unwrap();

        let verdict = tracker
            .check_at(Some("a@x.com"), "1.2.3.4", t0() + minutes(1))
            .await
            .unwrap();
        assert_eq!(verdict, AttemptVerdict::Allowed { remaining_attempts: 5 });
    }

    #[tokio::test]
    async fn test_clear_without_email_keeps_email_lockout() {
        let tracker = tracker();
        for _ in 0..5 {
            fail(&tracker, "a@x.com", "1.2.3.4", t0()).await;
        }

        tracker.clear(None, "1.2.3.4").await.unwrap();
        // Idempotent
        tracker.clear(None, "1.2.3.4").await.unwrap();

        let verdict = tracker
            .check_at(Some("a@x.com"), "1.2.3.4", t0() + minutes(1))
            .await
            .unwrap();
        assert!(verdict.is_locked());
    }

    #[tokio::test]
    async fn test_sweep_report() {
        let tracker = tracker();
        for _ in 0..5 {
            fail(&tracker, "a@x.com", "1.2.3.4", t0()).await;
        }

        let report = tracker.sweep_at(t0() + minutes(16)).await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                attempts_pruned: 10,
                buckets_dropped: 2,
                lockouts_released: 1,
            }
        );
        assert!(tracker.sweep_at(t0() + minutes(17)).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_are_all_counted() {
        const ATTEMPTS: usize = 32;
        let tracker = std::sync::Arc::new(tracker());

        let handles: Vec<_> = (0..ATTEMPTS)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    tracker
                        .record_at("race@x.com", "6.6.6.6", false, None, t0())
                        .await
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let window_start = t0() - minutes(15);
        let email_key = IdentifierKey::email("race@x.com");
        let ip_key = IdentifierKey::ip("6.6.6.6");
        assert_eq!(
            tracker.store.failed_count(&email_key, window_start).await.unwrap(),
            ATTEMPTS as u32
        );
        assert_eq!(
            tracker.store.failed_count(&ip_key, window_start).await.unwrap(),
            ATTEMPTS as u32
        );

        let verdict = tracker
            .check_at(Some("race@x.com"), "6.6.6.6", t0() + minutes(1))
            .await
            .unwrap();
        assert_eq!(verdict, AttemptVerdict::Locked {
            until: t0() + minutes(15),
            dimension: Dimension::Email,
        });
    }

    #[test]
    fn test_policy_rejects_out_of_range_durations() {
        let config = LockoutConfig {
            lockout_duration_secs: u64::MAX,
            ..Default::default()
        };
        assert!(LockoutPolicy::try_from(&config).is_err());

        let config = LockoutConfig {
            attempt_window_secs: 10_000_000_000_000,
            ..Default::default()
        };
        assert!(LockoutPolicy::try_from(&config).is_err());
    }

    #[tokio::test]
    async fn test_longest_allowed_durations_still_lock() {
        let config = LockoutConfig {
            max_attempts_per_email: 1,
            lockout_duration_secs: bastion_common::constants::MAX_DURATION_SECS,
            attempt_window_secs: bastion_common::constants::MAX_DURATION_SECS,
            ..Default::default()
        };
        let tracker = LoginTracker::new(
            LockoutPolicy::try_from(&config).unwrap(),
            AttemptStore::Memory(MemoryStore::new()),
        );

        let verdict = fail(&tracker, "a@x.com", "1.2.3.4", t0()).await;
        assert_eq!(verdict, AttemptVerdict::Locked {
            until: t0() + TimeDelta::days(7),
            dimension: Dimension::Email,
        });
        let verdict = tracker
            .check_at(Some("a@x.com"), "1.2.3.4", t0() + TimeDelta::days(6))
            .await
            .unwrap();
        assert!(verdict.is_locked());
    }

    #[test]
    fn test_remaining_saturates() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.remaining(7, 0), 0);
        assert_eq!(policy.remaining(0, 0), 5);
        assert_eq!(policy.remaining(1, 9), 1);
    }
}
