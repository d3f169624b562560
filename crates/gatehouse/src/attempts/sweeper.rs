//! Periodic cleanup of abandoned attempt buckets.
//!
//! `check` and `record` already sweep on every call; this worker bounds memory
//! for identifiers that never come back.

use std::sync::Arc;
use std::time::Duration;

use super::tracker::LoginTracker;

/// Background worker sweeping the tracker every `interval`
pub async fn sweeper_worker(
    tracker: Arc<LoginTracker>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        backend = tracker.backend(),
        "🧹 Sweeper started"
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                run_sweep(&tracker).await;
            }
            _ = shutdown.recv() => {
                tracing::info!("🧹 Sweeper shutting down...");
                break;
            }
        }
    }
}

async fn run_sweep(tracker: &LoginTracker) {
    match tracker.sweep().await {
        Ok(report) if report.is_empty() => {
            tracing::debug!("Sweep found nothing to prune");
        }
        Ok(report) => {
            tracing::info!(
                attempts_pruned = report.attempts_pruned,
                buckets_dropped = report.buckets_dropped,
                lockouts_released = report.lockouts_released,
                "Sweep complete"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Sweep failed");
        }
    }
}
