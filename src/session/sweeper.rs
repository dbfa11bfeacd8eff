//! Periodic idle-session eviction

use super::{SessionStore, SweepPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Run `sweep` every `interval` until `cancel` fires.
///
/// The first sweep happens one full interval after start.
pub fn spawn_sweeper(
    store: Arc<dyn SessionStore>,
    policy: SweepPolicy,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = store.sweep(&policy).await;
                    if report.evicted() > 0 {
                        tracing::info!(
                            idle_evicted = report.idle_evicted,
                            overflow_evicted = report.overflow_evicted,
                            skipped_busy = report.skipped_busy,
                            remaining = report.remaining,
                            "Session sweep evicted sessions"
                        );
                    } else {
                        tracing::debug!(
                            remaining = report.remaining,
                            "Session sweep found nothing to evict"
                        );
                    }
                }
            }
        }

        tracing::info!("Session sweeper stopped");
    })
}
