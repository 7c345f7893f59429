//! Background eviction of idle sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tabula_core::session::registry::SessionRegistry;

/// Longest pause between sweeps.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Sweep period for an idle timeout: half the timeout, capped at a minute.
pub fn sweep_interval(idle_timeout: Duration) -> Duration {
    (idle_timeout / 2).clamp(Duration::from_millis(10), MAX_SWEEP_INTERVAL)
}

/// Spawn a task evicting sessions idle longer than `idle_timeout` until
/// `shutdown` fires.
pub fn spawn_idle_sweeper(
    sessions: Arc<SessionRegistry>,
    idle_timeout: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let period = sweep_interval(idle_timeout);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = sessions.evict_idle(idle_timeout);
                    if !evicted.is_empty() {
                        tracing::info!(count = evicted.len(), live = sessions.len(), "idle sessions evicted");
                    }
                }
            }
        }
        tracing::debug!("idle sweeper stopped");
    })
}
