//! Periodic expiry of bans.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::banisher::Banisher;
use tokio_util::sync::CancellationToken;

/// Sweep the engine every `interval` until `shutdown` is cancelled.
///
/// The first sweep runs immediately, lifting bans that expired while the
/// daemon was stopped. A failed scan skips the cycle; the next tick retries.
pub fn spawn_sweeper(engine: Arc<Banisher>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let engine = Arc::clone(&engine);
            match tokio::task::spawn_blocking(move || engine.sweep_now()).await {
                Ok(Ok(report)) if report.removed > 0 || report.failed > 0 => {
                    info!("Lifted {} expired ban(s), {} failed", report.removed, report.failed);
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("Skipping ban sweep: {}", e),
                Err(e) => error!("Ban sweep task panicked: {}", e),
            }
        }
        debug!("Sweeper stopped");
    })
}
