//! Bounded ban dispatch.
//!
//! Log lines are matched on the reader's task. Detections go through a
//! bounded queue to a single dispatcher task, which runs at most `workers`
//! engine calls at once on the blocking pool. A full queue makes
//! [`Dispatcher::consume`] wait, which slows the log reader down instead of
//! dropping detections or spawning unbounded work.

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn};

use crate::banisher::{AddOutcome, Banisher};
use crate::config::DispatchConfig;
use crate::rules::{Detection, RuleMatcher};

/// Line sink feeding the Banishment Engine.
pub struct Dispatcher {
    matcher: RuleMatcher,
    queue: mpsc::Sender<Detection>,
    worker: JoinHandle<()>,
}

impl Dispatcher {
    /// Start the dispatcher task. Must be called inside a tokio runtime.
    pub fn spawn(engine: Arc<Banisher>, matcher: RuleMatcher, config: DispatchConfig) -> Self {
        let (queue, pending) = mpsc::channel(config.queue_capacity.max(1));
        let worker = tokio::spawn(dispatch(engine, pending, config.workers.max(1)));
        Self {
            matcher,
            queue,
            worker,
        }
    }

    /// Feed one raw log line. Errors never reach the caller.
    pub async fn consume(&self, line: &[u8]) {
        let Some(detection) = self.matcher.evaluate_bytes(line) else {
            return;
        };
        if self.queue.send(detection).await.is_err() {
            error!("Ban dispatcher has stopped, dropping detection");
        }
    }

    /// Stop accepting lines, process everything queued, and wait for
    /// in-flight bans to finish.
    pub async fn shutdown(self) {
        drop(self.queue);
        if let Err(e) = self.worker.await {
            error!("Ban dispatcher task failed: {}", e);
        }
    }
}

async fn dispatch(engine: Arc<Banisher>, mut pending: mpsc::Receiver<Detection>, workers: usize) {
    let permits = Arc::new(Semaphore::new(workers));
    let mut in_flight = JoinSet::new();

    while let Some(detection) = pending.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let engine = Arc::clone(&engine);
        in_flight.spawn_blocking(move || {
            let _permit = permit;
            ban(&engine, &detection);
        });

        while let Some(result) = in_flight.try_join_next() {
            report_panic(result);
        }
    }

    while let Some(result) = in_flight.join_next().await {
        report_panic(result);
    }
    debug!("Ban dispatcher drained");
}

fn ban(engine: &Banisher, detection: &Detection) {
    match engine.add(&detection.address, &detection.rule) {
        Ok(AddOutcome::Banned { .. }) => {}
        Ok(outcome) => debug!(rule = %detection.rule, "{}: {:?}", detection.address, outcome),
        Err(e) if e.left_orphan_block() => {
            error!(rule = %detection.rule, "Failed to ban {}: {}", detection.address, e)
        }
        Err(e) => warn!(rule = %detection.rule, "Failed to ban {}: {}", detection.address, e),
    }
}

fn report_panic(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!("Ban worker panicked: {}", e);
    }
}
