//! Signal handling for graceful shutdown.
//!
//! SIGINT and SIGTERM cancel a shared [`CancellationToken`]; every long-running
//! task (log reader, dispatcher, sweeper) holds a clone of the same token.

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Listens for SIGINT and SIGTERM and cancels its token on the first one.
///
/// Dropping the guard stops the listener.
pub struct ShutdownGuard {
    listener: JoinHandle<()>,
}

impl ShutdownGuard {
    /// Start listening for signals. Must be called inside a tokio runtime.
    ///
    /// If signal handlers cannot be registered (e.g., in restricted environments),
    /// the guard is still created but only an explicit cancel stops the daemon.
    pub fn new(token: CancellationToken) -> Self {
        let listener = tokio::spawn(async move {
            let sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("Failed to register SIGINT handler: {}", e);
                    None
                }
            };

            let sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("Failed to register SIGTERM handler: {}", e);
                    None
                }
            };

            match (sigint, sigterm) {
                (Some(mut int), Some(mut term)) => {
                    tokio::select! {
                        _ = int.recv() => info!("Received SIGINT, shutting down"),
                        _ = term.recv() => info!("Received SIGTERM, shutting down"),
                        _ = token.cancelled() => return,
                    }
                }
                (Some(mut int), None) => {
                    tokio::select! {
                        _ = int.recv() => info!("Received SIGINT, shutting down"),
                        _ = token.cancelled() => return,
                    }
                }
                (None, Some(mut term)) => {
                    tokio::select! {
                        _ = term.recv() => info!("Received SIGTERM, shutting down"),
                        _ = token.cancelled() => return,
                    }
                }
                (None, None) => {
                    warn!("No signal handlers registered - graceful shutdown disabled");
                    return;
                }
            }
            token.cancel();
        });

        Self { listener }
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
