//! Run command: the daemon.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::banisher::Banisher;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::filter::{check_root, create_filter};
use crate::lock::LockGuard;
use crate::signal::ShutdownGuard;
use crate::source::{preflight, LogSource};
use crate::store::{Persistence, RedbBanStore};
use crate::sweeper::spawn_sweeper;

/// Run the daemon until the log source ends or a signal arrives.
pub async fn run(config_path: &Path, db: &Path, source: LogSource) -> Result<()> {
    check_root()?;
    preflight(&source)?;

    info!("Starting the Banisher v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(config_path).context("Failed to load config")?;
    let settings = config.compile()?;

    let _lock = LockGuard::acquire()?;

    let persistence = Persistence::from_arg(db);
    let store = RedbBanStore::open_with(&persistence)
        .with_context(|| format!("Failed to open ban database {}", db.display()))?;
    let filter = create_filter(settings.backend).context("Failed to set up the packet filter")?;

    info!(
        "Using {} packet filter, {} ban store, {} rule(s), {} whitelist entrie(s)",
        filter.name(),
        if matches!(persistence, Persistence::Durable(_)) { "durable" } else { "in-memory" },
        settings.matcher.rules().len(),
        settings.whitelist.len()
    );

    let engine = Arc::new(Banisher::new(
        filter,
        Box::new(store),
        settings.whitelist,
        settings.engine,
    ));

    let restoring = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || restoring.restore())
        .await
        .context("Restore task failed")?
        .context("Failed to restore bans")?;

    let shutdown = CancellationToken::new();
    let _signals = ShutdownGuard::new(shutdown.clone());
    let sweeper = spawn_sweeper(Arc::clone(&engine), settings.engine.sweep_interval, shutdown.clone());
    let dispatcher = Dispatcher::spawn(Arc::clone(&engine), settings.matcher, settings.dispatch);

    let followed = source.follow(&dispatcher, &shutdown).await;
    match &followed {
        Ok(lines) if !shutdown.is_cancelled() => warn!("Log source {} ended after {} line(s)", source, lines),
        Ok(lines) => info!("Processed {} log line(s)", lines),
        Err(e) => error!("Log source {} failed: {:#}", source, e),
    }

    shutdown.cancel();
    dispatcher.shutdown().await;
    if let Err(e) = sweeper.await {
        error!("Sweeper task failed: {}", e);
    }

    info!("Exiting the Banisher");
    let clearing = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || clearing.clear())
        .await
        .context("Clear task failed")?
        .context("Failed to remove the packet filter")?;

    followed.map(|_| ())
}
