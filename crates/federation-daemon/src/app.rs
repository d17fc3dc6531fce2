//! Daemon wiring and lifecycle.
//!
//! `run_daemon` assembles the engine: change feed into the store, store
//! events into the dispatcher, dispatcher out through the per-protocol
//! adapters. Shutdown lets in-flight adapter calls finish; whatever was
//! queued but not started is re-driven by the next startup reconciliation.

use std::sync::{Arc, Mutex};

use activitypub_adapter::ActivityProtocolAdapter;
use anyhow::Context;
use atproto_adapter::RepoProtocolAdapter;
use content_event_bridge::FederationEventBridge;
use federation_core::{FederationConfig, Paths, Protocol, ProtocolAdapter};
use federation_dispatch::{DispatcherConfig, SyncDispatcher};
use federation_store::{Database, MappingStatus};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Build one adapter per enabled protocol, validating its endpoint URL
/// first so a malformed config fails at startup, not at the first call.
pub fn build_adapters(config: &FederationConfig) -> anyhow::Result<Vec<Arc<dyn ProtocolAdapter>>> {
    let timeout = config.request_timeout();
    config
        .enabled_protocols
        .iter()
        .map(|protocol| {
            let adapter: Arc<dyn ProtocolAdapter> = match protocol {
                Protocol::RepoProtocol => {
                    config
                        .repo_service_url()
                        .context("Invalid repo-protocol service URL")?;
                    Arc::new(RepoProtocolAdapter::new(&config.repo_protocol, timeout))
                }
                Protocol::ActivityProtocol => {
                    config
                        .activity_base_url()
                        .context("Invalid activity-protocol base URL")?;
                    Arc::new(ActivityProtocolAdapter::new(&config.activity_protocol, timeout))
                }
            };
            Ok(adapter)
        })
        .collect()
}

/// Run the daemon in the foreground until ctrl-c.
pub async fn run_daemon(config: FederationConfig, paths: Paths) -> anyhow::Result<()> {
    paths.ensure_dirs()?;

    let pid = std::process::id();
    std::fs::write(paths.pid_file(), pid.to_string())?;
    info!(pid, base_dir = %paths.base_dir().display(), "Federation daemon starting");

    let (job_tx, job_rx) = mpsc::unbounded_channel();
    let bridge = FederationEventBridge::new(job_tx, config.enabled_protocols.clone());
    let db = Database::open(&paths.database_file(), Arc::new(bridge))
        .context("Failed to open federation database")?;
    db.health_check()
        .context("Federation database failed health check")?;
    let db = Arc::new(Mutex::new(db));
    info!(path = %paths.database_file().display(), "Database opened");

    let adapters = build_adapters(&config)?;
    if adapters.is_empty() {
        warn!("No protocols enabled; content changes will not federate");
    }

    let dispatcher = Arc::new(SyncDispatcher::new(
        DispatcherConfig::from(&config),
        db,
        adapters,
        job_rx,
    ));
    dispatcher.start();

    // Crash recovery: work accepted but never confirmed in a previous run
    // goes back on the queue before new change events arrive.
    let requeued = dispatcher.reconcile_pending()?;
    info!(requeued, "Startup reconciliation complete");

    let resweep_task = spawn_resweep_schedule(&config, dispatcher.clone());

    info!("Federation daemon running");
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, stopping");

    if let Some(task) = resweep_task {
        task.abort();
    }
    dispatcher.shutdown().await;

    let _ = std::fs::remove_file(paths.pid_file());
    info!("Federation daemon stopped");
    Ok(())
}

/// Periodically re-drives failed mappings. Returns `None` when the interval
/// is configured to zero.
fn spawn_resweep_schedule(
    config: &FederationConfig,
    dispatcher: Arc<SyncDispatcher>,
) -> Option<tokio::task::JoinHandle<()>> {
    let interval = config.resweep_interval()?;
    info!(
        interval_secs = interval.as_secs(),
        "Scheduled failed-mapping resweep enabled"
    );
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately and would race the startup
        // reconciliation; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match dispatcher.resweep(MappingStatus::Failed) {
                Ok(0) => {}
                Ok(count) => info!(count, "Scheduled resweep re-queued failed mappings"),
                Err(err) => error!(error = %err, "Scheduled resweep failed"),
            }
        }
    }))
}
