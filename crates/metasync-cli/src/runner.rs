//! Refresh cycle runner.

use std::sync::Arc;
use std::time::Duration;

use metasync_core::{
    AuditLogger, CatalogSnapshot, CycleReport, ReconciliationOrchestrator,
    SledTargetStore, SnapshotSource, TracingAuditLogger,
};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::error::Error;

type Orchestrator = ReconciliationOrchestrator<SnapshotSource, SledTargetStore>;

/// Runs refresh cycles from a snapshot file into a sled repository.
#[derive(Clone)]
pub struct Runner {
    orchestrator: Arc<Orchestrator>,
}

impl Runner {
    /// Open the repository and check that the snapshot is readable.
    pub fn open(config: &RunConfig) -> Result<Self, Error> {
        Self::with_audit(config, Arc::new(TracingAuditLogger))
    }

    /// Open with a specific audit logger.
    pub fn with_audit(config: &RunConfig, audit: Arc<dyn AuditLogger>) -> Result<Self, Error> {
        let snapshot = CatalogSnapshot::load(&config.snapshot_path)?;
        info!(
            path = %config.snapshot_path.display(),
            databases = snapshot.databases.len(),
            "snapshot readable"
        );

        let store = SledTargetStore::open(&config.repository_path)?;
        info!(
            path = %config.repository_path.display(),
            records = store.len(),
            relationships = store.relationship_count(),
            "repository opened"
        );

        let orchestrator = ReconciliationOrchestrator::new(
            SnapshotSource::new(config.snapshot_path.clone()),
            store,
            audit,
        )
        .with_config(config.sync.clone());

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
        })
    }

    /// The repository being written.
    pub fn store(&self) -> &SledTargetStore {
        self.orchestrator.target()
    }

    /// Run one cycle on the blocking pool and flush the repository.
    pub async fn run_once(&self) -> Result<CycleReport, Error> {
        let orchestrator = self.orchestrator.clone();
        let report = tokio::task::spawn_blocking(move || orchestrator.refresh()).await??;
        self.store().flush()?;
        Ok(report)
    }
}

/// Handle for scheduled refresh cycles.
pub struct SyncTask {
    handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

impl SyncTask {
    /// Start running a cycle every `interval`, the first one immediately.
    pub fn start(runner: Runner, interval: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let shutdown_clone = shutdown.clone();

        let handle = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "scheduled refresh started");

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_clone.notified() => {
                        info!("scheduled refresh stopping");
                        break;
                    }
                }

                // Runs to completion even if stop is requested meanwhile.
                match runner.run_once().await {
                    Ok(report) if !report.is_clean() => {
                        warn!(
                            cycle = %report.cycle_id,
                            errors = report.error_count(),
                            "cycle completed with errors"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "cycle failed"),
                }
            }
        });

        Self { handle, shutdown }
    }

    /// Signal the task to stop after the current cycle.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// Stop the task and wait for the current cycle to finish.
    pub async fn join(self) {
        self.stop();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "refresh task panicked");
        }
    }
}
