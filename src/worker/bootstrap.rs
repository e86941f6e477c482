//! # Worker Bootstrap
//!
//! Wires configuration, the database pool, network clients, the lock and the
//! orchestrator into a [`WorkerRuntime`] for one role, then runs it until a
//! termination signal arrives.

use crate::config::{ConfigManager, GatewatchConfig};
use crate::constants::WorkerRole;
use crate::coordination::{generate_worker_id, LockManager};
use crate::database::{DatabaseConnection, DatabaseMigrations};
use crate::error::{GatewatchError, GatewatchResult};
use crate::gateway::HttpGatewayMetricsClient;
use crate::logging;
use crate::orchestration::{OrchestratorDeps, OrchestratorSettings, ProbeOrchestrator};
use crate::probe::NetworkProber;
use crate::resilience::BackoffTracker;
use crate::store::PgStore;
use crate::usage::RetentionSchedule;
use crate::worker::runtime::{RuntimeSettings, WorkerExit, WorkerRuntime};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

impl RuntimeSettings {
    pub fn from_config(config: &GatewatchConfig, role: WorkerRole) -> Self {
        Self {
            heartbeat_interval: config.lock.heartbeat_interval(),
            cycle_interval: config.cycle_for(role).cycle_interval(),
            lock_ttl: config.lock.ttl(),
            drain_timeout: config.shutdown.drain_timeout(),
        }
    }
}

/// Build a runtime for `role` against PostgreSQL and the real network
pub async fn build_runtime(
    role: WorkerRole,
    config: &GatewatchConfig,
) -> GatewatchResult<WorkerRuntime> {
    let db = DatabaseConnection::connect(&config.database).await?;
    if !db.health_check().await? {
        return Err(GatewatchError::DatabaseError(
            "Database health check returned an unexpected value".to_string(),
        ));
    }
    if config.database.run_migrations {
        DatabaseMigrations::run_all(db.pool()).await?;
    }
    let store = Arc::new(PgStore::new(db.pool().clone()));

    let deps = OrchestratorDeps {
        directory: store.clone(),
        telemetry: store.clone(),
        prober: Arc::new(NetworkProber::new(config.probe.expiring_threshold_days)?),
        metrics: Arc::new(HttpGatewayMetricsClient::new(config.probe.connect_timeout())),
    };
    let orchestrator = ProbeOrchestrator::new(
        role,
        OrchestratorSettings::from_config(config, role),
        deps,
        Arc::new(BackoffTracker::from_config(&config.backoff)),
        RetentionSchedule::from_config(&config.retention),
    );

    let worker_id = generate_worker_id();
    let lock = LockManager::new(store, role.lock_id(), worker_id.as_str(), config.lock.ttl())?;

    info!(
        role = %role,
        worker_id = %worker_id,
        ttl_seconds = config.lock.ttl_seconds,
        heartbeat_seconds = config.lock.heartbeat_interval_seconds,
        cycle_seconds = config.cycle_for(role).cycle_interval_seconds,
        "Worker runtime assembled"
    );

    Ok(WorkerRuntime::new(
        Arc::new(lock),
        Arc::new(orchestrator),
        RuntimeSettings::from_config(config, role),
    ))
}

/// Full process entry point for a worker binary
pub async fn run_worker(role: WorkerRole) -> GatewatchResult<WorkerExit> {
    logging::init_structured_logging();

    info!(
        role = %role,
        version = env!("CARGO_PKG_VERSION"),
        "Starting gatewatch worker"
    );

    let manager = ConfigManager::load_or_default()?;
    let config = manager.config();

    let runtime = build_runtime(role, config).await?;
    let shutdown = runtime.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, draining");
        shutdown.cancel();
    });

    let exit = runtime.run().await?;
    info!(role = %role, exit = ?exit, "Worker stopped");
    Ok(exit)
}

/// Wait for Ctrl+C or SIGTERM. A handler that cannot be installed never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
