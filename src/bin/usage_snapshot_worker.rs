//! # Usage Snapshot Worker
//!
//! Singleton process collecting per-key transfer deltas from every gateway.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://... cargo run --bin usage-snapshot-worker
//!
//! # With production defaults and JSON file logs
//! GATEWATCH_ENV=production GATEWATCH_LOG_DIR=/var/log/gatewatch usage-snapshot-worker
//! ```
//!
//! Exits 0 when stopped by a signal or when another instance holds the lock,
//! 1 when the lock is lost or startup fails.

use anyhow::Context;
use gatewatch_core::constants::WorkerRole;
use gatewatch_core::worker::{run_worker, WorkerExit};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(exit) => exit.into(),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Usage snapshot worker failed");
            eprintln!("usage-snapshot-worker: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<WorkerExit> {
    run_worker(WorkerRole::UsageSnapshot)
        .await
        .context("usage snapshot worker could not start")
}
