//! # Security Probe Worker
//!
//! Singleton process probing the dashboard and every gateway for TLS and
//! HTTP header posture.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://... DASHBOARD_URL=https://vpn.example.com \
//!     cargo run --bin security-probe-worker
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
            tracing::error!(error = %format!("{e:#}"), "Security probe worker failed");
            eprintln!("security-probe-worker: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<WorkerExit> {
    run_worker(WorkerRole::SecurityProbe)
        .await
        .context("security probe worker could not start")
}
