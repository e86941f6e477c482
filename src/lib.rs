#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Gatewatch Core
//!
//! Singleton background workers for a VPN management platform.
//!
//! ## Overview
//!
//! Two long-running processes share one PostgreSQL database:
//!
//! - **usage snapshot worker**: pulls cumulative per-key transfer counters
//!   from every active gateway, converts them into deltas and stores them.
//! - **security probe worker**: probes the management dashboard and every
//!   gateway for TLS certificate health and HTTP security headers, and stores
//!   a 0-100 score per target.
//!
//! At most one instance of each role runs at a time. Exclusion comes from a
//! database lease (`worker_locks`) that the holder renews on a heartbeat.
//!
//! ## Module Organization
//!
//! - [`coordination`] - Lease-based singleton lock
//! - [`worker`] - Process lifecycle, heartbeat and graceful shutdown
//! - [`orchestration`] - One collection cycle per role
//! - [`gateway`] - Gateway management API client with certificate pinning
//! - [`probe`] - TLS and HTTP header probes and scoring
//! - [`usage`] - Delta computation and retention
//! - [`resilience`] - Per-target exponential backoff
//! - [`store`] - Persistence seams with PostgreSQL and in-memory backends
//! - [`config`] - YAML configuration with environment overrides
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gatewatch_core::constants::WorkerRole;
//! use gatewatch_core::worker::run_worker;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let exit = run_worker(WorkerRole::UsageSnapshot).await?;
//! std::process::exit(i32::from(exit.exit_code()));
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests against in-memory stores
//! DATABASE_URL=postgresql://... cargo test -- --ignored   # PostgreSQL store tests
//! ```

pub mod config;
pub mod constants;
pub mod coordination;
pub mod database;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod probe;
pub mod resilience;
pub mod store;
pub mod usage;
pub mod worker;

pub use config::{ConfigManager, GatewatchConfig};
pub use constants::WorkerRole;
pub use coordination::LockManager;
pub use error::{GatewatchError, GatewatchResult};
pub use orchestration::{CycleReport, ProbeOrchestrator};
pub use worker::{WorkerExit, WorkerRuntime, WorkerState};
