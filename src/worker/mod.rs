//! # Worker Processes
//!
//! Lifecycle of a singleton worker: [`runtime`] holds the state machine and
//! the heartbeat/cycle tasks, [`bootstrap`] assembles a production runtime and
//! connects it to process signals.

pub mod bootstrap;
pub mod runtime;

pub use bootstrap::{build_runtime, run_worker, shutdown_signal};
pub use runtime::{RuntimeSettings, WorkerExit, WorkerRuntime, WorkerState};
