//! # Data Models
//!
//! Rows the workers read (servers, access keys) and write (lock lease, usage
//! snapshots, probe results).

pub mod security_probe;
pub mod server;
pub mod usage_snapshot;
pub mod worker_lock;

pub use security_probe::{DashboardSecurityProbe, ProbeResult, Scheme, SecurityProbe};
pub use server::{AccessKey, Server};
pub use usage_snapshot::{KeyType, NewUsageSnapshot, UsageSnapshot};
pub use worker_lock::WorkerLock;
