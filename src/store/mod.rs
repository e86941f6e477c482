//! # Persistence Seams
//!
//! The workers need three narrow capabilities from storage:
//!
//! - [`LockStore`]: unique-constrained insert plus update-where-matching with an
//!   affected-row answer, which is all lease-based mutual exclusion requires
//! - [`ServerDirectory`]: read-only view of servers and their keys
//! - [`TelemetryStore`]: append-only usage snapshots and last-write-wins probe rows
//!
//! [`PgStore`] implements all three against PostgreSQL; [`MemoryStore`] keeps
//! the same semantics in process for tests and dry runs.

pub mod memory;
pub mod postgres;

use crate::error::GatewatchResult;
use crate::models::{
    AccessKey, DashboardSecurityProbe, KeyType, NewUsageSnapshot, SecurityProbe, Server,
    WorkerLock,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait LockStore: Send + Sync {
    /// Insert `lock` unless a row with its id exists; true if inserted
    async fn insert_if_absent(&self, lock: &WorkerLock) -> GatewatchResult<bool>;

    async fn find(&self, id: &str) -> GatewatchResult<Option<WorkerLock>>;

    /// Reassign the row to `worker_id` only if it has expired at `now`
    async fn take_over_expired(
        &self,
        id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> GatewatchResult<bool>;

    /// Extend the lease only if `worker_id` still holds the row
    async fn renew(
        &self,
        id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> GatewatchResult<bool>;

    /// Delete the row only if `worker_id` holds it
    async fn delete(&self, id: &str, worker_id: &str) -> GatewatchResult<bool>;
}

#[async_trait]
pub trait ServerDirectory: Send + Sync {
    async fn list_active_servers(&self) -> GatewatchResult<Vec<Server>>;

    async fn list_access_keys(&self, server_id: &str) -> GatewatchResult<Vec<AccessKey>>;

    /// Access keys on active servers that belong to a dynamic key
    async fn list_dynamic_key_members(&self) -> GatewatchResult<Vec<AccessKey>>;
}

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Most recent `used_bytes` per key id; keys without snapshots are absent
    async fn latest_used_bytes(
        &self,
        key_type: KeyType,
        key_ids: &[String],
    ) -> GatewatchResult<HashMap<String, i64>>;

    /// Insert all rows atomically; returns the number written
    async fn insert_usage_snapshots(&self, rows: &[NewUsageSnapshot]) -> GatewatchResult<u64>;

    async fn upsert_security_probe(&self, probe: &SecurityProbe) -> GatewatchResult<()>;

    async fn upsert_dashboard_probe(&self, probe: &DashboardSecurityProbe) -> GatewatchResult<()>;

    async fn delete_usage_snapshots_before(&self, cutoff: DateTime<Utc>) -> GatewatchResult<u64>;
}
