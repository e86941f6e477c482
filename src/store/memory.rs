//! In-process store with the same conditional semantics as [`super::PgStore`].
//!
//! Every operation runs under one mutex, which gives the insert-or-fail and
//! update-where-matching guarantees the lock protocol depends on. Used by the
//! test suites and for dry runs without a database.

use super::{LockStore, ServerDirectory, TelemetryStore};
use crate::error::{GatewatchError, GatewatchResult};
use crate::models::{
    AccessKey, DashboardSecurityProbe, KeyType, NewUsageSnapshot, SecurityProbe, Server,
    UsageSnapshot, WorkerLock,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct MemoryState {
    locks: HashMap<String, WorkerLock>,
    servers: Vec<Server>,
    access_keys: Vec<AccessKey>,
    snapshots: Vec<UsageSnapshot>,
    next_snapshot_id: i64,
    security_probes: HashMap<String, SecurityProbe>,
    dashboard_probe: Option<DashboardSecurityProbe>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    lock_store_unavailable: AtomicBool,
    telemetry_unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_server(&self, server: Server) {
        self.state.lock().servers.push(server);
    }

    pub fn add_access_key(&self, key: AccessKey) {
        self.state.lock().access_keys.push(key);
    }

    pub fn set_server_active(&self, server_id: &str, active: bool) {
        let mut state = self.state.lock();
        if let Some(server) = state.servers.iter_mut().find(|s| s.id == server_id) {
            server.is_active = active;
        }
    }

    /// Overwrite a lock row, e.g. to simulate a crashed holder or a rival takeover
    pub fn put_lock(&self, lock: WorkerLock) {
        self.state.lock().locks.insert(lock.id.clone(), lock);
    }

    pub fn lock_row(&self, id: &str) -> Option<WorkerLock> {
        self.state.lock().locks.get(id).cloned()
    }

    /// Insert a snapshot with an explicit creation time
    pub fn insert_snapshot_at(&self, row: NewUsageSnapshot, created_at: DateTime<Utc>) {
        let mut state = self.state.lock();
        push_snapshot(&mut state, row, created_at);
    }

    pub fn usage_snapshots(&self) -> Vec<UsageSnapshot> {
        self.state.lock().snapshots.clone()
    }

    pub fn security_probe(&self, server_id: &str) -> Option<SecurityProbe> {
        self.state.lock().security_probes.get(server_id).cloned()
    }

    pub fn security_probe_count(&self) -> usize {
        self.state.lock().security_probes.len()
    }

    pub fn dashboard_probe(&self) -> Option<DashboardSecurityProbe> {
        self.state.lock().dashboard_probe.clone()
    }

    /// Make every lock operation fail, as a lost database connection would
    pub fn set_lock_store_unavailable(&self, unavailable: bool) {
        self.lock_store_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every telemetry write fail
    pub fn set_telemetry_unavailable(&self, unavailable: bool) {
        self.telemetry_unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_lock_store(&self) -> GatewatchResult<()> {
        if self.lock_store_unavailable.load(Ordering::SeqCst) {
            return Err(GatewatchError::DatabaseError(
                "lock store unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn check_telemetry(&self) -> GatewatchResult<()> {
        if self.telemetry_unavailable.load(Ordering::SeqCst) {
            return Err(GatewatchError::DatabaseError(
                "telemetry store unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

fn push_snapshot(state: &mut MemoryState, row: NewUsageSnapshot, created_at: DateTime<Utc>) {
    state.next_snapshot_id += 1;
    let id = state.next_snapshot_id;
    state.snapshots.push(UsageSnapshot {
        id,
        server_id: row.server_id,
        key_id: row.key_id,
        key_type: row.key_type,
        used_bytes: row.used_bytes,
        delta_bytes: row.delta_bytes,
        created_at,
    });
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn insert_if_absent(&self, lock: &WorkerLock) -> GatewatchResult<bool> {
        self.check_lock_store()?;
        let mut state = self.state.lock();
        if state.locks.contains_key(&lock.id) {
            return Ok(false);
        }
        state.locks.insert(lock.id.clone(), lock.clone());
        Ok(true)
    }

    async fn find(&self, id: &str) -> GatewatchResult<Option<WorkerLock>> {
        self.check_lock_store()?;
        Ok(self.state.lock().locks.get(id).cloned())
    }

    async fn take_over_expired(
        &self,
        id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> GatewatchResult<bool> {
        self.check_lock_store()?;
        let mut state = self.state.lock();
        match state.locks.get_mut(id) {
            Some(lock) if lock.is_expired_at(now) => {
                lock.worker_id = worker_id.to_string();
                lock.locked_at = now;
                lock.heartbeat_at = now;
                lock.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn renew(
        &self,
        id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> GatewatchResult<bool> {
        self.check_lock_store()?;
        let mut state = self.state.lock();
        match state.locks.get_mut(id) {
            Some(lock) if lock.worker_id == worker_id => {
                lock.heartbeat_at = now;
                lock.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: &str, worker_id: &str) -> GatewatchResult<bool> {
        self.check_lock_store()?;
        let mut state = self.state.lock();
        let held = state
            .locks
            .get(id)
            .is_some_and(|lock| lock.worker_id == worker_id);
        if held {
            state.locks.remove(id);
        }
        Ok(held)
    }
}

#[async_trait]
impl ServerDirectory for MemoryStore {
    async fn list_active_servers(&self) -> GatewatchResult<Vec<Server>> {
        let mut servers: Vec<Server> = self
            .state
            .lock()
            .servers
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        servers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(servers)
    }

    async fn list_access_keys(&self, server_id: &str) -> GatewatchResult<Vec<AccessKey>> {
        Ok(self
            .state
            .lock()
            .access_keys
            .iter()
            .filter(|k| k.server_id == server_id)
            .cloned()
            .collect())
    }

    async fn list_dynamic_key_members(&self) -> GatewatchResult<Vec<AccessKey>> {
        let state = self.state.lock();
        Ok(state
            .access_keys
            .iter()
            .filter(|k| k.dynamic_key_id.is_some())
            .filter(|k| {
                state
                    .servers
                    .iter()
                    .any(|s| s.id == k.server_id && s.is_active)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn latest_used_bytes(
        &self,
        key_type: KeyType,
        key_ids: &[String],
    ) -> GatewatchResult<HashMap<String, i64>> {
        let state = self.state.lock();
        let mut latest: HashMap<String, (DateTime<Utc>, i64, i64)> = HashMap::new();
        for snapshot in state
            .snapshots
            .iter()
            .filter(|s| s.key_type == key_type && key_ids.contains(&s.key_id))
        {
            let candidate = (snapshot.created_at, snapshot.id, snapshot.used_bytes);
            latest
                .entry(snapshot.key_id.clone())
                .and_modify(|current| {
                    if (candidate.0, candidate.1) > (current.0, current.1) {
                        *current = candidate;
                    }
                })
                .or_insert(candidate);
        }
        Ok(latest
            .into_iter()
            .map(|(key, (_, _, used))| (key, used))
            .collect())
    }

    async fn insert_usage_snapshots(&self, rows: &[NewUsageSnapshot]) -> GatewatchResult<u64> {
        self.check_telemetry()?;
        let now = Utc::now();
        let mut state = self.state.lock();
        for row in rows {
            push_snapshot(&mut state, row.clone(), now);
        }
        Ok(rows.len() as u64)
    }

    async fn upsert_security_probe(&self, probe: &SecurityProbe) -> GatewatchResult<()> {
        self.check_telemetry()?;
        self.state
            .lock()
            .security_probes
            .insert(probe.server_id.clone(), probe.clone());
        Ok(())
    }

    async fn upsert_dashboard_probe(&self, probe: &DashboardSecurityProbe) -> GatewatchResult<()> {
        self.check_telemetry()?;
        self.state.lock().dashboard_probe = Some(probe.clone());
        Ok(())
    }

    async fn delete_usage_snapshots_before(&self, cutoff: DateTime<Utc>) -> GatewatchResult<u64> {
        self.check_telemetry()?;
        let mut state = self.state.lock();
        let before = state.snapshots.len();
        state.snapshots.retain(|s| s.created_at >= cutoff);
        Ok((before - state.snapshots.len()) as u64)
    }
}
