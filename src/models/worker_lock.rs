use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lease row guarding a singleton worker role
/// Maps to `worker_locks` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct WorkerLock {
    /// Fixed lock name, one row per worker role
    pub id: String,
    /// Process instance currently holding the lease
    pub worker_id: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
}

impl WorkerLock {
    /// Build a fresh lease for `worker_id` starting at `now`
    pub fn new_lease(
        id: impl Into<String>,
        worker_id: impl Into<String>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            worker_id: worker_id.into(),
            locked_at: now,
            expires_at,
            heartbeat_at: now,
        }
    }

    /// An expired row is an orphan left behind by a crashed holder
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
