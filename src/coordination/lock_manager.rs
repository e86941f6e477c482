//! # Worker Lease Lock
//!
//! One row per worker role guards the singleton. The row is a lease:
//!
//! - **acquire**: insert-or-fail; if the row exists and has expired, take it
//!   over with a conditional update (the normal crash-recovery path)
//! - **renew**: extend `expires_at` only while `worker_id` still matches; zero
//!   affected rows means a rival took the lease and this process must stop
//! - **release**: delete only our own row; safe to repeat
//!
//! Every mutation is a single conditional statement in the store, so no
//! application-level locking is involved.

use crate::error::{GatewatchError, GatewatchResult};
use crate::models::WorkerLock;
use crate::store::LockStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Process instance identifier: `{hostname}-{pid}-{uuid}`
pub fn generate_worker_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown-host".to_string());
    format!("{host}-{}-{}", std::process::id(), Uuid::new_v4())
}

pub struct LockManager {
    store: Arc<dyn LockStore>,
    lock_id: String,
    worker_id: String,
    ttl: chrono::Duration,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("lock_id", &self.lock_id)
            .field("worker_id", &self.worker_id)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl LockManager {
    pub fn new(
        store: Arc<dyn LockStore>,
        lock_id: impl Into<String>,
        worker_id: impl Into<String>,
        ttl: Duration,
    ) -> GatewatchResult<Self> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| GatewatchError::ValidationError(format!("Invalid lock TTL: {e}")))?;
        if ttl <= chrono::Duration::zero() {
            return Err(GatewatchError::ValidationError(
                "Lock TTL must be positive".to_string(),
            ));
        }

        Ok(Self {
            store,
            lock_id: lock_id.into(),
            worker_id: worker_id.into(),
            ttl,
        })
    }

    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Try to become the holder. `Ok(false)` means a live holder exists.
    #[instrument(skip(self), fields(lock_id = %self.lock_id, worker_id = %self.worker_id))]
    pub async fn acquire(&self) -> GatewatchResult<bool> {
        // Second pass covers a holder releasing between our insert and read
        for _ in 0..2 {
            let now = Utc::now();
            let expires_at = now + self.ttl;

            let lease = WorkerLock::new_lease(&self.lock_id, &self.worker_id, now, expires_at);
            if self.store.insert_if_absent(&lease).await? {
                info!(expires_at = %expires_at, "Worker lock acquired");
                return Ok(true);
            }

            let Some(existing) = self.store.find(&self.lock_id).await? else {
                debug!("Lock row vanished after insert conflict, retrying");
                continue;
            };

            if existing.worker_id == self.worker_id {
                return self.renew().await;
            }

            if !existing.is_expired_at(now) {
                info!(
                    holder = %existing.worker_id,
                    expires_at = %existing.expires_at,
                    "Worker lock held by another instance"
                );
                return Ok(false);
            }

            let taken = self
                .store
                .take_over_expired(&self.lock_id, &self.worker_id, now, expires_at)
                .await?;
            if taken {
                info!(
                    previous_holder = %existing.worker_id,
                    expired_at = %existing.expires_at,
                    "Took over expired worker lock"
                );
            } else {
                info!("Another instance took over the expired lock first");
            }
            return Ok(taken);
        }

        Ok(false)
    }

    /// Extend the lease. `Ok(false)` means the lock was lost.
    #[instrument(skip(self), fields(lock_id = %self.lock_id, worker_id = %self.worker_id))]
    pub async fn renew(&self) -> GatewatchResult<bool> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let renewed = self
            .store
            .renew(&self.lock_id, &self.worker_id, now, expires_at)
            .await?;

        if renewed {
            debug!(expires_at = %expires_at, "Worker lock renewed");
        } else {
            warn!("Worker lock renewal matched no row, lock lost");
        }
        Ok(renewed)
    }

    /// Delete our row if we still hold it
    #[instrument(skip(self), fields(lock_id = %self.lock_id, worker_id = %self.worker_id))]
    pub async fn release(&self) -> GatewatchResult<()> {
        if self.store.delete(&self.lock_id, &self.worker_id).await? {
            info!("Worker lock released");
        } else {
            debug!("Worker lock already released or held by another instance");
        }
        Ok(())
    }
}
