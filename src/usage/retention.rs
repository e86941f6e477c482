//! Deterministic snapshot retention: due on the first check, then once per
//! cleanup interval.

use crate::config::RetentionConfig;
use crate::error::GatewatchResult;
use crate::store::TelemetryStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

#[derive(Debug)]
pub struct RetentionSchedule {
    retention: chrono::Duration,
    interval: Duration,
    last_run: Mutex<Option<Instant>>,
}

impl RetentionSchedule {
    pub fn new(retention_days: i64, interval: Duration) -> Self {
        Self {
            retention: chrono::Duration::days(retention_days),
            interval,
            last_run: Mutex::new(None),
        }
    }

    pub fn from_config(config: &RetentionConfig) -> Self {
        Self::new(config.snapshot_retention_days, config.cleanup_interval())
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match *self.last_run.lock() {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        }
    }

    /// Snapshots created before this instant are deleted
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.retention
    }

    /// Delete expired snapshots if due; `None` when not due
    pub async fn run_if_due(
        &self,
        store: &dyn TelemetryStore,
        now: Instant,
        wall_clock: DateTime<Utc>,
    ) -> GatewatchResult<Option<u64>> {
        if !self.is_due(now) {
            return Ok(None);
        }

        let cutoff = self.cutoff(wall_clock);
        let deleted = store.delete_usage_snapshots_before(cutoff).await?;
        *self.last_run.lock() = Some(now);

        info!(
            deleted,
            cutoff = %cutoff,
            "Usage snapshot retention cleanup complete"
        );
        Ok(Some(deleted))
    }
}
