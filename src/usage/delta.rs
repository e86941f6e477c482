//! # Usage Deltas
//!
//! Gateways report cumulative counters. A snapshot stores the counter and the
//! increase since the previous snapshot of the same key. A counter that went
//! down (reset, recreated key, remote clock trouble) yields a zero delta, so
//! a reset under-counts instead of inflating usage.

use crate::error::GatewatchResult;
use crate::models::{KeyType, NewUsageSnapshot};
use crate::store::TelemetryStore;
use std::sync::Arc;
use tracing::debug;

/// Non-negative increase from `previous` to `current`
pub fn compute_delta(previous: i64, current: i64) -> i64 {
    if current > previous {
        current - previous
    } else {
        0
    }
}

/// Turns fresh counters into snapshot rows using the last stored counter per key
#[derive(Clone)]
pub struct DeltaCalculator {
    store: Arc<dyn TelemetryStore>,
}

impl std::fmt::Debug for DeltaCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaCalculator").finish_non_exhaustive()
    }
}

impl DeltaCalculator {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    /// Build one row per `(key_id, used_bytes)`; keys never seen before start from zero
    pub async fn build_snapshots(
        &self,
        key_type: KeyType,
        server_id: Option<&str>,
        counters: &[(String, i64)],
    ) -> GatewatchResult<Vec<NewUsageSnapshot>> {
        if counters.is_empty() {
            return Ok(Vec::new());
        }

        let key_ids: Vec<String> = counters.iter().map(|(key, _)| key.clone()).collect();
        let previous = self.store.latest_used_bytes(key_type, &key_ids).await?;

        let rows: Vec<NewUsageSnapshot> = counters
            .iter()
            .map(|(key_id, used_bytes)| {
                let prior = previous.get(key_id).copied().unwrap_or(0);
                NewUsageSnapshot {
                    server_id: server_id.map(str::to_string),
                    key_id: key_id.clone(),
                    key_type,
                    used_bytes: *used_bytes,
                    delta_bytes: compute_delta(prior, *used_bytes),
                }
            })
            .collect();

        debug!(
            key_type = %key_type,
            server_id = server_id.unwrap_or("-"),
            keys = rows.len(),
            first_seen = rows.len() - previous.len().min(rows.len()),
            "Computed usage deltas"
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;

    #[test]
    fn test_compute_delta_rules() {
        assert_eq!(compute_delta(0, 500), 500);
        assert_eq!(compute_delta(100, 350), 250);
        assert_eq!(compute_delta(350, 350), 0);
        // Counter reset
        assert_eq!(compute_delta(9_000, 12), 0);
    }

    #[tokio::test]
    async fn test_build_snapshots_against_history() {
        let store = Arc::new(MemoryStore::new());
        store.insert_snapshot_at(
            NewUsageSnapshot {
                server_id: Some("srv".to_string()),
                key_id: "k1".to_string(),
                key_type: KeyType::AccessKey,
                used_bytes: 1_000,
                delta_bytes: 1_000,
            },
            Utc::now(),
        );

        let calculator = DeltaCalculator::new(store.clone());
        let counters = vec![("k1".to_string(), 1_500), ("k2".to_string(), 40)];
        let rows = calculator
            .build_snapshots(KeyType::AccessKey, Some("srv"), &counters)
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].delta_bytes, 500);
        assert_eq!(rows[1].delta_bytes, 40);
        assert!(rows.iter().all(|r| r.server_id.as_deref() == Some("srv")));
    }

    #[tokio::test]
    async fn test_dynamic_history_is_separate() {
        let store = Arc::new(MemoryStore::new());
        store.insert_snapshot_at(
            NewUsageSnapshot {
                server_id: Some("srv".to_string()),
                key_id: "shared-id".to_string(),
                key_type: KeyType::AccessKey,
                used_bytes: 10_000,
                delta_bytes: 0,
            },
            Utc::now(),
        );

        let calculator = DeltaCalculator::new(store);
        let rows = calculator
            .build_snapshots(KeyType::DynamicKey, None, &[("shared-id".to_string(), 300)])
            .await
            .unwrap();
        assert_eq!(rows[0].delta_bytes, 300);
        assert_eq!(rows[0].server_id, None);
    }
}
