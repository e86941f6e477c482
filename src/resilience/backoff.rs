//! # Per-Target Exponential Backoff
//!
//! Tracks targets whose last operation failed and how long to leave them alone.
//! The first failure waits the floor delay; each further failure before a success
//! doubles it, up to the cap. Expired entries are removed lazily by
//! [`BackoffTracker::should_skip`]; [`BackoffTracker::record_success`] clears
//! the target unconditionally.
//!
//! State is process-local and deliberately not persisted: a freshly started
//! worker retries every target once.

use crate::config::BackoffConfig;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffState {
    pub delay: Duration,
    pub until: Instant,
}

#[derive(Debug)]
pub struct BackoffTracker {
    floor: Duration,
    cap: Duration,
    entries: DashMap<String, BackoffState>,
}

impl BackoffTracker {
    pub fn new(floor: Duration, cap: Duration) -> Self {
        Self {
            floor,
            cap: cap.max(floor),
            entries: DashMap::new(),
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_secs(config.initial_seconds),
            Duration::from_secs(config.max_seconds),
        )
    }

    pub fn should_skip(&self, target_id: &str) -> bool {
        self.should_skip_at(target_id, Instant::now())
    }

    pub fn should_skip_at(&self, target_id: &str, now: Instant) -> bool {
        let Some(state) = self.entries.get(target_id).map(|entry| *entry) else {
            return false;
        };

        if now < state.until {
            return true;
        }

        // Only clear the entry we looked at; a concurrent failure may have replaced it
        self.entries
            .remove_if(target_id, |_, current| current.until <= now);
        debug!(target_id = %target_id, "Backoff window elapsed, target eligible again");
        false
    }

    /// Record a failure and return the delay now in effect
    pub fn record_failure(&self, target_id: &str) -> Duration {
        self.record_failure_at(target_id, Instant::now())
    }

    pub fn record_failure_at(&self, target_id: &str, now: Instant) -> Duration {
        let mut entry = self
            .entries
            .entry(target_id.to_string())
            .and_modify(|state| {
                state.delay = state.delay.saturating_mul(2).min(self.cap);
            })
            .or_insert(BackoffState {
                delay: self.floor,
                until: now,
            });
        entry.until = now + entry.delay;
        let delay = entry.delay;
        drop(entry);

        info!(
            target_id = %target_id,
            delay_seconds = delay.as_secs(),
            "Target backed off after failure"
        );
        delay
    }

    pub fn record_success(&self, target_id: &str) {
        if self.entries.remove(target_id).is_some() {
            debug!(target_id = %target_id, "Backoff cleared after success");
        }
    }

    pub fn state(&self, target_id: &str) -> Option<BackoffState> {
        self.entries.get(target_id).map(|entry| *entry)
    }

    /// Targets currently tracked, including ones whose window has elapsed but not yet been checked
    pub fn tracked_targets(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
