//! # Resilience Module
//!
//! Keeps unreachable gateways from dominating cycle latency.
//!
//! ## Usage
//!
//! ```rust
//! use gatewatch_core::resilience::BackoffTracker;
//! use std::time::Duration;
//!
//! let backoff = BackoffTracker::new(Duration::from_secs(30), Duration::from_secs(1800));
//! if !backoff.should_skip("server-1") {
//!     // collect from server-1, then record the outcome
//!     backoff.record_failure("server-1");
//! }
//! assert!(backoff.should_skip("server-1"));
//! ```

pub mod backoff;

pub use backoff::{BackoffState, BackoffTracker};
