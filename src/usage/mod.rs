//! # Usage Accounting
//!
//! Delta computation over cumulative gateway counters and retention of the
//! resulting snapshot history.

pub mod delta;
pub mod retention;

pub use delta::{compute_delta, DeltaCalculator};
pub use retention::RetentionSchedule;
