//! # Coordination
//!
//! Cluster-wide mutual exclusion between worker instances of the same role.

pub mod lock_manager;

pub use lock_manager::{generate_worker_id, LockManager};
