//! # Orchestration
//!
//! Per-cycle coordination of probes, metrics collection and persistence for
//! both worker roles. Lifecycle concerns (lock, timers, signals) live in
//! [`crate::worker`].

pub mod probe_orchestrator;

pub use probe_orchestrator::{
    aggregate_dynamic_usage, match_access_keys, CycleReport, OrchestratorDeps,
    OrchestratorSettings, ProbeOrchestrator,
};
