//! # System Constants
//!
//! Worker roles, lock identifiers and the fixed thresholds shared by probes and
//! the usage collector.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lock identifier held by the usage snapshot worker
pub const USAGE_SNAPSHOT_LOCK_ID: &str = "usage-snapshot-worker";

/// Lock identifier held by the security probe worker
pub const SECURITY_PROBE_LOCK_ID: &str = "security-probe-worker";

/// Primary key of the singleton dashboard probe row
pub const DASHBOARD_PROBE_ID: &str = "dashboard";

/// Certificates expiring in fewer days than this are reported as expiring
pub const CERT_EXPIRING_THRESHOLD_DAYS: i64 = 14;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Path of the per-key transfer metrics document on the gateway management API
pub const GATEWAY_TRANSFER_METRICS_PATH: &str = "metrics/transfer";

/// The two independently locked worker processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    /// Collects per-key usage deltas from every gateway
    UsageSnapshot,
    /// Probes dashboard and gateways for TLS and header posture
    SecurityProbe,
}

impl WorkerRole {
    /// Fixed lock row identifier for this role
    pub fn lock_id(&self) -> &'static str {
        match self {
            Self::UsageSnapshot => USAGE_SNAPSHOT_LOCK_ID,
            Self::SecurityProbe => SECURITY_PROBE_LOCK_ID,
        }
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.lock_id())
    }
}

impl FromStr for WorkerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            USAGE_SNAPSHOT_LOCK_ID => Ok(Self::UsageSnapshot),
            SECURITY_PROBE_LOCK_ID => Ok(Self::SecurityProbe),
            other => Err(format!("unknown worker role: {other}")),
        }
    }
}
