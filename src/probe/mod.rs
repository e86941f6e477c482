//! # Network Probes
//!
//! Outbound checks against gateways and the dashboard:
//!
//! - [`tls::TlsProbe`]: handshake metadata and certificate classification
//! - [`headers::SecurityHeaderProbe`]: response header hardening signals
//! - [`score::security_score`]: pure weighting of the two
//!
//! The orchestrator talks to probes through [`TargetProber`] so cycles can be
//! driven against scripted targets in tests.

pub mod headers;
pub mod score;
pub mod tls;
pub mod verifier;

use crate::error::GatewatchResult;
use async_trait::async_trait;
use std::time::Duration;

pub use headers::{HeaderFindings, SecurityHeaderProbe};
pub use score::security_score;
pub use tls::{TlsProbe, TlsProbeReport};
pub use verifier::{Fingerprint, VerificationPolicy};

/// Probes one target; every outcome is a value, never an error
#[async_trait]
pub trait TargetProber: Send + Sync {
    async fn probe_tls(&self, url: &str, timeout: Duration) -> TlsProbeReport;

    async fn probe_headers(&self, url: &str, timeout: Duration) -> HeaderFindings;
}

/// Real network prober backed by [`TlsProbe`] and [`SecurityHeaderProbe`]
#[derive(Debug, Clone)]
pub struct NetworkProber {
    tls: TlsProbe,
    headers: SecurityHeaderProbe,
}

impl NetworkProber {
    pub fn new(expiring_threshold_days: i64) -> GatewatchResult<Self> {
        Ok(Self {
            tls: TlsProbe::with_threshold(expiring_threshold_days)?,
            headers: SecurityHeaderProbe::new()?,
        })
    }
}

#[async_trait]
impl TargetProber for NetworkProber {
    async fn probe_tls(&self, url: &str, timeout: Duration) -> TlsProbeReport {
        self.tls.probe(url, timeout).await
    }

    async fn probe_headers(&self, url: &str, timeout: Duration) -> HeaderFindings {
        self.headers.probe(url, timeout).await
    }
}
