//! # Gateway Management API
//!
//! Read-only access to the per-key transfer counters each VPN gateway exposes.
//! The orchestrator depends on [`GatewayMetricsClient`]; the production
//! implementation is [`HttpGatewayMetricsClient`], which trusts only the
//! certificate pinned for each server.

pub mod client;

use crate::models::Server;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

pub use client::{HttpGatewayMetricsClient, TransferMetrics};

/// Cumulative bytes transferred, keyed by the gateway's own key identifier
pub type TransferCounters = HashMap<String, i64>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Invalid gateway endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("Invalid pinned certificate fingerprint for server {server_id}")]
    InvalidFingerprint { server_id: String },

    #[error("Connection to gateway failed: {0}")]
    Connect(String),

    #[error("Gateway request timed out")]
    Timeout,

    #[error("TLS failure talking to gateway: {0}")]
    Tls(String),

    #[error("Gateway responded with HTTP {0}")]
    Status(u16),

    #[error("Failed to decode gateway metrics: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Failures a later cycle may not reproduce
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Timeout | Self::Status(500..=599)
        )
    }
}

#[async_trait]
pub trait GatewayMetricsClient: Send + Sync {
    /// Fetch the cumulative counters of every key on `server`
    async fn fetch_transfer_metrics(
        &self,
        server: &Server,
    ) -> Result<TransferCounters, GatewayError>;
}
