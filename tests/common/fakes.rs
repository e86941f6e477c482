//! Scripted stand-ins for the gateway fleet and the network prober.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use gatewatch_core::gateway::{GatewayError, GatewayMetricsClient, TransferCounters};
use gatewatch_core::models::{ProbeResult, Scheme, Server};
use gatewatch_core::probe::{HeaderFindings, TargetProber, TlsProbeReport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Gateway metrics client answering from a per-server script.
///
/// Servers without a script answer with an empty counter set.
#[derive(Debug, Default)]
pub struct ScriptedMetricsClient {
    responses: Mutex<HashMap<String, Result<TransferCounters, GatewayError>>>,
    calls: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedMetricsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_counters(&self, server_id: &str, counters: &[(&str, i64)]) {
        let counters = counters
            .iter()
            .map(|(key, used)| ((*key).to_string(), *used))
            .collect();
        self.responses
            .lock()
            .insert(server_id.to_string(), Ok(counters));
    }

    pub fn fail(&self, server_id: &str, error: GatewayError) {
        self.responses
            .lock()
            .insert(server_id.to_string(), Err(error));
    }

    /// Every fetch sleeps this long first (tokio time, so it honours paused clocks)
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, server_id: &str) -> usize {
        self.calls.lock().iter().filter(|id| *id == server_id).count()
    }
}

#[async_trait]
impl GatewayMetricsClient for ScriptedMetricsClient {
    async fn fetch_transfer_metrics(
        &self,
        server: &Server,
    ) -> Result<TransferCounters, GatewayError> {
        self.calls.lock().push(server.id.clone());
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .get(&server.id)
            .cloned()
            .unwrap_or_else(|| Ok(TransferCounters::new()))
    }
}

pub fn healthy_tls_report() -> TlsProbeReport {
    let expiry = Utc::now() + ChronoDuration::days(90);
    TlsProbeReport {
        scheme: Scheme::Https,
        tls_version: Some("TLSv1.3".to_string()),
        cipher_suite: Some("TLS13_AES_256_GCM_SHA384".to_string()),
        cert_subject: Some("CN=gateway.test".to_string()),
        cert_issuer: Some("CN=Test CA".to_string()),
        cert_expiry: Some(expiry),
        cert_days_left: Some(89),
        result: ProbeResult::Ok,
        error_message: None,
    }
}

pub fn hardened_headers() -> HeaderFindings {
    HeaderFindings {
        has_hsts: true,
        hsts_max_age: Some(31_536_000),
        has_secure_cookies: true,
        has_http_only_cookies: true,
        has_same_site_cookies: true,
        has_csp: true,
        csp_directives: Some("default-src 'self'".to_string()),
        has_x_frame_options: true,
        has_x_content_type_options: true,
    }
}

/// Prober answering from per-URL scripts, healthy by default
#[derive(Debug, Default)]
pub struct ScriptedProber {
    tls: Mutex<HashMap<String, TlsProbeReport>>,
    headers: Mutex<HashMap<String, HeaderFindings>>,
    probed: Mutex<Vec<String>>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tls(&self, url: &str, report: TlsProbeReport) {
        self.tls.lock().insert(url.to_string(), report);
    }

    pub fn set_headers(&self, url: &str, findings: HeaderFindings) {
        self.headers.lock().insert(url.to_string(), findings);
    }

    pub fn probed_urls(&self) -> Vec<String> {
        self.probed.lock().clone()
    }
}

#[async_trait]
impl TargetProber for ScriptedProber {
    async fn probe_tls(&self, url: &str, _timeout: Duration) -> TlsProbeReport {
        self.probed.lock().push(url.to_string());
        self.tls
            .lock()
            .get(url)
            .cloned()
            .unwrap_or_else(healthy_tls_report)
    }

    async fn probe_headers(&self, url: &str, _timeout: Duration) -> HeaderFindings {
        self.headers
            .lock()
            .get(url)
            .cloned()
            .unwrap_or_else(hardened_headers)
    }
}
