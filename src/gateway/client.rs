use super::{GatewayError, GatewayMetricsClient, TransferCounters};
use crate::constants::GATEWAY_TRANSFER_METRICS_PATH;
use crate::models::Server;
use crate::probe::verifier::{client_config, parse_fingerprint, Fingerprint, VerificationPolicy};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Body of `GET {api_url}/metrics/transfer`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetrics {
    #[serde(rename = "bytesTransferredByUserId", default)]
    pub bytes_transferred_by_user_id: HashMap<String, u64>,
}

impl TransferMetrics {
    pub fn into_counters(self) -> TransferCounters {
        self.bytes_transferred_by_user_id
            .into_iter()
            .map(|(key, bytes)| (key, i64::try_from(bytes).unwrap_or(i64::MAX)))
            .collect()
    }
}

/// Metrics client holding one pinned HTTP client per server
pub struct HttpGatewayMetricsClient {
    request_timeout: Duration,
    clients: DashMap<String, (Fingerprint, Client)>,
}

impl std::fmt::Debug for HttpGatewayMetricsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGatewayMetricsClient")
            .field("request_timeout", &self.request_timeout)
            .field("cached_clients", &self.clients.len())
            .finish_non_exhaustive()
    }
}

impl HttpGatewayMetricsClient {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            clients: DashMap::new(),
        }
    }

    /// Client for `server`, rebuilt when its pinned fingerprint changes
    fn client_for(&self, server: &Server) -> Result<Client, GatewayError> {
        let pin = parse_fingerprint(&server.api_cert_sha256).ok_or_else(|| {
            GatewayError::InvalidFingerprint {
                server_id: server.id.clone(),
            }
        })?;

        if let Some(entry) = self.clients.get(&server.id) {
            if entry.0 == pin {
                return Ok(entry.1.clone());
            }
        }

        let tls = client_config(VerificationPolicy::Pinned(pin))
            .map_err(|e| GatewayError::Tls(e.to_string()))?;
        let client = Client::builder()
            .use_preconfigured_tls(tls)
            .connect_timeout(self.request_timeout)
            .timeout(self.request_timeout)
            .user_agent(format!("gatewatch/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Tls(format!("Failed to create HTTP client: {e}")))?;

        self.clients.insert(server.id.clone(), (pin, client.clone()));
        Ok(client)
    }
}

/// `{api_url}/metrics/transfer`, keeping any secret path prefix of `api_url`
pub fn metrics_url(api_url: &str) -> Result<Url, GatewayError> {
    let joined = format!(
        "{}/{}",
        api_url.trim_end_matches('/'),
        GATEWAY_TRANSFER_METRICS_PATH
    );
    let url =
        Url::parse(&joined).map_err(|e| GatewayError::invalid_endpoint(api_url, e.to_string()))?;
    if url.host_str().is_none() {
        return Err(GatewayError::invalid_endpoint(api_url, "missing host"));
    }
    Ok(url)
}

fn classify_request_error(err: &reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        return GatewayError::Timeout;
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(tls) = cause.downcast_ref::<rustls::Error>() {
            return GatewayError::Tls(tls.to_string());
        }
        // rustls failures surface wrapped in io::Error, whose source() skips the inner error
        if let Some(tls) = cause
            .downcast_ref::<std::io::Error>()
            .and_then(|io| io.get_ref())
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        {
            return GatewayError::Tls(tls.to_string());
        }
        source = cause.source();
    }

    if err.is_decode() {
        GatewayError::Decode(err.to_string())
    } else {
        GatewayError::Connect(err.to_string())
    }
}

#[async_trait]
impl GatewayMetricsClient for HttpGatewayMetricsClient {
    #[instrument(skip(self, server), fields(server_id = %server.id))]
    async fn fetch_transfer_metrics(
        &self,
        server: &Server,
    ) -> Result<TransferCounters, GatewayError> {
        let url = metrics_url(&server.api_url)?;
        let client = self.client_for(server)?;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Gateway metrics request rejected");
            return Err(GatewayError::Status(status.as_u16()));
        }

        let metrics: TransferMetrics = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Decode(e.to_string())
            }
        })?;

        let counters = metrics.into_counters();
        debug!(keys = counters.len(), "Fetched gateway transfer metrics");
        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(api_url: &str, fingerprint: &str) -> Server {
        Server {
            id: "srv-1".to_string(),
            name: "Frankfurt".to_string(),
            api_url: api_url.to_string(),
            api_cert_sha256: fingerprint.to_string(),
            is_active: true,
        }
    }

    #[test]
    fn test_metrics_url_keeps_secret_prefix() {
        let url = metrics_url("https://10.0.0.5:8443/Zx9secret/").unwrap();
        assert_eq!(url.as_str(), "https://10.0.0.5:8443/Zx9secret/metrics/transfer");

        let url = metrics_url("https://gw.example.net:443/abc").unwrap();
        assert_eq!(url.path(), "/abc/metrics/transfer");
    }

    #[test]
    fn test_metrics_url_rejects_garbage() {
        assert!(matches!(
            metrics_url("not a url"),
            Err(GatewayError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_decode_transfer_document() {
        let body = r#"{"bytesTransferredByUserId":{"0":1024,"7":18446744073709551615}}"#;
        let metrics: TransferMetrics = serde_json::from_str(body).unwrap();
        let counters = metrics.into_counters();
        assert_eq!(counters.get("0"), Some(&1024));
        assert_eq!(counters.get("7"), Some(&i64::MAX));
    }

    #[test]
    fn test_empty_document_decodes_to_no_counters() {
        let metrics: TransferMetrics = serde_json::from_str("{}").unwrap();
        assert!(metrics.into_counters().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_fingerprint_fails_before_connecting() {
        let client = HttpGatewayMetricsClient::new(Duration::from_secs(1));
        let err = client
            .fetch_transfer_metrics(&server("https://127.0.0.1:1/x", "not-hex"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::InvalidFingerprint {
                server_id: "srv-1".to_string()
            }
        );
    }

    #[test]
    fn test_client_cache_tracks_fingerprint() {
        let client = HttpGatewayMetricsClient::new(Duration::from_secs(1));
        let first = server("https://127.0.0.1:1/x", &"aa".repeat(32));
        client.client_for(&first).unwrap();
        assert_eq!(client.clients.len(), 1);

        let rotated = server("https://127.0.0.1:1/x", &"bb".repeat(32));
        client.client_for(&rotated).unwrap();
        assert_eq!(client.clients.len(), 1);
        assert_eq!(client.clients.get("srv-1").unwrap().0, [0xbb; 32]);
    }
}
