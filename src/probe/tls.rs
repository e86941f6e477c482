//! # TLS Probe
//!
//! Opens a connection to a URL and reports what the endpoint presents:
//! protocol version, cipher suite and the leaf certificate's subject, issuer and
//! expiry. Certificates are observed, never trusted or rejected, so self-signed
//! and expired certificates are reported instead of failing the handshake.
//!
//! ## Classification
//!
//! | Outcome                                   | Result             |
//! |-------------------------------------------|--------------------|
//! | invalid URL, refused, TCP connect timeout | `CONNECTION_ERROR` |
//! | handshake failure or timeout              | `TLS_ERROR`        |
//! | plaintext endpoint accepts a connection   | `OK`               |
//! | days left < 0                             | `CERT_EXPIRED`     |
//! | 0 <= days left < threshold (14)           | `CERT_EXPIRING`    |
//! | otherwise                                 | `OK`               |
//!
//! Every outcome is returned as a report; probing never fails.

use crate::constants::{CERT_EXPIRING_THRESHOLD_DAYS, SECONDS_PER_DAY};
use crate::error::{GatewatchError, GatewatchResult};
use crate::models::{ProbeResult, Scheme};
use crate::probe::verifier::{client_config, VerificationPolicy};
use chrono::{DateTime, Utc};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ProtocolVersion};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};
use url::{Host, Url};

/// Everything observed about one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsProbeReport {
    pub scheme: Scheme,
    pub tls_version: Option<String>,
    pub cipher_suite: Option<String>,
    pub cert_subject: Option<String>,
    pub cert_issuer: Option<String>,
    pub cert_expiry: Option<DateTime<Utc>>,
    pub cert_days_left: Option<i64>,
    pub result: ProbeResult,
    pub error_message: Option<String>,
}

impl TlsProbeReport {
    fn bare(scheme: Scheme, result: ProbeResult, error_message: Option<String>) -> Self {
        Self {
            scheme,
            tls_version: None,
            cipher_suite: None,
            cert_subject: None,
            cert_issuer: None,
            cert_expiry: None,
            cert_days_left: None,
            result,
            error_message,
        }
    }

    pub fn connection_error(scheme: Scheme, message: impl Into<String>) -> Self {
        Self::bare(scheme, ProbeResult::ConnectionError, Some(message.into()))
    }

    pub fn tls_error(message: impl Into<String>) -> Self {
        Self::bare(Scheme::Https, ProbeResult::TlsError, Some(message.into()))
    }

    pub fn plaintext_ok() -> Self {
        Self::bare(Scheme::Http, ProbeResult::Ok, None)
    }
}

/// Whole days until `expiry`, rounded toward negative infinity
pub fn days_left(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiry - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Classify certificate lifetime; `threshold_days` is exclusive
pub fn classify_days_left(days: i64, threshold_days: i64) -> ProbeResult {
    if days < 0 {
        ProbeResult::CertExpired
    } else if days < threshold_days {
        ProbeResult::CertExpiring
    } else {
        ProbeResult::Ok
    }
}

/// Leaf certificate fields read from DER
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCertificate {
    pub subject: String,
    pub issuer: String,
    pub not_after: DateTime<Utc>,
}

pub fn parse_leaf_certificate(der: &[u8]) -> Option<LeafCertificate> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).ok()?;
    let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)?;
    Some(LeafCertificate {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        not_after,
    })
}

fn protocol_label(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
        ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
        other => format!("{other:?}"),
    }
}

fn server_name(url: &Url) -> Option<ServerName<'static>> {
    match url.host()? {
        Host::Domain(domain) => ServerName::try_from(domain.to_string()).ok(),
        Host::Ipv4(ip) => Some(ServerName::IpAddress(IpAddr::V4(ip).into())),
        Host::Ipv6(ip) => Some(ServerName::IpAddress(IpAddr::V6(ip).into())),
    }
}

#[derive(Clone)]
pub struct TlsProbe {
    connector: TlsConnector,
    expiring_threshold_days: i64,
}

impl std::fmt::Debug for TlsProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsProbe")
            .field("expiring_threshold_days", &self.expiring_threshold_days)
            .finish_non_exhaustive()
    }
}

impl TlsProbe {
    pub fn new() -> GatewatchResult<Self> {
        Self::with_threshold(CERT_EXPIRING_THRESHOLD_DAYS)
    }

    pub fn with_threshold(expiring_threshold_days: i64) -> GatewatchResult<Self> {
        let config: ClientConfig = client_config(VerificationPolicy::ObserveOnly)
            .map_err(|e| GatewatchError::ProbeError(format!("TLS client setup failed: {e}")))?;
        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            expiring_threshold_days,
        })
    }

    /// Probe `url`; connect and handshake are each bounded by `connect_timeout`
    #[instrument(skip(self))]
    pub async fn probe(&self, url: &str, connect_timeout: Duration) -> TlsProbeReport {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                return TlsProbeReport::connection_error(Scheme::Http, format!("Invalid URL: {e}"))
            }
        };
        let scheme = Scheme::from_url(&parsed);

        let (Some(host), Some(port)) = (parsed.host_str(), parsed.port_or_known_default()) else {
            return TlsProbeReport::connection_error(scheme, "URL has no host or port");
        };
        let address = format!("{host}:{port}");

        let tcp = match timeout(connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!(address = %address, error = %e, "Connection failed");
                return TlsProbeReport::connection_error(scheme, e.to_string());
            }
            Err(_) => {
                return TlsProbeReport::connection_error(
                    scheme,
                    format!("Connection timed out after {}s", connect_timeout.as_secs()),
                )
            }
        };

        if !scheme.is_encrypted() {
            return TlsProbeReport::plaintext_ok();
        }

        let Some(name) = server_name(&parsed) else {
            return TlsProbeReport::tls_error(format!("Invalid TLS server name: {host}"));
        };

        let stream = match timeout(connect_timeout, self.connector.connect(name, tcp)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!(address = %address, error = %e, "TLS handshake failed");
                return TlsProbeReport::tls_error(e.to_string());
            }
            Err(_) => {
                return TlsProbeReport::tls_error(format!(
                    "TLS handshake timed out after {}s",
                    connect_timeout.as_secs()
                ))
            }
        };

        let (_, connection) = stream.get_ref();
        let tls_version = connection.protocol_version().map(protocol_label);
        let cipher_suite = connection
            .negotiated_cipher_suite()
            .map(|suite| format!("{:?}", suite.suite()));

        let leaf = connection
            .peer_certificates()
            .and_then(|chain| chain.first())
            .and_then(|der| parse_leaf_certificate(der.as_ref()));

        let Some(leaf) = leaf else {
            let mut report = TlsProbeReport::tls_error("Unable to read leaf certificate");
            report.tls_version = tls_version;
            report.cipher_suite = cipher_suite;
            return report;
        };

        let days = days_left(leaf.not_after, Utc::now());
        let result = classify_days_left(days, self.expiring_threshold_days);

        debug!(
            address = %address,
            tls_version = ?tls_version,
            days_left = days,
            result = %result,
            "TLS probe completed"
        );

        TlsProbeReport {
            scheme,
            tls_version,
            cipher_suite,
            cert_subject: Some(leaf.subject),
            cert_issuer: Some(leaf.issuer),
            cert_expiry: Some(leaf.not_after),
            cert_days_left: Some(days),
            result,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_classification_boundaries() {
        let threshold = CERT_EXPIRING_THRESHOLD_DAYS;
        assert_eq!(classify_days_left(-1, threshold), ProbeResult::CertExpired);
        assert_eq!(classify_days_left(0, threshold), ProbeResult::CertExpiring);
        assert_eq!(classify_days_left(13, threshold), ProbeResult::CertExpiring);
        assert_eq!(classify_days_left(14, threshold), ProbeResult::Ok);
        assert_eq!(classify_days_left(365, threshold), ProbeResult::Ok);
    }

    #[test]
    fn test_days_left_floors_partial_days() {
        let now = Utc::now();
        assert_eq!(days_left(now + ChronoDuration::hours(47), now), 1);
        assert_eq!(days_left(now + ChronoDuration::hours(48), now), 2);
        assert_eq!(days_left(now + ChronoDuration::hours(1), now), 0);
        // An hour past expiry is already day -1
        assert_eq!(days_left(now - ChronoDuration::hours(1), now), -1);
    }

    #[test]
    fn test_protocol_labels() {
        assert_eq!(protocol_label(ProtocolVersion::TLSv1_3), "TLSv1.3");
        assert_eq!(protocol_label(ProtocolVersion::TLSv1_2), "TLSv1.2");
    }

    #[test]
    fn test_server_name_for_ip_and_domain() {
        let ip = Url::parse("https://127.0.0.1:8443/api").unwrap();
        assert!(matches!(server_name(&ip), Some(ServerName::IpAddress(_))));

        let v6 = Url::parse("https://[::1]:8443/").unwrap();
        assert!(matches!(server_name(&v6), Some(ServerName::IpAddress(_))));

        let domain = Url::parse("https://vpn.example.com/").unwrap();
        assert!(matches!(server_name(&domain), Some(ServerName::DnsName(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_is_connection_error() {
        let probe = TlsProbe::new().unwrap();
        let report = probe.probe("not a url", Duration::from_secs(1)).await;
        assert_eq!(report.result, ProbeResult::ConnectionError);
        assert!(report.error_message.is_some());
    }

    #[tokio::test]
    async fn test_refused_connection_is_connection_error() {
        // Bind then drop to obtain a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TlsProbe::new().unwrap();
        let report = probe
            .probe(&format!("https://127.0.0.1:{port}"), Duration::from_secs(2))
            .await;
        assert_eq!(report.result, ProbeResult::ConnectionError);
        assert_eq!(report.scheme, Scheme::Https);
    }

    #[tokio::test]
    async fn test_plaintext_endpoint_is_ok() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let probe = TlsProbe::new().unwrap();
        let report = probe
            .probe(&format!("http://127.0.0.1:{port}/"), Duration::from_secs(2))
            .await;
        assert_eq!(report.result, ProbeResult::Ok);
        assert_eq!(report.scheme, Scheme::Http);
        assert!(report.tls_version.is_none());
    }

    #[tokio::test]
    async fn test_non_tls_listener_on_https_is_tls_error() {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
            }
        });

        let probe = TlsProbe::new().unwrap();
        let report = probe
            .probe(&format!("https://127.0.0.1:{port}/"), Duration::from_secs(2))
            .await;
        assert_eq!(report.result, ProbeResult::TlsError);
    }
}
