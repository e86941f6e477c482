use crate::probe::headers::HeaderFindings;
use crate::probe::tls::TlsProbeReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// URL scheme of a probed target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Https)
    }

    /// Map a URL scheme; anything that is not `https` is treated as plaintext
    pub fn from_url(url: &url::Url) -> Self {
        if url.scheme().eq_ignore_ascii_case("https") {
            Self::Https
        } else {
            Self::Http
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified outcome of a TLS probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeResult {
    Ok,
    CertExpiring,
    CertExpired,
    TlsError,
    ConnectionError,
}

impl ProbeResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::CertExpiring => "CERT_EXPIRING",
            Self::CertExpired => "CERT_EXPIRED",
            Self::TlsError => "TLS_ERROR",
            Self::ConnectionError => "CONNECTION_ERROR",
        }
    }

    /// The target answered and its certificate state could be read
    pub fn is_reachable(&self) -> bool {
        !matches!(self, Self::TlsError | Self::ConnectionError)
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time TLS status of one gateway
/// Maps to `security_probes` table (one row per server, last write wins)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SecurityProbe {
    pub server_id: String,
    pub scheme: Scheme,
    pub tls_version: Option<String>,
    pub cipher_suite: Option<String>,
    pub cert_subject: Option<String>,
    pub cert_issuer: Option<String>,
    pub cert_expiry: Option<DateTime<Utc>>,
    pub cert_days_left: Option<i32>,
    pub result: ProbeResult,
    pub error_message: Option<String>,
    pub last_checked_at: DateTime<Utc>,
    pub next_check_at: DateTime<Utc>,
}

impl SecurityProbe {
    pub fn from_report(
        server_id: impl Into<String>,
        report: TlsProbeReport,
        checked_at: DateTime<Utc>,
        next_check_at: DateTime<Utc>,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            scheme: report.scheme,
            tls_version: report.tls_version,
            cipher_suite: report.cipher_suite,
            cert_subject: report.cert_subject,
            cert_issuer: report.cert_issuer,
            cert_expiry: report.cert_expiry,
            cert_days_left: report.cert_days_left.map(clamp_days),
            result: report.result,
            error_message: report.error_message,
            last_checked_at: checked_at,
            next_check_at,
        }
    }
}

/// Security posture of the management dashboard itself
/// Maps to `dashboard_security_probe` table (singleton row)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DashboardSecurityProbe {
    pub url: String,
    pub scheme: Scheme,
    pub tls_version: Option<String>,
    pub cipher_suite: Option<String>,
    pub cert_subject: Option<String>,
    pub cert_issuer: Option<String>,
    pub cert_expiry: Option<DateTime<Utc>>,
    pub cert_days_left: Option<i32>,
    pub has_hsts: bool,
    pub hsts_max_age: Option<i64>,
    pub has_secure_cookies: bool,
    pub has_http_only_cookies: bool,
    pub has_same_site_cookies: bool,
    pub has_csp: bool,
    pub csp_directives: Option<String>,
    pub has_x_frame_options: bool,
    pub has_x_content_type_options: bool,
    pub security_score: i32,
    pub result: ProbeResult,
    pub error_message: Option<String>,
    pub last_checked_at: DateTime<Utc>,
    pub next_check_at: DateTime<Utc>,
}

impl DashboardSecurityProbe {
    pub fn from_findings(
        url: impl Into<String>,
        report: TlsProbeReport,
        headers: HeaderFindings,
        security_score: u8,
        checked_at: DateTime<Utc>,
        next_check_at: DateTime<Utc>,
    ) -> Self {
        Self {
            url: url.into(),
            scheme: report.scheme,
            tls_version: report.tls_version,
            cipher_suite: report.cipher_suite,
            cert_subject: report.cert_subject,
            cert_issuer: report.cert_issuer,
            cert_expiry: report.cert_expiry,
            cert_days_left: report.cert_days_left.map(clamp_days),
            has_hsts: headers.has_hsts,
            hsts_max_age: headers.hsts_max_age,
            has_secure_cookies: headers.has_secure_cookies,
            has_http_only_cookies: headers.has_http_only_cookies,
            has_same_site_cookies: headers.has_same_site_cookies,
            has_csp: headers.has_csp,
            csp_directives: headers.csp_directives,
            has_x_frame_options: headers.has_x_frame_options,
            has_x_content_type_options: headers.has_x_content_type_options,
            security_score: i32::from(security_score),
            result: report.result,
            error_message: report.error_message,
            last_checked_at: checked_at,
            next_check_at,
        }
    }
}

fn clamp_days(days: i64) -> i32 {
    days.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
