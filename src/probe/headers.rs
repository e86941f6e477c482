//! # Security Header Probe
//!
//! One HEAD request per target; the response headers are inspected for HSTS,
//! cookie hardening flags, CSP, framing protection and MIME sniffing
//! protection. Transport failures yield all-false findings.

use crate::error::{GatewatchError, GatewatchResult};
use reqwest::header::{
    HeaderMap, CONTENT_SECURITY_POLICY, SET_COOKIE, STRICT_TRANSPORT_SECURITY,
    X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
};
use reqwest::redirect::Policy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Hardening signals found in one response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderFindings {
    pub has_hsts: bool,
    pub hsts_max_age: Option<i64>,
    pub has_secure_cookies: bool,
    pub has_http_only_cookies: bool,
    pub has_same_site_cookies: bool,
    pub has_csp: bool,
    pub csp_directives: Option<String>,
    pub has_x_frame_options: bool,
    pub has_x_content_type_options: bool,
}

impl HeaderFindings {
    /// Inspect response headers. Cookie flags are true if any `Set-Cookie` sets them.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let hsts = headers
            .get(STRICT_TRANSPORT_SECURITY)
            .and_then(|v| v.to_str().ok());

        let csp = headers
            .get(CONTENT_SECURITY_POLICY)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let mut findings = Self {
            has_hsts: hsts.is_some(),
            hsts_max_age: hsts.and_then(parse_hsts_max_age),
            has_csp: csp.is_some(),
            csp_directives: csp.map(str::to_string),
            has_x_frame_options: headers.contains_key(X_FRAME_OPTIONS),
            has_x_content_type_options: headers.contains_key(X_CONTENT_TYPE_OPTIONS),
            ..Self::default()
        };

        for cookie in headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
        {
            let flags = CookieFlags::parse(cookie);
            findings.has_secure_cookies |= flags.secure;
            findings.has_http_only_cookies |= flags.http_only;
            findings.has_same_site_cookies |= flags.same_site;
        }

        findings
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct CookieFlags {
    secure: bool,
    http_only: bool,
    same_site: bool,
}

impl CookieFlags {
    fn parse(set_cookie: &str) -> Self {
        let mut flags = Self::default();
        // First segment is name=value
        for attribute in set_cookie.split(';').skip(1) {
            let name = attribute
                .split('=')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            match name.as_str() {
                "secure" => flags.secure = true,
                "httponly" => flags.http_only = true,
                "samesite" => flags.same_site = true,
                _ => {}
            }
        }
        flags
    }
}

/// Extract `max-age` seconds from a Strict-Transport-Security value
pub fn parse_hsts_max_age(value: &str) -> Option<i64> {
    value.split(';').find_map(|directive| {
        let (name, raw) = directive.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            raw.trim().trim_matches('"').parse().ok()
        } else {
            None
        }
    })
}

#[derive(Debug, Clone)]
pub struct SecurityHeaderProbe {
    client: Client,
}

impl SecurityHeaderProbe {
    pub fn new() -> GatewatchResult<Self> {
        // Certificates are the TLS probe's concern; redirects would inspect a different response.
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(Policy::none())
            .user_agent(format!("gatewatch/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                GatewatchError::ProbeError(format!("Failed to create HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }

    #[instrument(skip(self))]
    pub async fn probe(&self, url: &str, request_timeout: Duration) -> HeaderFindings {
        match self.client.head(url).timeout(request_timeout).send().await {
            Ok(response) => {
                debug!(status = %response.status(), "Header probe response received");
                HeaderFindings::from_headers(response.headers())
            }
            Err(e) => {
                debug!(error = %e, "Header probe failed, reporting no protections");
                HeaderFindings::default()
            }
        }
    }
}
