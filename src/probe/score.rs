//! Security score for the dashboard: a weighted sum of transport and header
//! hardening signals, 0 to 100.

use crate::models::Scheme;
use crate::probe::headers::HeaderFindings;

pub const HTTPS_WEIGHT: u8 = 40;
pub const HSTS_WEIGHT: u8 = 15;
pub const COOKIE_WEIGHT: u8 = 15;
pub const CSP_WEIGHT: u8 = 15;
pub const X_FRAME_OPTIONS_WEIGHT: u8 = 8;
pub const X_CONTENT_TYPE_OPTIONS_WEIGHT: u8 = 7;

pub const MAX_SCORE: u8 = HTTPS_WEIGHT
    + HSTS_WEIGHT
    + COOKIE_WEIGHT
    + CSP_WEIGHT
    + X_FRAME_OPTIONS_WEIGHT
    + X_CONTENT_TYPE_OPTIONS_WEIGHT;

/// Full credit needs Secure, HttpOnly and SameSite; half (rounded down) for
/// Secure or HttpOnly alone
fn cookie_points(findings: &HeaderFindings) -> u8 {
    if findings.has_secure_cookies
        && findings.has_http_only_cookies
        && findings.has_same_site_cookies
    {
        COOKIE_WEIGHT
    } else if findings.has_secure_cookies || findings.has_http_only_cookies {
        COOKIE_WEIGHT / 2
    } else {
        0
    }
}

pub fn security_score(scheme: Scheme, findings: &HeaderFindings) -> u8 {
    let award = |present: bool, weight: u8| if present { weight } else { 0 };

    award(scheme.is_encrypted(), HTTPS_WEIGHT)
        + award(findings.has_hsts, HSTS_WEIGHT)
        + cookie_points(findings)
        + award(findings.has_csp, CSP_WEIGHT)
        + award(findings.has_x_frame_options, X_FRAME_OPTIONS_WEIGHT)
        + award(
            findings.has_x_content_type_options,
            X_CONTENT_TYPE_OPTIONS_WEIGHT,
        )
}
