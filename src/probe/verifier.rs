//! # Certificate Verification Policies
//!
//! Both outbound TLS paths bypass web PKI trust:
//!
//! - the TLS probe only *observes* certificates (self-signed and expired ones
//!   included), so it accepts any chain;
//! - the gateway metrics client trusts exactly one certificate, identified by
//!   the SHA-256 fingerprint pinned for each server.
//!
//! Handshake signatures are still verified in both modes.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

/// SHA-256 fingerprint of a DER-encoded certificate
pub type Fingerprint = [u8; 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationPolicy {
    /// Accept any certificate; used when the certificate itself is the subject of the check
    ObserveOnly,
    /// Accept only the end-entity certificate with this fingerprint
    Pinned(Fingerprint),
}

#[derive(Debug)]
pub struct CertificateVerifier {
    policy: VerificationPolicy,
    algorithms: WebPkiSupportedAlgorithms,
}

impl CertificateVerifier {
    pub fn new(policy: VerificationPolicy, algorithms: WebPkiSupportedAlgorithms) -> Self {
        Self { policy, algorithms }
    }
}

impl ServerCertVerifier for CertificateVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self.policy {
            VerificationPolicy::ObserveOnly => Ok(ServerCertVerified::assertion()),
            VerificationPolicy::Pinned(expected) => {
                let actual = fingerprint(end_entity.as_ref());
                if actual == expected {
                    Ok(ServerCertVerified::assertion())
                } else {
                    warn!(
                        expected = %hex::encode(expected),
                        actual = %hex::encode(actual),
                        "Pinned certificate fingerprint mismatch"
                    );
                    Err(rustls::Error::General(
                        "certificate fingerprint does not match pinned value".to_string(),
                    ))
                }
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Build a client configuration (TLS 1.2 and 1.3, ring provider) for `policy`
pub fn client_config(policy: VerificationPolicy) -> Result<ClientConfig, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = Arc::new(CertificateVerifier::new(
        policy,
        provider.signature_verification_algorithms,
    ));

    Ok(ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(rustls::ALL_VERSIONS)?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth())
}

pub fn fingerprint(der: &[u8]) -> Fingerprint {
    Sha256::digest(der).into()
}

/// Parse a hex fingerprint; case-insensitive, colons and whitespace ignored
pub fn parse_fingerprint(raw: &str) -> Option<Fingerprint> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .collect();
    let bytes = hex::decode(cleaned).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fingerprint_formats() {
        let plain = "a".repeat(64);
        let expected = [0xaa_u8; 32];
        assert_eq!(parse_fingerprint(&plain), Some(expected));
        assert_eq!(parse_fingerprint(&plain.to_uppercase()), Some(expected));

        let colons = vec!["AA"; 32].join(":");
        assert_eq!(parse_fingerprint(&colons), Some(expected));
    }

    #[test]
    fn test_parse_fingerprint_rejects_bad_input() {
        assert_eq!(parse_fingerprint(""), None);
        assert_eq!(parse_fingerprint("zz"), None);
        // 31 bytes
        assert_eq!(parse_fingerprint(&"ab".repeat(31)), None);
    }

    #[test]
    fn test_fingerprint_is_sha256_of_der() {
        let digest = fingerprint(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_client_config_builds_for_both_policies() {
        assert!(client_config(VerificationPolicy::ObserveOnly).is_ok());
        assert!(client_config(VerificationPolicy::Pinned([0u8; 32])).is_ok());
    }
}
