//! # Mutually Authenticated Transport
//!
//! TLS configs for inter-service channels between the edge and backend
//! services. Both peers present certificates and validate each other
//! against the platform's internal trust anchor - never WebPKI roots, and
//! never with a fallback to cleartext.
//!
//! ## Guarantees
//!
//! - Server side refuses connections without a valid client certificate
//!   signed by the trust anchor
//! - Client side refuses servers whose certificate does not chain to the
//!   same anchor
//! - Minimum negotiated protocol is TLS 1.2 with TLS 1.3 preferred
//!   (rustls' protocol defaults; rustls supports nothing older)
//! - Expired or untrusted certificates fail the handshake immediately
//!
//! ## Expiry Monitoring
//!
//! [`days_until_expiry`] inspects a DER certificate; services call
//! [`warn_if_expiring`] at startup and from their health checks so a cert
//! with fewer than seven days left is flagged well before an outage.
//!
//! ## Identity Propagation
//!
//! After the edge validates an access token it forwards the caller as
//! `x-aegis-*` metadata headers over this channel (see
//! [`identity`](crate::identity)). Backends re-validate the token and
//! build identity from claims only; the channel authenticates *services*,
//! the token authenticates *users*.

use crate::config::TlsConfig;
use crate::errors::ApiError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Warn when a certificate has fewer days of validity left than this.
pub const EXPIRY_WARNING_DAYS: i64 = 7;

// =============================================================================
// PEM Loading
// =============================================================================

/// Loads a PEM certificate chain from disk.
pub fn load_cert_chain(path: &str) -> Result<Vec<CertificateDer<'static>>, ApiError> {
    let file = File::open(path).map_err(|e| ApiError::InternalError {
        message: format!("Cannot open certificate file {}: {}", path, e),
    })?;
    let mut reader = BufReader::new(file);
    let certs: Result<Vec<_>, _> = rustls_pemfile::certs(&mut reader).collect();
    let certs = certs.map_err(|e| ApiError::InternalError {
        message: format!("Cannot parse certificates in {}: {}", path, e),
    })?;
    if certs.is_empty() {
        return Err(ApiError::InternalError {
            message: format!("No certificates found in {}", path),
        });
    }
    Ok(certs)
}

/// Loads a PEM private key from disk.
pub fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>, ApiError> {
    let file = File::open(path).map_err(|e| ApiError::InternalError {
        message: format!("Cannot open key file {}: {}", path, e),
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ApiError::InternalError {
            message: format!("Cannot parse key in {}: {}", path, e),
        })?
        .ok_or_else(|| ApiError::InternalError {
            message: format!("No private key found in {}", path),
        })
}

/// Builds the trust-anchor store from the internal CA certificate.
fn trust_anchor_store(path: &str) -> Result<RootCertStore, ApiError> {
    let mut roots = RootCertStore::empty();
    for cert in load_cert_chain(path)? {
        roots.add(cert).map_err(|e| ApiError::InternalError {
            message: format!("Invalid trust anchor in {}: {}", path, e),
        })?;
    }
    Ok(roots)
}

// =============================================================================
// Mutual TLS
// =============================================================================

/// Builder for the platform's mutual-TLS channel configs.
#[derive(Debug)]
pub struct MutualTls;

impl MutualTls {
    /// Server-side config: presents this service's certificate and
    /// *requires* a client certificate signed by the trust anchor.
    pub fn server_config(tls: &TlsConfig) -> Result<ServerConfig, ApiError> {
        let roots = trust_anchor_store(&tls.trust_anchor_path)?;
        let client_verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| ApiError::InternalError {
                message: format!("Cannot build client verifier: {}", e),
            })?;

        let cert_chain = load_cert_chain(&tls.cert_path)?;
        warn_if_expiring(&cert_chain, &tls.cert_path);
        let key = load_private_key(&tls.key_path)?;

        ServerConfig::builder()
            .with_client_cert_verifier(client_verifier)
            .with_single_cert(cert_chain, key)
            .map_err(|e| ApiError::InternalError {
                message: format!("Invalid server certificate/key: {}", e),
            })
    }

    /// Client-side config: trusts only the internal anchor and presents
    /// this service's certificate for client authentication.
    pub fn client_config(tls: &TlsConfig) -> Result<ClientConfig, ApiError> {
        let roots = trust_anchor_store(&tls.trust_anchor_path)?;

        let cert_chain = load_cert_chain(&tls.cert_path)?;
        warn_if_expiring(&cert_chain, &tls.cert_path);
        let key = load_private_key(&tls.key_path)?;

        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(cert_chain, key)
            .map_err(|e| ApiError::InternalError {
                message: format!("Invalid client certificate/key: {}", e),
            })
    }
}

// =============================================================================
// Expiry Monitoring
// =============================================================================

/// Days until a DER certificate's `notAfter`. Negative values mean the
/// certificate is already expired; `None` means it failed to parse.
pub fn days_until_expiry(cert_der: &[u8]) -> Option<i64> {
    let (_rest, cert) = X509Certificate::from_der(cert_der).ok()?;
    let not_after = cert.validity().not_after.timestamp();
    let now = chrono::Utc::now().timestamp();
    Some((not_after - now) / 86_400)
}

/// Logs a warning for any certificate in the chain with fewer than
/// [`EXPIRY_WARNING_DAYS`] days of validity left.
pub fn warn_if_expiring(chain: &[CertificateDer<'_>], source: &str) {
    for cert in chain {
        match days_until_expiry(cert.as_ref()) {
            Some(days) if days < EXPIRY_WARNING_DAYS => {
                tracing::warn!(
                    source = source,
                    days_remaining = days,
                    "Certificate expires soon; rotate before the deadline"
                );
            }
            Some(_) => {}
            None => {
                tracing::warn!(source = source, "Certificate could not be parsed for expiry check");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};

    /// Generates a CA plus a leaf signed by it, returning DER blobs.
    fn generate_ca_and_leaf() -> (Vec<u8>, Vec<u8>) {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let leaf_params = CertificateParams::new(vec!["auth.aegis.internal".to_string()]).unwrap();
        let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key).unwrap();

        (ca_cert.der().to_vec(), leaf_cert.der().to_vec())
    }

    #[test]
    fn test_days_until_expiry_parses_generated_cert() {
        let (_ca, leaf) = generate_ca_and_leaf();
        let days = days_until_expiry(&leaf).expect("parseable");
        // rcgen's default validity extends far beyond the warning window
        assert!(days > EXPIRY_WARNING_DAYS);
    }

    #[test]
    fn test_days_until_expiry_garbage_is_none() {
        assert_eq!(days_until_expiry(b"not a certificate"), None);
    }

    #[test]
    fn test_trust_anchor_store_accepts_generated_ca() {
        let (ca_der, _leaf) = generate_ca_and_leaf();

        let mut roots = RootCertStore::empty();
        roots.add(CertificateDer::from(ca_der)).expect("CA accepted");
        assert_eq!(roots.len(), 1);
    }

    #[test]
    fn test_client_verifier_builds_from_anchor() {
        let (ca_der, _leaf) = generate_ca_and_leaf();
        let mut roots = RootCertStore::empty();
        roots.add(CertificateDer::from(ca_der)).unwrap();

        // The verifier that enforces "no client cert, no connection"
        let verifier = WebPkiClientVerifier::builder(Arc::new(roots)).build();
        assert!(verifier.is_ok());
    }
}
