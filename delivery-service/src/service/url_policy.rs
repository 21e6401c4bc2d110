//! # Webhook URL Policy (SSRF Defense)
//!
//! Validation every webhook target passes *before* signing or dispatch -
//! at endpoint creation and again before each delivery.
//!
//! ## Rejection Rules (exhaustive)
//!
//! | Rule | Examples rejected |
//! |------|-------------------|
//! | scheme not http/https | `file://`, `gopher://`, `ftp://`, missing scheme |
//! | localhost / unspecified | `localhost`, `0.0.0.0` |
//! | loopback | `127.0.0.0/8`, `::1` |
//! | RFC 1918 private | `10.0.0.0/8`, `192.168.0.0/16`, `172.16.0.0/12` |
//! | link-local | `169.254.0.0/16` (cloud metadata endpoints) |
//! | port outside {80, 443, 8080, 8443} | `:22`, `:6379`, non-numeric |
//!
//! The checks are **string-based**: hostnames outside the literal IP
//! ranges are accepted as-is, with no DNS resolution. In particular
//! `localhost.` (trailing dot) does not equal the literal `localhost`
//! and is accepted - the test suite pins this. Defending against DNS
//! rebinding is the egress proxy's job, not this validator's.
//!
//! Redirects are not followed at dispatch (`reqwest` redirect policy:
//! none), so no re-validation hop exists to miss.

use shared::errors::ApiError;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Ports a webhook target may use explicitly.
pub const ALLOWED_PORTS: [u16; 4] = [80, 443, 8080, 8443];

/// Validates a webhook target URL. Returns the reason-tagged
/// `WebhookUrlRejected` on any rule violation.
pub fn validate_webhook_url(raw: &str) -> Result<(), ApiError> {
    let url = Url::parse(raw)
        .map_err(|_| ApiError::WebhookUrlRejected { reason: "unparseable url" })?;

    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(ApiError::WebhookUrlRejected { reason: "scheme not allowed" }),
    }

    let host = url
        .host()
        .ok_or(ApiError::WebhookUrlRejected { reason: "missing host" })?;

    match host {
        Host::Domain(domain) => {
            // The URL parser lowercases hostnames; this is a literal
            // comparison, so "localhost." passes (string-based check)
            if domain == "localhost" {
                return Err(ApiError::WebhookUrlRejected { reason: "localhost" });
            }
        }
        Host::Ipv4(addr) => validate_ipv4(addr)?,
        Host::Ipv6(addr) => validate_ipv6(addr)?,
    }

    // `Url::port` is `Some` only for an explicit non-default port; the
    // scheme defaults (80/443) are in the allowlist anyway
    if let Some(port) = url.port() {
        if !ALLOWED_PORTS.contains(&port) {
            return Err(ApiError::WebhookUrlRejected { reason: "port not allowed" });
        }
    }

    Ok(())
}

fn validate_ipv4(addr: Ipv4Addr) -> Result<(), ApiError> {
    if addr.is_unspecified() {
        return Err(ApiError::WebhookUrlRejected { reason: "unspecified address" });
    }
    if addr.is_loopback() {
        return Err(ApiError::WebhookUrlRejected { reason: "loopback address" });
    }
    // is_private covers exactly 10/8, 172.16/12, 192.168/16
    if addr.is_private() {
        return Err(ApiError::WebhookUrlRejected { reason: "private address" });
    }
    if addr.is_link_local() {
        return Err(ApiError::WebhookUrlRejected { reason: "link-local address" });
    }
    Ok(())
}

fn validate_ipv6(addr: Ipv6Addr) -> Result<(), ApiError> {
    if addr.is_loopback() {
        return Err(ApiError::WebhookUrlRejected { reason: "loopback address" });
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(url: &str) -> bool {
        validate_webhook_url(url).is_err()
    }

    #[test]
    fn test_rejects_disallowed_schemes() {
        assert!(rejected("file:///etc/passwd"));
        assert!(rejected("gopher://example.com/"));
        assert!(rejected("ftp://example.com/file"));
        assert!(rejected("example.com/hooks")); // missing scheme
    }

    #[test]
    fn test_rejects_localhost_and_unspecified() {
        assert!(rejected("http://localhost/hooks"));
        assert!(rejected("http://LOCALHOST/hooks")); // parser lowercases
        assert!(rejected("http://0.0.0.0/hooks"));
    }

    #[test]
    fn test_rejects_loopback_ranges() {
        assert!(rejected("http://127.0.0.1/hooks"));
        assert!(rejected("http://127.1.2.3/hooks")); // anywhere in 127/8
        assert!(rejected("http://[::1]/hooks"));
    }

    #[test]
    fn test_rejects_rfc1918_ranges() {
        assert!(rejected("http://10.0.0.1/hooks"));
        assert!(rejected("http://10.255.255.255/hooks"));
        assert!(rejected("http://192.168.0.1/hooks"));
        assert!(rejected("http://192.168.255.1/hooks"));
        assert!(rejected("http://172.16.0.1/hooks"));
        assert!(rejected("http://172.31.255.254/hooks"));
    }

    #[test]
    fn test_accepts_adjacent_public_ranges() {
        // The 172.16/12 boundary: 172.15.x and 172.32.x are public
        assert!(validate_webhook_url("https://172.15.0.1/hooks").is_ok());
        assert!(validate_webhook_url("https://172.32.0.1/hooks").is_ok());
        // 192.167.x / 11.x are public
        assert!(validate_webhook_url("https://192.167.0.1/hooks").is_ok());
        assert!(validate_webhook_url("https://11.0.0.1/hooks").is_ok());
    }

    #[test]
    fn test_rejects_link_local_metadata_range() {
        assert!(rejected("http://169.254.169.254/latest/meta-data"));
        assert!(rejected("http://169.254.0.1/hooks"));
    }

    #[test]
    fn test_port_allowlist() {
        assert!(validate_webhook_url("https://api.example.com:443/hooks").is_ok());
        assert!(validate_webhook_url("http://api.example.com:80/hooks").is_ok());
        assert!(validate_webhook_url("https://api.example.com:8443/hooks").is_ok());
        assert!(validate_webhook_url("http://api.example.com:8080/hooks").is_ok());

        assert!(rejected("http://api.example.com:22/hooks"));
        assert!(rejected("http://api.example.com:6379/hooks"));
        assert!(rejected("http://api.example.com:65535/hooks"));
        assert!(rejected("http://api.example.com:99999/hooks")); // out of range
        assert!(rejected("http://api.example.com:abc/hooks")); // non-numeric
    }

    #[test]
    fn test_accepts_public_hostnames() {
        assert!(validate_webhook_url("https://api.github.com/repos/x/y/dispatches").is_ok());
        assert!(validate_webhook_url("https://hooks.example.com/aegis").is_ok());
        assert!(validate_webhook_url("http://example.com/").is_ok());
    }

    #[test]
    fn test_string_based_check_accepts_localhost_with_trailing_dot() {
        // Pinned behavior: literal comparison, no DNS awareness
        assert!(validate_webhook_url("http://localhost./hooks").is_ok());
    }
}
