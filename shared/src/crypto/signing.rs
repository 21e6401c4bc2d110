//! # HMAC Signing and Digests
//!
//! HMAC-SHA256 signatures for webhook payloads, SHA-256 digests for
//! stored token material, and the constant-time equality primitive every
//! verifier in the platform uses.
//!
//! ## Wire Format
//!
//! A signature is the lowercase hex digest of
//! `HMAC-SHA256(secret, raw_payload_bytes)` - exactly 64 characters.
//! Verification recomputes the digest and compares in constant time.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Signs a payload with HMAC-SHA256, returning 64 lowercase hex chars.
pub fn hmac_sha256_hex(payload: &[u8], secret: &[u8]) -> String {
    // HMAC accepts keys of any length; new_from_slice cannot fail
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies an HMAC-SHA256 hex signature in constant time.
///
/// Returns `false` for malformed signatures (wrong length, non-hex) -
/// never an error, so a garbage signature costs the same as a wrong one.
pub fn verify_hmac_sha256(payload: &[u8], secret: &[u8], signature_hex: &str) -> bool {
    let expected = hmac_sha256_hex(payload, secret);
    constant_time_eq(expected.as_bytes(), signature_hex.as_bytes())
}

/// SHA-256 digest as 64 lowercase hex chars.
///
/// Used for backup-code hashes and for digesting refresh tokens before
/// any logging or indexing touches them.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Constant-time byte equality.
///
/// Length is compared first; unequal lengths return `false` immediately,
/// which leaks only the length - never the content.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_is_64_lowercase_hex() {
        let sig = hmac_sha256_hex(b"{\"event\":\"subscription.created\"}", b"secret");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hmac_round_trip() {
        let payload = b"{\"event\":\"subscription.created\"}";
        let secret = b"whsec_test";
        let sig = hmac_sha256_hex(payload, secret);

        assert!(verify_hmac_sha256(payload, secret, &sig));
    }

    #[test]
    fn test_hmac_rejects_tampered_payload() {
        let secret = b"whsec_test";
        let sig = hmac_sha256_hex(b"{\"event\":\"a\"}", secret);

        // any changed byte fails verification
        assert!(!verify_hmac_sha256(b"{\"event\":\"b\"}", secret, &sig));
    }

    #[test]
    fn test_hmac_rejects_wrong_secret() {
        let payload = b"payload";
        let sig = hmac_sha256_hex(payload, b"secret-a");
        assert!(!verify_hmac_sha256(payload, b"secret-b", &sig));
    }

    #[test]
    fn test_verify_tolerates_garbage_signature() {
        assert!(!verify_hmac_sha256(b"payload", b"secret", ""));
        assert!(!verify_hmac_sha256(b"payload", b"secret", "zz"));
        assert!(!verify_hmac_sha256(b"payload", b"secret", &"f".repeat(63)));
    }

    #[test]
    fn test_sha256_hex_deterministic() {
        let a = sha256_hex(b"1234-5678");
        let b = sha256_hex(b"1234-5678");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
