//! # Secure Randomness
//!
//! Thin wrapper over the operating-system CSPRNG. Every random value in
//! the platform (tokens, OTP codes, TOTP secrets, API-key material, salts)
//! is drawn through here, so the source can be audited in one place.
//!
//! The OS RNG is a process-wide shared resource and is thread-safe; these
//! functions can be called from any worker. RNG failure is not recoverable
//! for a request and surfaces as `CryptoError`.

use crate::errors::ApiError;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

/// Fills a buffer with CSPRNG bytes.
pub fn random_bytes(buf: &mut [u8]) -> Result<(), ApiError> {
    OsRng.try_fill_bytes(buf).map_err(|e| ApiError::CryptoError {
        message: format!("OS RNG failure: {}", e),
    })
}

/// Returns `n_bytes` of CSPRNG data as lowercase hex (`2 * n_bytes` chars).
///
/// Used for opaque refresh tokens (32 bytes = 256 bits) and password-reset
/// tokens (32 bytes).
pub fn random_hex(n_bytes: usize) -> Result<String, ApiError> {
    let mut buf = vec![0u8; n_bytes];
    random_bytes(&mut buf)?;
    Ok(hex::encode(buf))
}

/// Returns a string of `len` decimal digits, each drawn independently from
/// the CSPRNG. Used for OTP codes and backup codes.
pub fn random_digits(len: usize) -> Result<String, ApiError> {
    let mut out = String::with_capacity(len);
    for _ in 0..len {
        let d: u8 = OsRng.gen_range(0..10);
        out.push(char::from(b'0' + d));
    }
    Ok(out)
}

/// Returns `len` characters of `[A-Za-z0-9]`. Used for API-key secrets
/// (>= 22 chars gives > 128 bits of entropy) and visible key prefixes.
pub fn random_alphanumeric(len: usize) -> Result<String, ApiError> {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut out = String::with_capacity(len);
    for _ in 0..len {
        let idx: usize = OsRng.gen_range(0..CHARSET.len());
        out.push(char::from(CHARSET[idx]));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_hex_length_and_charset() {
        let token = random_hex(32).unwrap();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_random_hex_unique() {
        // 256-bit values colliding would be a broken RNG
        assert_ne!(random_hex(32).unwrap(), random_hex(32).unwrap());
    }

    #[test]
    fn test_random_digits() {
        let code = random_digits(6).unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_random_alphanumeric() {
        let s = random_alphanumeric(22).unwrap();
        assert_eq!(s.len(), 22);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
