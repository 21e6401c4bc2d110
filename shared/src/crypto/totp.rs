//! # TOTP and Backup Codes
//!
//! RFC 6238 time-based one-time passwords plus the backup-code scheme
//! used as the second factor fallback.
//!
//! ## Wire Contracts (bit-exact)
//!
//! - TOTP: HMAC-SHA1, 6 digits, 30-second step, dynamic truncation per
//!   RFC 4226 §5.3; verification accepts a ±1 step window by default
//! - Secrets: >= 160 bits from the CSPRNG, canonical RFC 4648 Base32
//!   (`A-Z`, `2-7`, unpadded)
//! - Enrollment URL:
//!   `otpauth://totp/{issuer}:{account}?secret=…&issuer=…&algorithm=SHA1&digits=6&period=30`
//!   with `:`, `@`, and spaces percent-encoded in the label
//! - Backup codes: `DDDD-DDDD` (9 chars, hyphen at position 4), hashed
//!   with SHA-256 to 64 lowercase hex chars
//!
//! ## Verification Behavior
//!
//! `validate_totp_code` never panics and never errors on bad input: a code
//! that is not exactly six ASCII digits, or an empty/undecodable secret,
//! simply verifies as `false`. Comparisons are constant-time.

use crate::crypto::{random, signing};
use crate::errors::ApiError;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha1 = Hmac<Sha1>;

/// TOTP step size in seconds (RFC 6238 recommended default).
pub const TOTP_PERIOD_SECONDS: u64 = 30;

/// Number of code digits.
pub const TOTP_DIGITS: u32 = 6;

/// Default verification window in steps (±30 s).
pub const TOTP_DEFAULT_WINDOW: u64 = 1;

/// Number of backup codes issued per batch.
pub const BACKUP_CODE_BATCH: usize = 10;

// =============================================================================
// Secret Generation
// =============================================================================

/// Generates a new TOTP secret: 20 CSPRNG bytes (160 bits) encoded as
/// canonical unpadded RFC 4648 Base32.
pub fn generate_totp_secret() -> Result<String, ApiError> {
    let mut bytes = [0u8; 20];
    random::random_bytes(&mut bytes)?;
    Ok(base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &bytes))
}

/// Decodes a Base32 secret, accepting optional `=` padding.
fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    if secret.is_empty() {
        return None;
    }
    let trimmed = secret.trim_end_matches('=');
    base32::decode(base32::Alphabet::Rfc4648 { padding: false }, trimmed)
}

// =============================================================================
// Code Generation (RFC 6238 / RFC 4226)
// =============================================================================

/// HOTP value for a key and counter: HMAC-SHA1 plus dynamic truncation.
fn hotp(key: &[u8], counter: u64) -> u32 {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    // Dynamic truncation (RFC 4226 §5.3): low nibble of the last byte
    // selects a 4-byte window; mask the sign bit
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = ((u32::from(digest[offset]) & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    binary % 10u32.pow(TOTP_DIGITS)
}

/// Generates the 6-digit TOTP code for a secret at a given unix time.
///
/// ## Errors
///
/// Returns `ApiError::CryptoError` if the secret is not valid Base32.
pub fn generate_totp_code(secret: &str, unix_time: u64) -> Result<String, ApiError> {
    let key = decode_secret(secret).ok_or_else(|| ApiError::CryptoError {
        message: "TOTP secret is not valid Base32".to_string(),
    })?;
    let counter = unix_time / TOTP_PERIOD_SECONDS;
    Ok(format!("{:06}", hotp(&key, counter)))
}

// =============================================================================
// Code Validation
// =============================================================================

/// Validates a TOTP code against the current time with a ±`window` step
/// tolerance.
///
/// Tolerant by construction: returns `false` (never errors, never panics)
/// when the code is not exactly six decimal digits or the secret is empty
/// or undecodable.
pub fn validate_totp_code(secret: &str, code: &str, window: u64) -> bool {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    validate_totp_code_at(secret, code, window, now)
}

/// Validation against an explicit clock; the testable core of
/// [`validate_totp_code`].
pub fn validate_totp_code_at(secret: &str, code: &str, window: u64, unix_time: u64) -> bool {
    // Format gate: exactly six ASCII digits, nothing else
    if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let key = match decode_secret(secret) {
        Some(key) => key,
        None => return false,
    };

    let current_step = unix_time / TOTP_PERIOD_SECONDS;
    let start = current_step.saturating_sub(window);
    let end = current_step + window;

    let mut matched = false;
    for step in start..=end {
        let candidate = format!("{:06}", hotp(&key, step));
        // Constant-time per candidate; check all steps regardless of match
        if signing::constant_time_eq(candidate.as_bytes(), code.as_bytes()) {
            matched = true;
        }
    }
    matched
}

// =============================================================================
// Enrollment URL
// =============================================================================

/// Percent-encodes a label component for the otpauth URL. Everything
/// outside RFC 3986 unreserved characters is encoded, which covers the
/// required `:`, `@`, and space handling.
fn encode_label(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(char::from(byte))
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

/// Builds the `otpauth://` enrollment URL that authenticator apps scan.
///
/// Format:
/// `otpauth://totp/{issuer}:{account}?secret=…&issuer=…&algorithm=SHA1&digits=6&period=30`
pub fn build_otpauth_url(secret: &str, account: &str, issuer: &str) -> String {
    format!(
        "otpauth://totp/{}%3A{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
        encode_label(issuer),
        encode_label(account),
        secret,
        encode_label(issuer),
        TOTP_DIGITS,
        TOTP_PERIOD_SECONDS,
    )
}

// =============================================================================
// Backup Codes
// =============================================================================

/// Generates `n` backup codes in `DDDD-DDDD` format, pairwise unique
/// within the batch.
pub fn generate_backup_codes(n: usize) -> Result<Vec<String>, ApiError> {
    let mut seen = HashSet::with_capacity(n);
    let mut codes = Vec::with_capacity(n);
    while codes.len() < n {
        let digits = random::random_digits(8)?;
        let code = format!("{}-{}", &digits[..4], &digits[4..]);
        if seen.insert(code.clone()) {
            codes.push(code);
        }
    }
    Ok(codes)
}

/// Whether a string has the backup-code shape: 9 chars, hyphen at
/// position 4, digits everywhere else.
pub fn is_backup_code_format(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == 9
        && bytes[4] == b'-'
        && bytes[..4].iter().all(|b| b.is_ascii_digit())
        && bytes[5..].iter().all(|b| b.is_ascii_digit())
}

/// Hashes a backup code with SHA-256 to 64 lowercase hex chars.
pub fn hash_backup_code(code: &str) -> String {
    signing::sha256_hex(code.as_bytes())
}

/// Verifies a backup code against a stored hash in constant time.
pub fn verify_backup_code(code: &str, stored_hash: &str) -> bool {
    let computed = hash_backup_code(code);
    signing::constant_time_eq(computed.as_bytes(), stored_hash.as_bytes())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// RFC 6238 Appendix B test secret ("12345678901234567890" in Base32).
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn test_rfc6238_vectors_sha1() {
        // Appendix B, truncated from 8 to the last 6 digits
        assert_eq!(generate_totp_code(RFC_SECRET, 59).unwrap(), "287082");
        assert_eq!(generate_totp_code(RFC_SECRET, 1_111_111_109).unwrap(), "081804");
        assert_eq!(generate_totp_code(RFC_SECRET, 1_234_567_890).unwrap(), "005924");
        assert_eq!(generate_totp_code(RFC_SECRET, 2_000_000_000).unwrap(), "279037");
    }

    #[test]
    fn test_generated_secret_is_canonical_base32() {
        let secret = generate_totp_secret().unwrap();
        // 20 bytes -> 32 unpadded Base32 chars
        assert_eq!(secret.len(), 32);
        assert!(secret.chars().all(|c| matches!(c, 'A'..='Z' | '2'..='7')));
    }

    #[test]
    fn test_validate_accepts_current_and_adjacent_steps() {
        let secret = generate_totp_secret().unwrap();
        let now = 1_700_000_000u64;

        let current = generate_totp_code(&secret, now).unwrap();
        let previous = generate_totp_code(&secret, now - TOTP_PERIOD_SECONDS).unwrap();
        let next = generate_totp_code(&secret, now + TOTP_PERIOD_SECONDS).unwrap();

        assert!(validate_totp_code_at(&secret, &current, 1, now));
        assert!(validate_totp_code_at(&secret, &previous, 1, now));
        assert!(validate_totp_code_at(&secret, &next, 1, now));
    }

    #[test]
    fn test_validate_rejects_outside_window() {
        let secret = generate_totp_secret().unwrap();
        let now = 1_700_000_000u64;
        let stale = generate_totp_code(&secret, now - 3 * TOTP_PERIOD_SECONDS).unwrap();

        // A three-step-old code is outside the ±1 window (unless it
        // collides, which the fixed timestamp rules out here)
        assert!(!validate_totp_code_at(&secret, &stale, 1, now));
    }

    #[test]
    fn test_validate_rejects_malformed_codes() {
        let secret = generate_totp_secret().unwrap();
        let now = 1_700_000_000u64;

        assert!(!validate_totp_code_at(&secret, "12345", 1, now)); // 5 digits
        assert!(!validate_totp_code_at(&secret, "1234567", 1, now)); // 7 digits
        assert!(!validate_totp_code_at(&secret, "12a456", 1, now)); // non-digit
        assert!(!validate_totp_code_at(&secret, "", 1, now));
    }

    #[test]
    fn test_validate_empty_secret_is_false_not_error() {
        assert!(!validate_totp_code_at("", "123456", 1, 1_700_000_000));
    }

    #[test]
    fn test_validate_garbage_secret_is_false_not_error() {
        assert!(!validate_totp_code_at("not base32!!", "123456", 1, 1_700_000_000));
    }

    #[test]
    fn test_otpauth_url_format() {
        let url = build_otpauth_url(RFC_SECRET, "alice@example.com", "Aegis Cloud");

        assert!(url.starts_with("otpauth://totp/Aegis%20Cloud%3Aalice%40example.com?"));
        assert!(url.contains(&format!("secret={}", RFC_SECRET)));
        assert!(url.contains("issuer=Aegis%20Cloud"));
        assert!(url.contains("algorithm=SHA1"));
        assert!(url.contains("digits=6"));
        assert!(url.contains("period=30"));
    }

    #[test]
    fn test_backup_codes_format_and_uniqueness() {
        let codes = generate_backup_codes(BACKUP_CODE_BATCH).unwrap();
        assert_eq!(codes.len(), 10);

        let unique: HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), 10);

        for code in &codes {
            assert!(is_backup_code_format(code), "bad format: {}", code);
        }
    }

    #[test]
    fn test_backup_code_format_gate() {
        assert!(is_backup_code_format("1234-5678"));
        assert!(!is_backup_code_format("12345678")); // no hyphen
        assert!(!is_backup_code_format("1234-567")); // too short
        assert!(!is_backup_code_format("abcd-efgh")); // not digits
        assert!(!is_backup_code_format("12345-678")); // hyphen misplaced
    }

    #[test]
    fn test_backup_code_hash_round_trip() {
        let code = "1234-5678";
        let hash = hash_backup_code(code);

        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(verify_backup_code(code, &hash));
        assert!(!verify_backup_code("1234-5679", &hash));
    }

    #[test]
    fn test_backup_code_hash_deterministic() {
        assert_eq!(hash_backup_code("0000-0000"), hash_backup_code("0000-0000"));
    }
}
