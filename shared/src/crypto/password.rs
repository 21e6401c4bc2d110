//! # Password Hashing with Argon2id
//!
//! Secure storage for passwords and API-key secrets using Argon2id.
//!
//! ## Why Argon2id?
//!
//! Argon2 won the Password Hashing Competition and is the
//! [OWASP](https://cheatsheetseries.owasp.org/cheatsheets/Password_Storage_Cheat_Sheet.html)
//! recommendation. The `id` variant resists both GPU and side-channel
//! attacks.
//!
//! ## Parameters
//!
//! | Parameter | Value | Purpose |
//! |-----------|-------|---------|
//! | Memory | 64 MiB | Makes attacks expensive (GPU memory) |
//! | Iterations | 3 | Time cost (slows brute force) |
//! | Parallelism | 4 | CPU lanes |
//! | Output | 32 bytes | Hash length |
//!
//! Calibrated so a median verification takes at least 200 ms on the target
//! hardware; re-calibrate when the deployment hardware changes.
//!
//! ## PHC String Format
//!
//! Hashes are stored as self-describing PHC strings:
//!
//! ```text
//! $argon2id$v=19$m=65536,t=3,p=4$<salt>$<hash>
//! ```
//!
//! The salt is generated per hash from the OS CSPRNG; the same input never
//! produces the same string twice.

use crate::errors::ApiError;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

// =============================================================================
// Password Hasher
// =============================================================================

/// Argon2id hashing service for passwords and API-key secrets.
///
/// ## Thread Safety
///
/// `Clone + Send + Sync`, safe for concurrent use. Each hash operation
/// generates a fresh random salt.
#[derive(Clone)]
pub struct PasswordHasher {
    /// Pre-configured Argon2 instance
    argon2: Argon2<'static>,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher {
    /// Creates a hasher with the platform parameters (64 MiB, t=3, p=4).
    pub fn new() -> Self {
        let params = Params::new(
            64 * 1024, // 64 MiB memory cost
            3,         // 3 iterations (time cost)
            4,         // 4 lanes (parallelism)
            None,      // Default output length (32 bytes)
        )
        .expect("Invalid Argon2 params"); // Safe: these params are always valid

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        Self { argon2 }
    }

    /// Hashes a secret for storage, returning a PHC string.
    ///
    /// ## Errors
    ///
    /// Returns `ApiError::CryptoError` if hashing fails (RNG failure).
    pub fn hash(&self, secret: &str) -> Result<String, ApiError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::CryptoError {
                message: format!("Password hashing failed: {}", e),
            })
    }

    /// Verifies a secret against a stored PHC string in constant time.
    ///
    /// ## Returns
    ///
    /// - `Ok(true)` - secret matches
    /// - `Ok(false)` - secret doesn't match
    /// - `Err(...)` - stored hash is malformed
    pub fn verify(&self, secret: &str, hash: &str) -> Result<bool, ApiError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| ApiError::CryptoError {
            message: format!("Invalid password hash format: {}", e),
        })?;

        match self.argon2.verify_password(secret.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(ApiError::CryptoError {
                message: format!("Password verification failed: {}", e),
            }),
        }
    }
}

// Implement Debug manually to avoid exposing internal state
impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

// =============================================================================
// Password Policy
// =============================================================================

/// Validates password strength before hashing.
///
/// ## Requirements
///
/// - Minimum 12 characters
/// - At least 1 lowercase letter
/// - At least 1 uppercase letter
/// - At least 1 digit
/// - At least 1 non-alphanumeric character
///
/// Validation runs *before* hashing; a violation never reaches the hasher.
pub struct PasswordPolicy;

impl PasswordPolicy {
    /// Checks a candidate password against the platform policy.
    ///
    /// ## Returns
    ///
    /// - `Ok(())` - password meets all requirements
    /// - `Err(violations)` - the list of failed requirements
    pub fn validate(password: &str) -> Result<(), Vec<&'static str>> {
        let mut violations = Vec::new();

        if password.chars().count() < 12 {
            violations.push("Password must be at least 12 characters long");
        }

        if !password.chars().any(|c| c.is_lowercase()) {
            violations.push("Password must contain at least one lowercase letter");
        }

        if !password.chars().any(|c| c.is_uppercase()) {
            violations.push("Password must contain at least one uppercase letter");
        }

        if !password.chars().any(|c| c.is_ascii_digit()) {
            violations.push("Password must contain at least one digit");
        }

        if !password.chars().any(|c| !c.is_alphanumeric()) {
            violations.push("Password must contain at least one non-alphanumeric character");
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_correct_password() {
        let hasher = PasswordHasher::new();
        let password = "MySecureP@ssw0rd!";

        let hash = hasher.hash(password).unwrap();

        assert_ne!(hash, password);
        assert!(hasher.verify(password, &hash).unwrap());
    }

    #[test]
    fn test_verify_wrong_password() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("MySecureP@ssw0rd!").unwrap();

        assert!(!hasher.verify("WrongP@ssw0rd!", &hash).unwrap());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let hasher = PasswordHasher::new();
        let password = "MySecureP@ssw0rd!";

        let hash1 = hasher.hash(password).unwrap();
        let hash2 = hasher.hash(password).unwrap();

        // Each hash is unique due to the per-hash salt
        assert_ne!(hash1, hash2);
        assert!(hasher.verify(password, &hash1).unwrap());
        assert!(hasher.verify(password, &hash2).unwrap());
    }

    #[test]
    fn test_hash_is_phc_format() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("TestP@ssw0rd!").unwrap();

        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_malformed_hash_is_crypto_error() {
        let hasher = PasswordHasher::new();
        let result = hasher.verify("anything", "not-a-phc-string");
        assert!(matches!(result, Err(ApiError::CryptoError { .. })));
    }

    #[test]
    fn test_policy_accepts_conforming_password() {
        assert!(PasswordPolicy::validate("P@ssword1234").is_ok());
        assert!(PasswordPolicy::validate("Str0ng&Passphrase").is_ok());
    }

    #[test]
    fn test_policy_minimum_length_is_twelve() {
        // 11 characters, otherwise conforming
        let result = PasswordPolicy::validate("Aa1!aaaaaaa");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .contains(&"Password must be at least 12 characters long"));
    }

    #[test]
    fn test_policy_requires_each_class() {
        assert!(PasswordPolicy::validate("alllowercase1!aa").is_err()); // no upper
        assert!(PasswordPolicy::validate("ALLUPPERCASE1!AA").is_err()); // no lower
        assert!(PasswordPolicy::validate("NoDigitsHere!!aa").is_err()); // no digit
        assert!(PasswordPolicy::validate("NoSymbolsHere1aa").is_err()); // no symbol
    }

    #[test]
    fn test_policy_reports_multiple_violations() {
        let violations = PasswordPolicy::validate("short").unwrap_err();
        assert!(violations.len() > 1);
    }
}
