//! # Cryptographic Primitives
//!
//! Every piece of secret handling in the platform goes through this
//! module: password hashing, TOTP generation/verification, backup codes,
//! HMAC webhook signing, and secure randomness.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`password`] | Argon2id hashing for passwords and API-key secrets |
//! | [`totp`] | RFC 6238 TOTP, otpauth URLs, backup codes |
//! | [`signing`] | HMAC-SHA256 signatures, SHA-256 digests, constant-time equality |
//! | [`random`] | CSPRNG-backed tokens, codes, and key material |
//!
//! All routines are pure or draw only from the process-wide CSPRNG, which
//! is thread-safe. Failures (RNG exhaustion, malformed input) surface as
//! [`ApiError::CryptoError`](crate::errors::ApiError::CryptoError); the
//! verifiers additionally tolerate empty/garbage input by returning
//! `false` instead of erroring where the caller cannot act on the
//! distinction.

pub mod password;
pub mod random;
pub mod signing;
pub mod totp;
