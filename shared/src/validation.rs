//! # Request Validation Helpers
//!
//! Utilities for validating incoming request data using the `validator`
//! crate.
//!
//! ## How Validation Works
//!
//! DTOs derive `Validate` and declare their rules; handlers call
//! [`validate_request`] before touching the service layer:
//!
//! ```rust,ignore
//! use validator::Validate;
//!
//! #[derive(Validate)]
//! struct LoginRequest {
//!     #[validate(email)]
//!     email: String,
//!
//!     #[validate(length(min = 1))]
//!     password: String,
//! }
//! ```
//!
//! Password *policy* (length and character classes) is separate from
//! request validation and lives in
//! [`crypto::password::PasswordPolicy`](crate::crypto::password::PasswordPolicy),
//! because it must run on every path that sets a password - signup, reset,
//! and change - before hashing.
//!
//! ## Error Response Format
//!
//! Validation failures return 400 with field-level details:
//!
//! ```json
//! {
//!   "code": "VALIDATION_ERROR",
//!   "message": "Validation error",
//!   "details": {
//!     "email": [ { "code": "email", "message": "Invalid email format" } ]
//!   }
//! }
//! ```

use crate::errors::ApiError;
use serde::de::DeserializeOwned;
use validator::Validate;

// =============================================================================
// Core Validation Functions
// =============================================================================

/// Validates a request DTO that implements `Validate`.
///
/// ## Errors
///
/// Returns `ApiError::ValidationError` with field-level details.
pub fn validate_request<T: Validate>(data: &T) -> Result<(), ApiError> {
    data.validate().map_err(ApiError::ValidationError)
}

/// Parses JSON and validates in a single step.
///
/// ## Errors
///
/// - `ApiError::BadRequest` if JSON parsing fails
/// - `ApiError::ValidationError` if validation fails
pub fn parse_and_validate<T: DeserializeOwned + Validate>(json: &str) -> Result<T, ApiError> {
    let data: T = serde_json::from_str(json)
        .map_err(|e| ApiError::BadRequest { message: e.to_string() })?;

    validate_request(&data)?;

    Ok(data)
}

// =============================================================================
// Custom Validators
// =============================================================================

/// Custom validation functions for use with `#[validate(custom)]`.
pub mod validators {
    use validator::ValidationError;

    /// Validates that a string is not blank (empty or whitespace-only).
    pub fn not_blank(value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::new("blank"));
        }
        Ok(())
    }

    /// Validates the *format* of a scope string (matching semantics live
    /// in [`crate::scopes`]).
    ///
    /// ## Valid Examples
    ///
    /// - `read:upload`, `write:notification`, `admin:tenant`
    /// - `read:*` (prefix wildcard), `*` (global wildcard)
    ///
    /// ## Invalid Examples
    ///
    /// - `""`, `:upload`, `read:`, `read::upload`, `Read:Upload`,
    ///   `read:*:upload` (wildcard only at the end)
    pub fn valid_scope(value: &str) -> Result<(), ValidationError> {
        if value == "*" {
            return Ok(());
        }

        let body = value.strip_suffix(":*").unwrap_or(value);

        if body.is_empty() {
            return Err(ValidationError::new("invalid_scope"));
        }

        // Segment charset check also rejects any '*' outside the trailing
        // wildcard position
        let segments_ok = body.split(':').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        });

        if !segments_ok {
            return Err(ValidationError::new("invalid_scope"));
        }

        Ok(())
    }

    /// Validates an email-queue priority (0 low ... 10 high).
    pub fn valid_priority(value: i32) -> Result<(), ValidationError> {
        if !(0..=10).contains(&value) {
            return Err(ValidationError::new("invalid_priority"));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::validators::*;

    #[test]
    fn test_not_blank_valid() {
        assert!(not_blank("hello").is_ok());
        assert!(not_blank("  hello  ").is_ok());
    }

    #[test]
    fn test_not_blank_invalid() {
        assert!(not_blank("").is_err());
        assert!(not_blank("   ").is_err());
        assert!(not_blank("\t\n").is_err());
    }

    #[test]
    fn test_valid_scope_accepts_grammar() {
        assert!(valid_scope("read:upload").is_ok());
        assert!(valid_scope("write:notification").is_ok());
        assert!(valid_scope("admin:tenant").is_ok());
        assert!(valid_scope("read:upload:nested").is_ok());
        assert!(valid_scope("read:*").is_ok());
        assert!(valid_scope("*").is_ok());
    }

    #[test]
    fn test_valid_scope_rejects_malformed() {
        assert!(valid_scope("").is_err());
        assert!(valid_scope(":upload").is_err());
        assert!(valid_scope("read:").is_err());
        assert!(valid_scope("read::upload").is_err());
        assert!(valid_scope("Read:Upload").is_err());
        assert!(valid_scope("read:*:upload").is_err());
        assert!(valid_scope("read upload").is_err());
    }

    #[test]
    fn test_valid_priority_bounds() {
        assert!(valid_priority(0).is_ok());
        assert!(valid_priority(5).is_ok());
        assert!(valid_priority(10).is_ok());
        assert!(valid_priority(-1).is_err());
        assert!(valid_priority(11).is_err());
    }
}
