//! # Data Transfer Objects
//!
//! Request/response contracts for the authentication API. Incoming DTOs
//! derive `Validate`; handlers call `shared::validation::validate_request`
//! before the service layer sees any data. JSON uses `camelCase`.
//!
//! Password *policy* (12 chars, four character classes) is enforced by
//! the service layer via `PasswordPolicy`, not by these surface checks -
//! the DTO bounds exist only to cap payload sizes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// =============================================================================
// REGISTRATION / LOGIN
// =============================================================================

/// Request body for signup. Without `tenantId` a fresh tenant is
/// bootstrapped and this user becomes its admin.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[validate(length(max = 255, message = "Email too long"))]
    pub email: String,

    /// Plain text password; policy-checked before hashing
    #[validate(length(max = 128, message = "Password too long"))]
    pub password: String,

    /// Existing tenant to join (edge-resolved)
    pub tenant_id: Option<Uuid>,

    /// Display name for a bootstrapped tenant
    #[validate(length(max = 200, message = "Tenant name too long"))]
    pub tenant_name: Option<String>,
}

/// Request body for login. The tenant is resolved by the edge (e.g. from
/// the subdomain) because emails are only unique per tenant.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub tenant_id: Uuid,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    /// Six-digit TOTP code or `DDDD-DDDD` backup code; required once the
    /// account has a second factor
    pub totp_code: Option<String>,
}

// =============================================================================
// TOKENS
// =============================================================================

/// Request body for token refresh.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Request body for logout. The access token arrives in the
/// `Authorization` header; the refresh token travels in the body so both
/// halves of the session can be named in audit logs.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Request body for sidecar token validation.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTokenRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

/// Validated claims exposed to sidecars. The raw `jti` stays internal to
/// the platform; only the caller's own token is reflected here.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimsResponse {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub roles: Vec<String>,
    pub expires_at: i64,
}

// =============================================================================
// TWO-FACTOR
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTotpRequest {
    #[validate(length(min = 6, max = 9, message = "Code must be 6-9 characters"))]
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DisableTotpRequest {
    /// Current TOTP code or a backup code
    #[validate(length(min = 6, max = 9, message = "Code must be 6-9 characters"))]
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateBackupCodesRequest {
    /// Must be a TOTP code (backup codes can't mint their own successors)
    #[validate(length(min = 6, max = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}

// =============================================================================
// OTP / EMAIL CHANGE
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// One of `login`, `password_reset`, `email_change`
    #[validate(length(min = 1, message = "Purpose is required"))]
    pub purpose: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Purpose is required"))]
    pub purpose: String,

    #[validate(length(min = 6, max = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEmailRequest {
    #[validate(email(message = "Invalid email format"))]
    pub new_email: String,

    /// OTP delivered to the new address
    #[validate(length(min = 6, max = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

// =============================================================================
// OAUTH
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OAuthCallbackRequest {
    #[validate(length(min = 1, message = "Code is required"))]
    pub code: String,

    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
}

// =============================================================================
// PASSWORD RESET
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[validate(length(max = 128, message = "Password too long"))]
    pub new_password: String,
}

// =============================================================================
// API KEYS
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    /// Granted scopes; format-checked, matching is deny-by-default
    #[validate(length(min = 1, message = "At least one scope is required"))]
    pub scopes: Vec<String>,

    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidateApiKeyRequest {
    #[validate(length(min = 1, message = "Key is required"))]
    pub key: String,

    /// The scope the caller wants to exercise
    #[validate(length(min = 1, message = "Scope is required"))]
    pub scope: String,
}

// =============================================================================
// GENERIC RESPONSES
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: String,
}
