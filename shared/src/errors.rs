//! # Application Error Taxonomy
//!
//! Unified error handling for all Aegis services with automatic HTTP
//! conversion.
//!
//! ## Design Philosophy
//!
//! Domain errors are returned as tagged values, never thrown. Each variant
//! maps to a specific HTTP status code and a stable error code, ensuring
//! consistent API responses across services. Only infrastructure failures
//! (store unreachable, RNG) bubble up to the handler boundary, where they
//! are mapped into this taxonomy.
//!
//! ## Error Categories
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                          ApiError Categories                             │
//! ├──────────────────────────┬─────────────────────┬─────────────────────────┤
//! │ Authentication (401)     │ Authorization (403) │ Payment (402/404/409)   │
//! ├──────────────────────────┼─────────────────────┼─────────────────────────┤
//! │ InvalidCredentials       │ ScopeDenied         │ PaymentMethodDeclined   │
//! │ MfaRequired              │ TenantMismatch      │ InsufficientFunds       │
//! │ OtpInvalidOrExpired      │                     │ CardExpired             │
//! │ TokenExpired/Revoked     │                     │ SubscriptionNotFound    │
//! │ InvalidSignature/Claim   │                     │ InvalidPlanTransition   │
//! │ AlgorithmDisallowed      │                     │ InvoiceAlreadyPaid      │
//! │ RefreshExpired           │                     │ RefundFailed            │
//! │ SessionRevoked           │                     │ ProcessorError          │
//! │ AccountLocked            │                     │                         │
//! ├──────────────────────────┼─────────────────────┼─────────────────────────┤
//! │ Delivery (4xx/5xx)       │ Validation (400)    │ Infrastructure (5xx)    │
//! ├──────────────────────────┼─────────────────────┼─────────────────────────┤
//! │ WebhookUrlRejected       │ ValidationError     │ StoreUnavailable        │
//! │ WebhookSignatureInvalid  │ BadRequest          │ StoreTimeout            │
//! │ TemplateNotFound         │ PasswordPolicy...   │ CryptoError             │
//! │ DeliveryExhausted        │ NotFound/Conflict   │ DatabaseError           │
//! │ HardBounce               │ TooManyRequests     │ InternalError           │
//! │ EmailRateLimited         │                     │                         │
//! └──────────────────────────┴─────────────────────┴─────────────────────────┘
//! ```
//!
//! ## HTTP Response Format
//!
//! All errors serialize to a consistent JSON body:
//!
//! ```json
//! {
//!   "code": "SESSION_REVOKED",
//!   "message": "Session revoked",
//!   "correlation_id": "550e8400-e29b-41d4-a716-446655440000",
//!   "details": { ... },
//!   "timestamp": "2026-01-15T10:30:00Z"
//! }
//! ```
//!
//! Never exposed: password hashes, raw secrets, other users' `jti` values,
//! internal stack traces, or provider tokens. Server-side variants log the
//! underlying cause and return only the generic message.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for handlers and services.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Main Error Enum
// =============================================================================

/// Application error type with automatic HTTP status mapping.
///
/// Each variant represents a specific error condition and maps to an
/// appropriate HTTP status code. The `#[error]` attribute defines the
/// human-readable message; [`ApiError::error_code`] defines the stable
/// machine-readable code.
#[derive(Debug, Error)]
pub enum ApiError {
    // =========================================================================
    // Authentication Errors (401 Unauthorized)
    // =========================================================================
    // Every token-engine failure maps to 401 on the wire; the distinct codes
    // exist for clients that want them and for internal metrics.

    /// Wrong email/password combination (or unknown account - the message is
    /// identical in both cases to prevent enumeration).
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Password was correct but a second factor is required to finish login.
    #[error("Multi-factor authentication required")]
    MfaRequired {
        /// Factors the account can satisfy, e.g. `["totp", "backup_code"]`
        factors: Vec<&'static str>,
    },

    /// One-time password was wrong, already consumed, or past its TTL.
    #[error("Code is invalid or has expired")]
    OtpInvalidOrExpired,

    /// Access token is past its `exp` claim.
    #[error("Token expired")]
    TokenExpired,

    /// Access token `jti` is on the blacklist (logout or admin revocation).
    #[error("Token revoked")]
    TokenRevoked,

    /// Signature did not verify against any accepted key.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Token header named an algorithm outside the allowlist. Rejected
    /// before any signature inspection.
    #[error("Token algorithm not allowed")]
    AlgorithmDisallowed,

    /// A required claim is missing, malformed, or has the wrong value.
    #[error("Invalid claim: {field}")]
    InvalidClaim {
        /// The offending claim name (`iss`, `aud`, `nbf`, ...)
        field: &'static str,
    },

    /// No refresh token is registered for this user (expired or logged out).
    #[error("Refresh token expired")]
    RefreshExpired,

    /// Refresh-token reuse detected; the whole session chain is void.
    #[error("Session revoked")]
    SessionRevoked,

    /// New password failed the platform policy. Checked before hashing.
    #[error("Password does not meet the policy")]
    PasswordPolicyViolation {
        /// The failed requirements, suitable for display
        violations: Vec<&'static str>,
    },

    /// Email-change confirmation token unknown or already used.
    #[error("Email change token is invalid")]
    EmailChangeTokenInvalid,

    /// Request doesn't include the required authentication header.
    #[error("Missing authentication")]
    MissingAuth,

    /// Account temporarily locked after too many failed login attempts.
    #[error("Account locked")]
    AccountLocked {
        /// When the account unlocks
        until: chrono::DateTime<chrono::Utc>,
    },

    // =========================================================================
    // Authorization Errors (401/403)
    // =========================================================================

    /// Presented API key does not match any stored hash.
    #[error("Invalid API key")]
    ApiKeyInvalid,

    /// API key exists but has been revoked or is past its expiry.
    #[error("API key revoked")]
    ApiKeyRevoked,

    /// No granted scope matches the requested scope (deny by default).
    #[error("Scope denied: {scope}")]
    ScopeDenied {
        /// The requested scope that no grant covered
        scope: String,
    },

    /// Resource belongs to a different tenant than the caller.
    ///
    /// Deliberately a permission failure, not `NotFound` - this core does
    /// not conceal id existence across tenants; callers may choose to.
    #[error("Permission denied")]
    TenantMismatch,

    // =========================================================================
    // Payment Errors
    // =========================================================================

    /// Gateway declined the payment method.
    #[error("Payment method declined")]
    PaymentMethodDeclined,

    /// Gateway reported insufficient funds.
    #[error("Insufficient funds")]
    InsufficientFunds,

    /// Card on file is past its expiration date.
    #[error("Card expired")]
    CardExpired,

    /// Gateway failed in a way that is not the customer's fault.
    #[error("Payment processor error")]
    ProcessorError,

    /// Subscription id does not exist (within the caller's tenant).
    #[error("Subscription not found")]
    SubscriptionNotFound,

    /// Requested state change is not a legal lifecycle transition.
    #[error("Invalid subscription transition: {from} -> {to}")]
    InvalidPlanTransition {
        /// Current status
        from: String,
        /// Rejected target status
        to: String,
    },

    /// Invoice is already in `paid`; paying again is a no-op conflict.
    #[error("Invoice already paid")]
    InvoiceAlreadyPaid,

    /// Refund could not be applied.
    #[error("Refund failed")]
    RefundFailed,

    // =========================================================================
    // Notification / Delivery Errors
    // =========================================================================

    /// Referenced email template id is unknown.
    #[error("Template not found: {template_id}")]
    TemplateNotFound {
        /// The missing template identifier
        template_id: String,
    },

    /// Template exists but could not be rendered with the given variables.
    #[error("Template render error")]
    TemplateRenderError,

    /// All delivery retries consumed without success.
    #[error("Delivery retries exhausted")]
    DeliveryExhausted,

    /// Webhook signature did not verify (constant-time comparison).
    #[error("Webhook signature invalid")]
    WebhookSignatureInvalid,

    /// Webhook target URL failed SSRF validation.
    #[error("Webhook URL rejected: {reason}")]
    WebhookUrlRejected {
        /// Which rule rejected it (scheme, host, port)
        reason: &'static str,
    },

    /// Recipient address hard-bounced and is suppressed.
    #[error("Recipient address suppressed after hard bounce")]
    HardBounce,

    /// Too many email issuances for this address in the window.
    #[error("Email rate limited")]
    EmailRateLimited,

    // =========================================================================
    // Validation Errors (400 Bad Request)
    // =========================================================================

    /// Request body failed validation rules (field-level details attached).
    #[error("Validation error")]
    ValidationError(#[from] ValidationErrors),

    /// Generic bad request with custom message.
    #[error("Invalid input: {message}")]
    BadRequest {
        /// Human-readable description of what's wrong
        message: String,
    },

    /// Mutation requires an `Idempotency-Key` header and none was sent.
    #[error("Idempotency-Key header required")]
    IdempotencyKeyRequired,

    // =========================================================================
    // Resource Errors (404 Not Found, 409 Conflict)
    // =========================================================================

    /// Requested resource doesn't exist.
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Resource identifier (e.g., "user:123")
        resource: String,
    },

    /// Action would violate a uniqueness constraint.
    #[error("Resource already exists: {resource}")]
    Conflict {
        /// Description of the conflict (e.g., "email already registered")
        resource: String,
    },

    // =========================================================================
    // Rate Limiting (429 Too Many Requests)
    // =========================================================================

    /// Client exceeded request rate limits.
    #[error("Too many requests")]
    TooManyRequests {
        /// Seconds until the client can retry
        retry_after_seconds: u64,
    },

    // =========================================================================
    // Infrastructure Errors (5xx)
    // =========================================================================
    // Logged with their cause; clients receive only the generic message.

    /// A backing store is unreachable. On the blacklist path this is
    /// conservatively surfaced to clients as an authentication failure.
    #[error("Store unavailable: {store}")]
    StoreUnavailable {
        /// Which store ("revocation", "identity")
        store: &'static str,
    },

    /// A backing store did not answer within the per-call deadline.
    #[error("Store timeout: {store}")]
    StoreTimeout {
        /// Which store ("revocation", "identity")
        store: &'static str,
    },

    /// RNG failure or malformed crypto input. Always fatal for the request;
    /// logged at error level with no sensitive detail.
    #[error("Cryptographic operation failed")]
    CryptoError {
        /// Internal context for logs (never sent to clients)
        message: String,
    },

    /// PostgreSQL query failed. Details logged, generic message returned.
    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    /// Unspecified internal error. Use as last resort.
    #[error("Internal server error")]
    InternalError {
        /// Internal message for logging (not exposed to client)
        message: String,
    },
}

/// Redis failures are store failures: connection-level problems become
/// `StoreUnavailable`, response timeouts become `StoreTimeout`.
impl From<redis::RedisError> for ApiError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_timeout() {
            ApiError::StoreTimeout { store: "revocation" }
        } else {
            tracing::error!(error = %e, "Revocation store error");
            ApiError::StoreUnavailable { store: "revocation" }
        }
    }
}

// =============================================================================
// Error Methods
// =============================================================================

impl ApiError {
    /// Returns a machine-readable error code.
    ///
    /// These codes are stable and can be used by API clients for
    /// programmatic error handling: `CATEGORY_SPECIFIC_ERROR` in
    /// SCREAMING_SNAKE_CASE.
    pub fn error_code(&self) -> &'static str {
        match self {
            // Authentication
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::MfaRequired { .. } => "MFA_REQUIRED",
            Self::OtpInvalidOrExpired => "OTP_INVALID_OR_EXPIRED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenRevoked => "TOKEN_REVOKED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::AlgorithmDisallowed => "ALGORITHM_DISALLOWED",
            Self::InvalidClaim { .. } => "INVALID_CLAIM",
            Self::RefreshExpired => "REFRESH_EXPIRED",
            Self::SessionRevoked => "SESSION_REVOKED",
            Self::PasswordPolicyViolation { .. } => "PASSWORD_POLICY_VIOLATION",
            Self::EmailChangeTokenInvalid => "EMAIL_CHANGE_TOKEN_INVALID",
            Self::MissingAuth => "MISSING_AUTH",
            Self::AccountLocked { .. } => "ACCOUNT_LOCKED",
            // Authorization
            Self::ApiKeyInvalid => "API_KEY_INVALID",
            Self::ApiKeyRevoked => "API_KEY_REVOKED",
            Self::ScopeDenied { .. } => "SCOPE_DENIED",
            Self::TenantMismatch => "PERMISSION_DENIED",
            // Payment
            Self::PaymentMethodDeclined => "PAYMENT_METHOD_DECLINED",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::CardExpired => "CARD_EXPIRED",
            Self::ProcessorError => "PROCESSOR_ERROR",
            Self::SubscriptionNotFound => "SUBSCRIPTION_NOT_FOUND",
            Self::InvalidPlanTransition { .. } => "INVALID_PLAN_TRANSITION",
            Self::InvoiceAlreadyPaid => "INVOICE_ALREADY_PAID",
            Self::RefundFailed => "REFUND_FAILED",
            // Delivery
            Self::TemplateNotFound { .. } => "TEMPLATE_NOT_FOUND",
            Self::TemplateRenderError => "TEMPLATE_RENDER_ERROR",
            Self::DeliveryExhausted => "DELIVERY_EXHAUSTED",
            Self::WebhookSignatureInvalid => "WEBHOOK_SIGNATURE_INVALID",
            Self::WebhookUrlRejected { .. } => "WEBHOOK_URL_REJECTED",
            Self::HardBounce => "HARD_BOUNCE",
            Self::EmailRateLimited => "EMAIL_RATE_LIMITED",
            // Validation
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::IdempotencyKeyRequired => "IDEMPOTENCY_KEY_REQUIRED",
            // Resources
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            // Rate limiting
            Self::TooManyRequests { .. } => "TOO_MANY_REQUESTS",
            // Infrastructure
            Self::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            Self::StoreTimeout { .. } => "STORE_TIMEOUT",
            Self::CryptoError { .. } => "CRYPTO_ERROR",
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::InternalError { .. } => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    ///
    /// This is the source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 401 Unauthorized - all token-engine and credential failures
            // surface as a single wire-level "unauthenticated"
            Self::InvalidCredentials
            | Self::MfaRequired { .. }
            | Self::OtpInvalidOrExpired
            | Self::TokenExpired
            | Self::TokenRevoked
            | Self::InvalidSignature
            | Self::AlgorithmDisallowed
            | Self::InvalidClaim { .. }
            | Self::RefreshExpired
            | Self::SessionRevoked
            | Self::EmailChangeTokenInvalid
            | Self::MissingAuth
            | Self::AccountLocked { .. }
            | Self::ApiKeyInvalid
            | Self::ApiKeyRevoked
            | Self::WebhookSignatureInvalid => StatusCode::UNAUTHORIZED,

            // 403 Forbidden - authenticated but not authorized
            Self::ScopeDenied { .. } | Self::TenantMismatch => StatusCode::FORBIDDEN,

            // 402 Payment Required - gateway declined
            Self::PaymentMethodDeclined | Self::InsufficientFunds | Self::CardExpired => {
                StatusCode::PAYMENT_REQUIRED
            }

            // 400 Bad Request - client sent invalid data
            Self::ValidationError(_)
            | Self::BadRequest { .. }
            | Self::IdempotencyKeyRequired
            | Self::PasswordPolicyViolation { .. }
            | Self::WebhookUrlRejected { .. }
            | Self::HardBounce => StatusCode::BAD_REQUEST,

            // 404 Not Found
            Self::NotFound { .. } | Self::SubscriptionNotFound | Self::TemplateNotFound { .. } => {
                StatusCode::NOT_FOUND
            }

            // 409 Conflict - would violate state or uniqueness rules
            Self::Conflict { .. }
            | Self::InvalidPlanTransition { .. }
            | Self::InvoiceAlreadyPaid => StatusCode::CONFLICT,

            // 429 Too Many Requests
            Self::TooManyRequests { .. } | Self::EmailRateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }

            // 502 Bad Gateway - upstream processor failed
            Self::ProcessorError | Self::RefundFailed | Self::DeliveryExhausted => {
                StatusCode::BAD_GATEWAY
            }

            // 503/504 - backing stores
            Self::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::StoreTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            Self::CryptoError { .. }
            | Self::DatabaseError(_)
            | Self::TemplateRenderError
            | Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` if this is a server-side error (5xx).
    ///
    /// Server errors are logged at ERROR level and never expose internal
    /// details to clients. Client errors (4xx) are logged at WARN level.
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

// =============================================================================
// Response Structure
// =============================================================================

/// Standard error response body for the API.
///
/// ## Fields
///
/// - `code`: machine-readable error code (e.g., "SESSION_REVOKED")
/// - `message`: human-readable message (for debugging, not for UI)
/// - `correlation_id`: id for tracing the request across services
/// - `details`: additional context (validation errors, lock expiry, ...)
/// - `timestamp`: when the error occurred (ISO 8601)
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code for programmatic handling
    pub code: String,

    /// Human-readable message (for debugging, not for user display)
    pub message: String,

    /// Correlation id for tracing across services.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Additional error details (varies by error type).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// When the error occurred (ISO 8601 format)
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorResponse {
    /// Creates a new error response from an `ApiError`.
    ///
    /// Extracts type-specific details where they help the client act
    /// (validation fields, retry delay, lock expiry, MFA factors). Server
    /// errors never attach details.
    pub fn new(error: &ApiError) -> Self {
        let details = match error {
            ApiError::ValidationError(errors) => {
                Some(serde_json::to_value(errors).unwrap_or_default())
            }
            ApiError::PasswordPolicyViolation { violations } => {
                Some(serde_json::json!({ "violations": violations }))
            }
            ApiError::MfaRequired { factors } => {
                Some(serde_json::json!({ "factors": factors }))
            }
            ApiError::TooManyRequests { retry_after_seconds } => {
                Some(serde_json::json!({ "retry_after_seconds": retry_after_seconds }))
            }
            ApiError::AccountLocked { until } => {
                Some(serde_json::json!({ "locked_until": until }))
            }
            _ => None,
        };

        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            correlation_id: None,
            details,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Attaches a correlation id for cross-service tracing.
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id.to_string());
        self
    }
}

// =============================================================================
// Actix-web Integration
// =============================================================================

/// Allows returning `ApiError` directly from handlers; the error converts
/// to an HTTP response with the right status code and JSON body. A fresh
/// correlation id is minted here when the request did not carry one.
impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        if self.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "Request failed");
        }
        let response = ErrorResponse::new(self).with_correlation_id(Uuid::new_v4());
        HttpResponse::build(self.status_code()).json(response)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_failures_return_401() {
        assert_eq!(ApiError::InvalidCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::TokenRevoked.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::AlgorithmDisallowed.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::RefreshExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::SessionRevoked.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::InvalidClaim { field: "aud" }.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_authorization_errors_return_403() {
        assert_eq!(
            ApiError::ScopeDenied { scope: "write:upload".into() }.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::TenantMismatch.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_tenant_mismatch_is_permission_denied_not_not_found() {
        let err = ApiError::TenantMismatch;
        assert_eq!(err.error_code(), "PERMISSION_DENIED");
        assert_ne!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_payment_errors() {
        assert_eq!(
            ApiError::PaymentMethodDeclined.status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ApiError::InvalidPlanTransition { from: "canceled".into(), to: "active".into() }
                .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::SubscriptionNotFound.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_codes_are_screaming_snake_case() {
        assert_eq!(ApiError::InvalidCredentials.error_code(), "INVALID_CREDENTIALS");
        assert_eq!(ApiError::SessionRevoked.error_code(), "SESSION_REVOKED");
        assert_eq!(
            ApiError::WebhookUrlRejected { reason: "host" }.error_code(),
            "WEBHOOK_URL_REJECTED"
        );
    }

    #[test]
    fn test_server_errors_are_flagged() {
        assert!(ApiError::InternalError { message: "test".to_string() }.is_server_error());
        assert!(ApiError::StoreUnavailable { store: "revocation" }.is_server_error());
        assert!(ApiError::CryptoError { message: "rng".to_string() }.is_server_error());
        assert!(!ApiError::InvalidCredentials.is_server_error());
        assert!(!ApiError::TenantMismatch.is_server_error());
    }

    #[test]
    fn test_mfa_required_carries_factors() {
        let err = ApiError::MfaRequired { factors: vec!["totp", "backup_code"] };
        let response = ErrorResponse::new(&err);
        let details = response.details.expect("factors in details");
        assert_eq!(details["factors"][0], "totp");
    }

    #[test]
    fn test_error_response_with_correlation_id() {
        let error = ApiError::InvalidCredentials;
        let correlation_id = Uuid::new_v4();
        let response = ErrorResponse::new(&error).with_correlation_id(correlation_id);

        assert_eq!(response.correlation_id, Some(correlation_id.to_string()));
    }

    #[test]
    fn test_error_response_includes_timestamp() {
        let error = ApiError::InvalidCredentials;
        let response = ErrorResponse::new(&error);

        let now = chrono::Utc::now();
        let diff = now - response.timestamp;
        assert!(diff.num_seconds() < 60);
    }
}
