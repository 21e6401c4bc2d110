//! # API Layer
//!
//! HTTP surface of the authentication service.
//!
//! | Module       | Responsibility                                      |
//! |--------------|-----------------------------------------------------|
//! | `routes`     | Route definitions with actix-web's `configure()`    |
//! | `handlers`   | Request handlers (extractors -> service -> response)|
//! | `dto`        | Request/response contracts                          |
//!
//! ## Endpoint Summary
//!
//! | Method | Path | Auth |
//! |--------|------|------|
//! | POST | `/api/v1/auth/register` | No |
//! | POST | `/api/v1/auth/login` | No |
//! | POST | `/api/v1/auth/refresh` | No* |
//! | POST | `/api/v1/auth/logout` | Yes |
//! | POST | `/api/v1/auth/logout-all` | Yes |
//! | GET  | `/api/v1/auth/me` | Yes |
//! | POST | `/api/v1/auth/validate` | No (token in body; sidecar use) |
//! | POST | `/api/v1/auth/totp/enroll` | Yes |
//! | POST | `/api/v1/auth/totp/verify` | Yes |
//! | POST | `/api/v1/auth/totp/disable` | Yes |
//! | POST | `/api/v1/auth/totp/backup-codes` | Yes |
//! | POST | `/api/v1/auth/otp/send` | No |
//! | POST | `/api/v1/auth/otp/verify` | No |
//! | POST | `/api/v1/auth/email/change` | Yes |
//! | GET  | `/api/v1/auth/oauth/{provider}` | No |
//! | POST | `/api/v1/auth/oauth/{provider}/callback` | No |
//! | POST | `/api/v1/auth/forgot-password` | No |
//! | POST | `/api/v1/auth/reset-password` | No |
//! | POST | `/api/v1/api-keys` | Yes |
//! | GET  | `/api/v1/api-keys` | Yes |
//! | DELETE | `/api/v1/api-keys/{id}` | Yes |
//! | POST | `/api/v1/api-keys/validate` | No (key is the credential) |
//! | GET  | `/health` | No |
//!
//! *Requires a valid refresh token in the request body.

pub mod dto;
pub mod handlers;
pub mod routes;

use crate::service::{
    ApiKeyService, AuthService, OAuthService, OtpService, TokenService, TwoFactorService,
};
use shared::metrics::SecurityMetrics;
use std::sync::Arc;

/// Shared application state injected into all request handlers.
///
/// Wrapped in [`actix_web::web::Data`] by the binary. Every service is
/// cheap to clone (pool/Arc-based); the metrics handle is shared so the
/// scrape endpoint and the test suite read the same counters the
/// services increment.
pub struct AppState {
    pub auth_service: AuthService,
    pub token_service: TokenService,
    pub two_factor_service: TwoFactorService,
    pub otp_service: OtpService,
    pub oauth_service: OAuthService,
    pub api_key_service: ApiKeyService,
    pub metrics: Arc<SecurityMetrics>,
}
