//! # Request Handlers
//!
//! HTTP handlers bridging the API layer with the service layer. Each
//! handler follows the same pattern:
//!
//! 1. **Extract** request data using Actix extractors
//! 2. **Validate** input (`shared::validation`)
//! 3. **Authenticate** where required - the bearer token is re-validated
//!    here even behind the edge (defense in depth); identity comes only
//!    from the validated claims, never from propagation headers
//! 4. **Call** the service layer and return the JSON response
//!
//! All handlers return `Result<HttpResponse, ApiError>`; the error type
//! maps itself onto the wire contract.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use shared::errors::ApiError;
use shared::identity::{bearer_token, Caller};
use shared::revocation::OtpPurpose;
use shared::token::AccessClaims;
use shared::validation;
use uuid::Uuid;

use crate::api::AppState;
use crate::domain::OAuthProvider;

use super::dto::{
    BackupCodesResponse, ChangeEmailRequest, ClaimsResponse, CreateApiKeyRequest,
    DisableTotpRequest, ForgotPasswordRequest, HealthResponse, LoginRequest, LogoutRequest,
    OAuthCallbackRequest, RefreshTokenRequest, RegenerateBackupCodesRequest, RegisterRequest,
    ResetPasswordRequest, SendOtpRequest, ValidateApiKeyRequest, ValidateTokenRequest,
    VerifyOtpRequest, VerifyTotpRequest,
};

// =============================================================================
// AUTH EXTRACTION
// =============================================================================

/// Re-validates the bearer token on arrival and builds the caller
/// identity from its claims. Backend services MUST NOT trust the
/// `x-aegis-*` propagation headers for authentication.
async fn authenticate(
    req: &HttpRequest,
    state: &AppState,
) -> Result<(AccessClaims, Caller), ApiError> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::MissingAuth)?;

    let token = bearer_token(header)?;
    let claims = state.token_service.validate(token).await?;
    let caller = Caller::from_claims(&claims);

    Ok((claims, caller))
}

fn parse_purpose(raw: &str) -> Result<OtpPurpose, ApiError> {
    raw.parse()
}

fn parse_provider(raw: &str) -> Result<OAuthProvider, ApiError> {
    raw.parse()
        .map_err(|message| ApiError::BadRequest { message })
}

// =============================================================================
// HEALTH
// =============================================================================

/// `GET /health` - liveness for load balancers and monitors.
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: "auth-service".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

// =============================================================================
// REGISTRATION / LOGIN / SESSION
// =============================================================================

/// `POST /api/v1/auth/register`
pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let response = state
        .auth_service
        .register(
            &body.email,
            &body.password,
            body.tenant_id,
            body.tenant_name.as_deref(),
        )
        .await?;

    Ok(HttpResponse::Created().json(response))
}

/// `POST /api/v1/auth/login`
///
/// Returns the token pair, or `MFA_REQUIRED` (401 with the factor list)
/// when the account has a second factor and no code was supplied.
pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let response = state
        .auth_service
        .login(
            body.tenant_id,
            &body.email,
            &body.password,
            body.totp_code.as_deref(),
        )
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

/// `POST /api/v1/auth/refresh` - rotation with reuse detection.
pub async fn refresh_token(
    state: web::Data<AppState>,
    body: web::Json<RefreshTokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let pair = state.token_service.refresh(&body.refresh_token).await?;

    Ok(HttpResponse::Ok().json(pair))
}

/// `POST /api/v1/auth/logout` - blacklists the access token and deletes
/// the refresh index entry.
pub async fn logout(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LogoutRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let (claims, _caller) = authenticate(&req, &state).await?;
    state.auth_service.logout(&claims).await?;

    Ok(HttpResponse::Ok().json(super::dto::MessageResponse::new("Logged out")))
}

/// `POST /api/v1/auth/logout-all`
pub async fn logout_all(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let (claims, _caller) = authenticate(&req, &state).await?;
    state.auth_service.logout_all(&claims).await?;

    Ok(HttpResponse::Ok().json(super::dto::MessageResponse::new("All sessions terminated")))
}

/// `GET /api/v1/auth/me`
pub async fn get_profile(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let (_claims, caller) = authenticate(&req, &state).await?;
    let profile = state.auth_service.get_profile(caller.user_id).await?;

    Ok(HttpResponse::Ok().json(profile))
}

/// `POST /api/v1/auth/validate` - full validation (signature, claims,
/// blacklist) for external sidecars.
pub async fn validate_token(
    state: web::Data<AppState>,
    body: web::Json<ValidateTokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let claims = state.token_service.validate(&body.token).await?;

    Ok(HttpResponse::Ok().json(ClaimsResponse {
        user_id: claims.sub,
        tenant_id: claims.tenant_id,
        email: claims.email,
        roles: claims.roles,
        expires_at: claims.exp,
    }))
}

// =============================================================================
// TWO-FACTOR
// =============================================================================

/// `POST /api/v1/auth/totp/enroll` - returns secret, otpauth URL, and
/// backup codes exactly once.
pub async fn enroll_totp(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let (_claims, caller) = authenticate(&req, &state).await?;
    let enrollment = state.two_factor_service.enroll(caller.user_id).await?;

    Ok(HttpResponse::Ok().json(enrollment))
}

/// `POST /api/v1/auth/totp/verify` - commits enrollment on first success.
pub async fn verify_totp(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<VerifyTotpRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let (_claims, caller) = authenticate(&req, &state).await?;
    state.two_factor_service.verify(caller.user_id, &body.code).await?;

    Ok(HttpResponse::Ok().json(super::dto::MessageResponse::new("Two-factor enabled")))
}

/// `POST /api/v1/auth/totp/disable`
pub async fn disable_totp(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<DisableTotpRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let (_claims, caller) = authenticate(&req, &state).await?;
    state.two_factor_service.disable(caller.user_id, &body.code).await?;

    Ok(HttpResponse::Ok().json(super::dto::MessageResponse::new("Two-factor disabled")))
}

/// `POST /api/v1/auth/totp/backup-codes` - regenerates the batch,
/// invalidating all prior codes.
pub async fn regenerate_backup_codes(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<RegenerateBackupCodesRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let (_claims, caller) = authenticate(&req, &state).await?;
    let backup_codes = state
        .two_factor_service
        .regenerate_backup_codes(caller.user_id, &body.code)
        .await?;

    Ok(HttpResponse::Ok().json(BackupCodesResponse { backup_codes }))
}

// =============================================================================
// OTP / EMAIL CHANGE
// =============================================================================

/// `POST /api/v1/auth/otp/send` - uniform response regardless of account
/// existence.
pub async fn send_otp(
    state: web::Data<AppState>,
    body: web::Json<SendOtpRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let purpose = parse_purpose(&body.purpose)?;
    state.otp_service.send_otp(&body.email, purpose).await?;

    Ok(HttpResponse::Ok().json(super::dto::MessageResponse::new(
        "If the address exists, a code has been sent",
    )))
}

/// `POST /api/v1/auth/otp/verify`
pub async fn verify_otp(
    state: web::Data<AppState>,
    body: web::Json<VerifyOtpRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let purpose = parse_purpose(&body.purpose)?;
    state
        .otp_service
        .verify_otp(&body.email, purpose, &body.code)
        .await?;

    Ok(HttpResponse::Ok().json(super::dto::MessageResponse::new("Code accepted")))
}

/// `POST /api/v1/auth/email/change` - completes an email change after
/// the new address proved control via OTP.
pub async fn change_email(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ChangeEmailRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let (_claims, caller) = authenticate(&req, &state).await?;
    state
        .otp_service
        .confirm_email_change(caller.user_id, &body.new_email, &body.code)
        .await?;

    Ok(HttpResponse::Ok().json(super::dto::MessageResponse::new("Email updated")))
}

// =============================================================================
// OAUTH
// =============================================================================

/// `GET /api/v1/auth/oauth/{provider}` - returns the authorization URL
/// and the one-time state.
pub async fn oauth_initiate(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let provider = parse_provider(&path.into_inner())?;
    let initiation = state.oauth_service.initiate(provider).await?;

    Ok(HttpResponse::Ok().json(initiation))
}

/// `POST /api/v1/auth/oauth/{provider}/callback`
pub async fn oauth_callback(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<OAuthCallbackRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let provider = parse_provider(&path.into_inner())?;
    let response = state
        .oauth_service
        .handle_callback(provider, &body.code, &body.state)
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

// =============================================================================
// PASSWORD RESET
// =============================================================================

/// `POST /api/v1/auth/forgot-password` - uniform response (enumeration
/// defense).
pub async fn forgot_password(
    state: web::Data<AppState>,
    body: web::Json<ForgotPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    state.otp_service.request_reset(&body.email).await?;

    Ok(HttpResponse::Ok().json(super::dto::MessageResponse::new(
        "If the address exists, a reset link has been sent",
    )))
}

/// `POST /api/v1/auth/reset-password`
pub async fn reset_password(
    state: web::Data<AppState>,
    body: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    state
        .otp_service
        .confirm_reset(&body.token, &body.new_password)
        .await?;

    Ok(HttpResponse::Ok().json(super::dto::MessageResponse::new("Password updated")))
}

// =============================================================================
// API KEYS
// =============================================================================

/// `POST /api/v1/api-keys` - the full key string appears only in this
/// response.
pub async fn create_api_key(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreateApiKeyRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let (_claims, caller) = authenticate(&req, &state).await?;
    let created = state
        .api_key_service
        .create(&caller, &body.name, body.scopes, body.expires_at)
        .await?;

    Ok(HttpResponse::Created().json(created))
}

/// `GET /api/v1/api-keys`
pub async fn list_api_keys(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let (_claims, caller) = authenticate(&req, &state).await?;
    let keys = state.api_key_service.list(&caller).await?;

    Ok(HttpResponse::Ok().json(keys))
}

/// `DELETE /api/v1/api-keys/{id}` - tenant-guarded soft revoke.
pub async fn revoke_api_key(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let (_claims, caller) = authenticate(&req, &state).await?;
    state
        .api_key_service
        .revoke(&caller, path.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(super::dto::MessageResponse::new("API key revoked")))
}

/// `POST /api/v1/api-keys/validate` - the key itself is the credential.
pub async fn validate_api_key(
    state: web::Data<AppState>,
    body: web::Json<ValidateApiKeyRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let identity = state
        .api_key_service
        .validate_key(&body.key, &body.scope)
        .await?;

    Ok(HttpResponse::Ok().json(identity))
}
