//! # Authentication Service
//!
//! Core business logic for signup, login (including the second factor),
//! and session termination.
//!
//! ## Security Model
//!
//! | Concern | Mechanism |
//! |---------|-----------|
//! | Credential stuffing | 20 failures / 2 min -> 15 min account lock |
//! | Enumeration | identical `InvalidCredentials` for unknown account and wrong password |
//! | Second factor | TOTP (±1 step) or one-shot backup code |
//! | Session kill | refresh-index delete + access-token blacklist |
//!
//! The failed-login counter lives in the revocation store and is
//! incremented on the same round trip as the check. Rate-limit paths fail
//! open on store outage (availability over strict enforcement) with a
//! counter; the blacklist path in [`TokenService`] is the one that fails
//! closed.

use chrono::{Duration as ChronoDuration, Utc};
use shared::crypto::password::{PasswordHasher, PasswordPolicy};
use shared::crypto::totp;
use shared::errors::ApiError;
use shared::metrics::SecurityMetrics;
use shared::revocation::RevocationStore;
use shared::token::AccessClaims;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{NewUser, User, UserProfile};
use crate::repository::UserRepository;
use crate::service::token_service::{TokenPair, TokenService};

/// Failed password attempts inside the window that trigger a lock.
const LOCK_THRESHOLD: i64 = 20;
/// Window the failure counter lives in.
const FAILURE_WINDOW: Duration = Duration::from_secs(2 * 60);
/// Lock duration once the threshold is hit.
const LOCK_DURATION: Duration = Duration::from_secs(15 * 60);

/// Response returned after successful authentication.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Access and refresh tokens
    #[serde(flatten)]
    pub tokens: TokenPair,
    /// User profile (safe for client)
    pub user: UserProfile,
}

/// Authentication service.
///
/// `Send + Sync`; internal components are pool- or Arc-based.
#[derive(Clone)]
pub struct AuthService {
    repository: UserRepository,
    tokens: TokenService,
    password_hasher: Arc<PasswordHasher>,
    store: RevocationStore,
    metrics: Arc<SecurityMetrics>,
}

impl AuthService {
    pub fn new(
        repository: UserRepository,
        tokens: TokenService,
        password_hasher: Arc<PasswordHasher>,
        store: RevocationStore,
        metrics: Arc<SecurityMetrics>,
    ) -> Self {
        Self { repository, tokens, password_hasher, store, metrics }
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Registers a new user.
    ///
    /// With `tenant_id` the user joins an existing tenant; without it a
    /// fresh tenant is bootstrapped and the user becomes its admin.
    ///
    /// # Process
    ///
    /// 1. Check the password against the platform policy (before hashing)
    /// 2. Resolve or create the tenant
    /// 3. Hash with Argon2id, insert the user
    /// 4. Mint a token pair
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        tenant_id: Option<Uuid>,
        tenant_name: Option<&str>,
    ) -> Result<AuthResponse, ApiError> {
        if let Err(violations) = PasswordPolicy::validate(password) {
            return Err(ApiError::PasswordPolicyViolation { violations });
        }

        let (tenant_id, roles) = match tenant_id {
            Some(id) => {
                self.repository
                    .find_tenant(id)
                    .await?
                    .ok_or_else(|| ApiError::NotFound { resource: format!("tenant:{}", id) })?;
                (id, vec!["member".to_string()])
            }
            None => {
                let name = tenant_name.unwrap_or(email);
                let tenant = self.repository.create_tenant(name).await?;
                info!(tenant_id = %tenant.tenant_id, "Tenant bootstrapped on first signup");
                (tenant.tenant_id, vec!["admin".to_string(), "member".to_string()])
            }
        };

        let password_hash = self.password_hasher.hash(password)?;

        let user = self
            .repository
            .create(NewUser {
                tenant_id,
                email: email.to_string(),
                password_hash: Some(password_hash),
                roles,
                email_verified: false,
            })
            .await?;

        info!(user_id = %user.user_id, tenant_id = %tenant_id, "User registered");

        let tokens = self.tokens.issue_pair(&user).await?;

        Ok(AuthResponse { tokens, user: user.into() })
    }

    // =========================================================================
    // LOGIN
    // =========================================================================

    /// Authenticates a user with email, password, and (when enrolled) a
    /// second factor.
    ///
    /// # Security
    ///
    /// - Unknown account and wrong password produce the identical
    ///   `InvalidCredentials` (enumeration defense)
    /// - Failed attempts count toward the account lock; the increment and
    ///   the threshold check happen on one store round trip
    /// - With TOTP enrolled and no code supplied, answers `MfaRequired`
    ///   so clients can prompt for the factor
    pub async fn login(
        &self,
        tenant_id: Uuid,
        email: &str,
        password: &str,
        totp_code: Option<&str>,
    ) -> Result<AuthResponse, ApiError> {
        let user = self
            .repository
            .find_by_email(tenant_id, email)
            .await?
            .ok_or_else(|| {
                warn!(email = %email, "Login attempt for unknown account");
                ApiError::InvalidCredentials
            })?;

        self.check_lock(&user).await?;

        let password_hash = user
            .password_hash
            .as_deref()
            // OAuth-only account: no password to verify against
            .ok_or(ApiError::InvalidCredentials)?;

        if !self.password_hasher.verify(password, password_hash)? {
            return Err(self.record_failure(&user).await);
        }

        if user.requires_mfa() {
            let code = totp_code.ok_or(ApiError::MfaRequired {
                factors: vec!["totp", "backup_code"],
            })?;
            self.verify_second_factor(&user, code).await?;
        }

        self.clear_failures(&user).await;
        self.repository.update_last_login(user.user_id).await?;

        info!(user_id = %user.user_id, tenant_id = %user.tenant_id, "User logged in");

        let tokens = self.tokens.issue_pair(&user).await?;

        Ok(AuthResponse { tokens, user: user.into() })
    }

    /// Rejects the attempt outright while the account is locked.
    async fn check_lock(&self, user: &User) -> Result<(), ApiError> {
        match self.store.login_failure_count(&user.user_id).await {
            Ok(count) if count >= LOCK_THRESHOLD => {
                let remaining = self
                    .store
                    .login_lock_remaining(&user.user_id)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or(LOCK_DURATION.as_secs() as i64);
                Err(ApiError::AccountLocked {
                    until: Utc::now() + ChronoDuration::seconds(remaining),
                })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                // Rate limiting fails open
                SecurityMetrics::incr(&self.metrics.rate_limit_fail_open_total);
                warn!(error = %e, "Lock check unavailable; failing open");
                Ok(())
            }
        }
    }

    /// Records a failed attempt; locks the account at the threshold.
    async fn record_failure(&self, user: &User) -> ApiError {
        match self
            .store
            .record_login_failure(&user.user_id, FAILURE_WINDOW)
            .await
        {
            Ok(count) if count >= LOCK_THRESHOLD => {
                // The AuthRateLimit audit event must land within 200 ms
                // of the lock; it is written synchronously right here
                if let Err(e) = self.store.lock_account(&user.user_id, LOCK_DURATION).await {
                    warn!(error = %e, "Failed to extend lock window");
                }
                let until = Utc::now() + ChronoDuration::seconds(LOCK_DURATION.as_secs() as i64);
                SecurityMetrics::incr(&self.metrics.auth_rate_limit_total);
                warn!(
                    user_id = %user.user_id,
                    tenant_id = %user.tenant_id,
                    event = "auth.rate_limit",
                    locked_until = %until,
                    "Account locked after repeated failures"
                );
                ApiError::AccountLocked { until }
            }
            Ok(_) => ApiError::InvalidCredentials,
            Err(e) => {
                SecurityMetrics::incr(&self.metrics.rate_limit_fail_open_total);
                warn!(error = %e, "Failure counter unavailable; failing open");
                ApiError::InvalidCredentials
            }
        }
    }

    async fn clear_failures(&self, user: &User) {
        if let Err(e) = self.store.reset_login_failures(&user.user_id).await {
            warn!(error = %e, "Failed to clear login-failure counter");
        }
    }

    /// Validates the second factor: a TOTP code first, then a one-shot
    /// backup code.
    async fn verify_second_factor(&self, user: &User, code: &str) -> Result<(), ApiError> {
        let secret = user
            .totp_secret
            .as_deref()
            // Invariant: totp_enabled implies a secret; treat violation
            // as unverifiable rather than panicking
            .ok_or(ApiError::OtpInvalidOrExpired)?;

        if totp::validate_totp_code(secret, code, totp::TOTP_DEFAULT_WINDOW) {
            return Ok(());
        }

        if totp::is_backup_code_format(code) {
            return self.consume_backup_code(user, code).await;
        }

        Err(ApiError::OtpInvalidOrExpired)
    }

    /// Burns a matching backup code - strictly at-most-once. The
    /// compare-and-set on `used_at` is what guarantees a code that two
    /// racing logins present succeeds for exactly one of them.
    async fn consume_backup_code(&self, user: &User, code: &str) -> Result<(), ApiError> {
        let candidates = self.repository.list_unused_backup_codes(user.user_id).await?;

        for candidate in candidates {
            if totp::verify_backup_code(code, &candidate.code_hash) {
                let consumed = self
                    .repository
                    .mark_backup_code_used(candidate.backup_code_id)
                    .await?;
                if consumed {
                    info!(user_id = %user.user_id, "Backup code consumed");
                    return Ok(());
                }
                // Lost the race; the code is already burned
                return Err(ApiError::OtpInvalidOrExpired);
            }
        }

        Err(ApiError::OtpInvalidOrExpired)
    }

    // =========================================================================
    // LOGOUT
    // =========================================================================

    /// Ends the presenting session: refresh-index delete plus access
    /// token blacklist (see [`TokenService::revoke`]).
    pub async fn logout(&self, claims: &AccessClaims) -> Result<(), ApiError> {
        self.tokens.revoke(claims).await?;
        info!(user_id = %claims.sub, "User logged out");
        Ok(())
    }

    /// Ends every session for the user and blacklists the presenting
    /// access token.
    pub async fn logout_all(&self, claims: &AccessClaims) -> Result<(), ApiError> {
        self.tokens.revoke(claims).await?;
        self.tokens.revoke_all_sessions(claims.sub).await?;
        info!(user_id = %claims.sub, "User logged out of all sessions");
        Ok(())
    }

    // =========================================================================
    // PROFILE
    // =========================================================================

    pub async fn get_profile(&self, user_id: Uuid) -> Result<UserProfile, ApiError> {
        let user = self
            .repository
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound { resource: format!("user:{}", user_id) })?;

        Ok(user.into())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_constants_match_policy() {
        assert_eq!(LOCK_THRESHOLD, 20);
        assert_eq!(FAILURE_WINDOW, Duration::from_secs(120));
        assert_eq!(LOCK_DURATION, Duration::from_secs(900));
    }

    // Login/logout flows against real stores live in
    // tests/auth_flow_tests.rs (#[ignore]d).
}
