//! # Out-of-Band OTP and Password Reset
//!
//! Six-digit one-time passwords delivered over email, and the reset flow
//! built on the same store primitives.
//!
//! ## Guarantees
//!
//! | Property | Mechanism |
//! |----------|-----------|
//! | Single active code per (user, purpose) | store overwrite on issue |
//! | One-time use | delete-if-present on match; only the deleter wins |
//! | Online brute force | code deleted after 5 failed attempts |
//! | Issuance abuse | 3 per hour per email address |
//! | Enumeration | identical response whether or not the email exists |

use shared::crypto::random;
use shared::crypto::signing;
use shared::crypto::password::{PasswordHasher, PasswordPolicy};
use shared::errors::ApiError;
use shared::revocation::{OtpPurpose, RevocationStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::repository::UserRepository;
use crate::service::email_port::{EmailEnqueuer, OutboundEmail};
use crate::service::token_service::TokenService;

/// OTP lifetime.
const OTP_TTL: Duration = Duration::from_secs(10 * 60);
/// Issuances allowed per email per window.
const OTP_RATE_LIMIT: i64 = 3;
/// Issuance window.
const OTP_RATE_WINDOW: Duration = Duration::from_secs(60 * 60);
/// Failed verifications before the code is burned.
const OTP_MAX_ATTEMPTS: i64 = 5;
/// Reset-token lifetime.
const RESET_TTL: Duration = Duration::from_secs(60 * 60);

/// OTP issuance/verification and the password-reset flow.
#[derive(Clone)]
pub struct OtpService {
    repository: UserRepository,
    store: RevocationStore,
    tokens: TokenService,
    password_hasher: Arc<PasswordHasher>,
    mailer: Arc<dyn EmailEnqueuer>,
}

impl OtpService {
    pub fn new(
        repository: UserRepository,
        store: RevocationStore,
        tokens: TokenService,
        password_hasher: Arc<PasswordHasher>,
        mailer: Arc<dyn EmailEnqueuer>,
    ) -> Self {
        Self { repository, store, tokens, password_hasher, mailer }
    }

    // =========================================================================
    // OTP ISSUE / VERIFY
    // =========================================================================

    /// Issues a six-digit code for `(email, purpose)` and hands it to the
    /// delivery queue.
    ///
    /// The response is identical whether or not the address has an
    /// account; the rate limit applies either way so the endpoint can't
    /// be used as an oracle.
    pub async fn send_otp(&self, email: &str, purpose: OtpPurpose) -> Result<(), ApiError> {
        let issued = self.store.incr_otp_rate(email, OTP_RATE_WINDOW).await?;
        if issued > OTP_RATE_LIMIT {
            return Err(ApiError::EmailRateLimited);
        }

        let user = match self.repository.find_by_email_global(email).await? {
            Some(user) => user,
            None => {
                info!(purpose = purpose.as_str(), "OTP requested for unknown address");
                return Ok(());
            }
        };

        let code = random::random_digits(6)?;
        self.store
            .store_otp(&user.user_id, purpose, &code, OTP_TTL)
            .await?;

        self.mailer
            .enqueue(OutboundEmail {
                tenant_id: Some(user.tenant_id),
                recipient: email.to_string(),
                template_id: format!("otp_{}", purpose.as_str()),
                variables: serde_json::json!({ "code": code, "ttl_minutes": 10 }),
                priority: 8,
            })
            .await?;

        info!(user_id = %user.user_id, purpose = purpose.as_str(), "OTP issued");

        Ok(())
    }

    /// Verifies a code. Constant-time comparison; the code is consumed on
    /// match and burned after too many mismatches.
    pub async fn verify_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<Uuid, ApiError> {
        let user = self
            .repository
            .find_by_email_global(email)
            .await?
            .ok_or(ApiError::OtpInvalidOrExpired)?;

        let stored = self
            .store
            .peek_otp(&user.user_id, purpose)
            .await?
            .ok_or(ApiError::OtpInvalidOrExpired)?;

        if signing::constant_time_eq(stored.as_bytes(), code.as_bytes()) {
            // One-time use: only the caller that actually deletes the
            // key succeeds
            let consumed = self.store.delete_otp(&user.user_id, purpose).await?;
            if consumed {
                return Ok(user.user_id);
            }
            return Err(ApiError::OtpInvalidOrExpired);
        }

        let attempts = self
            .store
            .record_otp_attempt(&user.user_id, purpose, OTP_TTL)
            .await?;
        if attempts >= OTP_MAX_ATTEMPTS {
            self.store.delete_otp(&user.user_id, purpose).await?;
            warn!(user_id = %user.user_id, "OTP burned after repeated failures");
        }

        Err(ApiError::OtpInvalidOrExpired)
    }

    /// Completes an email change after the new address proved control via
    /// an `email_change` OTP sent to it.
    pub async fn confirm_email_change(
        &self,
        user_id: Uuid,
        new_email: &str,
        code: &str,
    ) -> Result<(), ApiError> {
        // The OTP was issued to (and verified against) the new address
        match self.verify_otp(new_email, OtpPurpose::EmailChange, code).await {
            Ok(_) => {}
            Err(ApiError::OtpInvalidOrExpired) => return Err(ApiError::EmailChangeTokenInvalid),
            Err(other) => return Err(other),
        }

        self.repository.update_email(user_id, new_email).await?;
        info!(user_id = %user_id, "Email changed");
        Ok(())
    }

    // =========================================================================
    // PASSWORD RESET
    // =========================================================================

    /// Starts a reset: 32-byte token, 1-hour TTL, delivery handoff.
    /// The response is uniform regardless of account existence.
    pub async fn request_reset(&self, email: &str) -> Result<(), ApiError> {
        let user = match self.repository.find_by_email_global(email).await? {
            Some(user) => user,
            None => {
                info!("Password reset requested for unknown address");
                return Ok(());
            }
        };

        let token = random::random_hex(32)?;
        self.store.store_reset_token(&token, email, RESET_TTL).await?;

        self.mailer
            .enqueue(OutboundEmail {
                tenant_id: Some(user.tenant_id),
                recipient: email.to_string(),
                template_id: "password_reset".to_string(),
                variables: serde_json::json!({ "token": token, "ttl_minutes": 60 }),
                priority: 8,
            })
            .await?;

        info!(user_id = %user.user_id, "Password reset token issued");

        Ok(())
    }

    /// Completes a reset: consumes the token (one-time), enforces the
    /// password policy, rewrites the hash, and voids every outstanding
    /// session for the account.
    pub async fn confirm_reset(&self, token: &str, new_password: &str) -> Result<(), ApiError> {
        let email = self
            .store
            .take_reset_token(token)
            .await?
            .ok_or(ApiError::OtpInvalidOrExpired)?;

        let user = self
            .repository
            .find_by_email_global(&email)
            .await?
            .ok_or(ApiError::OtpInvalidOrExpired)?;

        if let Err(violations) = PasswordPolicy::validate(new_password) {
            return Err(ApiError::PasswordPolicyViolation { violations });
        }

        let password_hash = self.password_hasher.hash(new_password)?;
        self.repository
            .update_password(user.user_id, &password_hash)
            .await?;

        // Every session dies with the old password. Access tokens are
        // not pre-registered, so the refresh index is the complete
        // revocable session state.
        self.tokens.revoke_all_sessions(user.user_id).await?;

        info!(
            user_id = %user.user_id,
            event = "auth.password_reset_completed",
            "Password reset completed"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_constants() {
        assert_eq!(OTP_TTL, Duration::from_secs(600));
        assert_eq!(OTP_RATE_LIMIT, 3);
        assert_eq!(OTP_RATE_WINDOW, Duration::from_secs(3600));
        assert_eq!(RESET_TTL, Duration::from_secs(3600));
    }

    // Issue/verify round trips need Redis; see tests/auth_flow_tests.rs.
}
