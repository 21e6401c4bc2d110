//! # Two-Factor Service
//!
//! TOTP enrollment lifecycle and backup-code management.
//!
//! ## Enrollment Flow
//!
//! ```text
//! EnrollTotp ──▶ secret stored, totp_enabled = FALSE
//!                (secret + otpauth URL + backup codes shown ONCE)
//!       │
//!       ▼
//! VerifyTotp(code) ──first success──▶ totp_enabled = TRUE
//! ```
//!
//! The factor only becomes active once the user proves the authenticator
//! actually has the secret. Backup codes are generated at enrollment and
//! displayed exactly once; only their SHA-256 hashes persist, and they
//! stay inert until the factor is enabled.

use shared::crypto::totp;
use shared::errors::ApiError;
use tracing::info;
use uuid::Uuid;

use crate::domain::User;
use crate::repository::UserRepository;

/// Material returned once at enrollment. Never retrievable again.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotpEnrollment {
    /// Base32 secret for manual entry
    pub secret: String,
    /// otpauth:// URL for authenticator apps
    pub otpauth_url: String,
    /// Ten one-shot backup codes
    pub backup_codes: Vec<String>,
}

/// Two-factor enrollment and management.
#[derive(Clone)]
pub struct TwoFactorService {
    repository: UserRepository,
    /// Issuer label shown in authenticator apps
    issuer: String,
}

impl TwoFactorService {
    pub fn new(repository: UserRepository, issuer: String) -> Self {
        Self { repository, issuer }
    }

    async fn load_user(&self, user_id: Uuid) -> Result<User, ApiError> {
        self.repository
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound { resource: format!("user:{}", user_id) })
    }

    // =========================================================================
    // ENROLLMENT
    // =========================================================================

    /// Starts TOTP enrollment: generates the secret and backup codes,
    /// stores the secret (inactive) and the code hashes, and returns the
    /// one-time display material.
    pub async fn enroll(&self, user_id: Uuid) -> Result<TotpEnrollment, ApiError> {
        let user = self.load_user(user_id).await?;

        if user.totp_enabled {
            return Err(ApiError::Conflict {
                resource: "totp already enabled".to_string(),
            });
        }

        let secret = totp::generate_totp_secret()?;
        let otpauth_url = totp::build_otpauth_url(&secret, &user.email, &self.issuer);
        let backup_codes = totp::generate_backup_codes(totp::BACKUP_CODE_BATCH)?;
        let hashes: Vec<String> = backup_codes.iter().map(|c| totp::hash_backup_code(c)).collect();

        self.repository.store_pending_totp_secret(user_id, &secret).await?;
        self.repository
            .replace_backup_codes(user.tenant_id, user_id, &hashes)
            .await?;

        info!(user_id = %user_id, "TOTP enrollment started");

        Ok(TotpEnrollment { secret, otpauth_url, backup_codes })
    }

    /// Commits enrollment on the first successful code verification.
    pub async fn verify(&self, user_id: Uuid, code: &str) -> Result<(), ApiError> {
        let user = self.load_user(user_id).await?;

        let secret = user
            .totp_secret
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest {
                message: "No enrollment in progress".to_string(),
            })?;

        if !totp::validate_totp_code(secret, code, totp::TOTP_DEFAULT_WINDOW) {
            return Err(ApiError::OtpInvalidOrExpired);
        }

        self.repository.enable_totp(user_id).await?;

        info!(user_id = %user_id, event = "auth.totp_enabled", "TOTP enabled");

        Ok(())
    }

    // =========================================================================
    // DISABLE / REGENERATE
    // =========================================================================

    /// Disables the second factor. Requires a currently valid TOTP or
    /// backup code so a hijacked session can't silently weaken the
    /// account. Clears the secret and invalidates all backup codes.
    pub async fn disable(&self, user_id: Uuid, code: &str) -> Result<(), ApiError> {
        let user = self.load_user(user_id).await?;

        if !user.totp_enabled {
            return Err(ApiError::BadRequest {
                message: "TOTP is not enabled".to_string(),
            });
        }

        self.check_factor(&user, code, true).await?;

        self.repository.disable_totp(user_id).await?;
        self.repository.delete_backup_codes(user_id).await?;

        info!(user_id = %user_id, event = "auth.totp_disabled", "TOTP disabled");

        Ok(())
    }

    /// Issues a fresh batch of ten backup codes, invalidating every
    /// prior code. Requires a TOTP code - not a backup code, since the
    /// remaining codes are exactly what a caller without the
    /// authenticator would be trying to replace.
    pub async fn regenerate_backup_codes(
        &self,
        user_id: Uuid,
        totp_code: &str,
    ) -> Result<Vec<String>, ApiError> {
        let user = self.load_user(user_id).await?;

        if !user.totp_enabled {
            return Err(ApiError::BadRequest {
                message: "TOTP is not enabled".to_string(),
            });
        }

        self.check_factor(&user, totp_code, false).await?;

        let backup_codes = totp::generate_backup_codes(totp::BACKUP_CODE_BATCH)?;
        let hashes: Vec<String> = backup_codes.iter().map(|c| totp::hash_backup_code(c)).collect();
        self.repository
            .replace_backup_codes(user.tenant_id, user_id, &hashes)
            .await?;

        info!(user_id = %user_id, "Backup codes regenerated");

        Ok(backup_codes)
    }

    /// Validates a TOTP code, optionally accepting a backup code.
    async fn check_factor(
        &self,
        user: &User,
        code: &str,
        allow_backup: bool,
    ) -> Result<(), ApiError> {
        let secret = user.totp_secret.as_deref().ok_or(ApiError::OtpInvalidOrExpired)?;

        if totp::validate_totp_code(secret, code, totp::TOTP_DEFAULT_WINDOW) {
            return Ok(());
        }

        if allow_backup && totp::is_backup_code_format(code) {
            let candidates = self.repository.list_unused_backup_codes(user.user_id).await?;
            for candidate in candidates {
                if totp::verify_backup_code(code, &candidate.code_hash) {
                    let consumed = self
                        .repository
                        .mark_backup_code_used(candidate.backup_code_id)
                        .await?;
                    if consumed {
                        return Ok(());
                    }
                    break;
                }
            }
        }

        Err(ApiError::OtpInvalidOrExpired)
    }
}

#[cfg(test)]
mod tests {
    // Enrollment flows need the database; see tests/auth_flow_tests.rs.
    // The TOTP and backup-code primitives are covered in
    // shared::crypto::totp.
}
