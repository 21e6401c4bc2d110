//! # User Repository
//!
//! Database operations for tenants, users, OAuth account links, and
//! backup codes.
//!
//! ## Query Patterns
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────────────────────────┐
//! │ Soft delete      │ WHERE deleted_at IS NULL                         │
//! │ Tenant scoping   │ WHERE tenant_id = $1 AND ...                     │
//! │ One-shot updates │ UPDATE ... WHERE used_at IS NULL (rows_affected) │
//! │ Returning        │ INSERT ... RETURNING * (generated fields)        │
//! └──────────────────┴──────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    BackupCode, NewOAuthAccount, NewUser, OAuthAccount, OAuthProvider, Tenant, User,
};

/// Repository for user-related database operations.
///
/// `Send + Sync` because `PgPool` is Arc-based; safe to share across
/// workers.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // TENANT OPERATIONS
    // =========================================================================

    /// Creates a tenant (first signup bootstraps one).
    pub async fn create_tenant(&self, name: &str) -> Result<Tenant, ApiError> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (name)
            VALUES ($1)
            RETURNING *
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(tenant)
    }

    pub async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ApiError> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT * FROM tenants WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }

    // =========================================================================
    // USER OPERATIONS
    // =========================================================================

    /// Creates a new user.
    ///
    /// ## Errors
    ///
    /// `ApiError::Conflict` if the email is already registered in the
    /// tenant.
    pub async fn create(&self, new_user: NewUser) -> Result<User, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (tenant_id, email, password_hash, roles, email_verified)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(new_user.tenant_id)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.roles)
        .bind(new_user.email_verified)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint() == Some("users_tenant_email_key") {
                    return ApiError::Conflict { resource: "email".to_string() };
                }
            }
            ApiError::DatabaseError(e)
        })?;

        Ok(user)
    }

    /// Finds a live user by email within a tenant.
    pub async fn find_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE tenant_id = $1 AND email = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(tenant_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Finds a live user by email across tenants.
    ///
    /// Used by the flows that are keyed by email alone (OTP delivery,
    /// password reset); deployments hosting the same address in several
    /// tenants must scope those flows at the edge.
    pub async fn find_by_email_global(&self, email: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE email = $1 AND deleted_at IS NULL
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE user_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Updates the last-login timestamp after successful authentication.
    pub async fn update_last_login(&self, user_id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE users
            SET last_login_at = NOW()
            WHERE user_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replaces the password hash (reset and change flows).
    pub async fn update_password(
        &self,
        user_id: Uuid,
        new_password_hash: &str,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1
            WHERE user_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(new_password_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Changes the login email (email-change flow, after OTP proof).
    pub async fn update_email(&self, user_id: Uuid, new_email: &str) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE users
            SET email = $1, email_verified = TRUE
            WHERE user_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(new_email)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint() == Some("users_tenant_email_key") {
                    return ApiError::Conflict { resource: "email".to_string() };
                }
            }
            ApiError::DatabaseError(e)
        })?;

        Ok(())
    }

    pub async fn mark_email_verified(&self, user_id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE users
            SET email_verified = TRUE
            WHERE user_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // TOTP OPERATIONS
    // =========================================================================

    /// Stores an enrollment secret without activating the second factor.
    /// The secret is committed by [`Self::enable_totp`] on first verify.
    pub async fn store_pending_totp_secret(
        &self,
        user_id: Uuid,
        secret: &str,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE users
            SET totp_secret = $1, totp_enabled = FALSE
            WHERE user_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(secret)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Activates TOTP after the first successful verification.
    pub async fn enable_totp(&self, user_id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE users
            SET totp_enabled = TRUE
            WHERE user_id = $1 AND totp_secret IS NOT NULL AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Disables TOTP and clears the secret.
    pub async fn disable_totp(&self, user_id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE users
            SET totp_secret = NULL, totp_enabled = FALSE
            WHERE user_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // OAUTH ACCOUNT OPERATIONS
    // =========================================================================

    pub async fn create_oauth_account(
        &self,
        account: NewOAuthAccount,
    ) -> Result<OAuthAccount, ApiError> {
        let created = sqlx::query_as::<_, OAuthAccount>(
            r#"
            INSERT INTO oauth_accounts (
                tenant_id, user_id, provider, provider_user_id,
                encrypted_access_token, encrypted_refresh_token
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(account.tenant_id)
        .bind(account.user_id)
        .bind(account.provider)
        .bind(&account.provider_user_id)
        .bind(&account.encrypted_access_token)
        .bind(&account.encrypted_refresh_token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint() == Some("oauth_accounts_provider_user_key") {
                    return ApiError::Conflict { resource: "oauth account".to_string() };
                }
            }
            ApiError::DatabaseError(e)
        })?;

        Ok(created)
    }

    pub async fn find_oauth_account(
        &self,
        provider: OAuthProvider,
        provider_user_id: &str,
    ) -> Result<Option<OAuthAccount>, ApiError> {
        let account = sqlx::query_as::<_, OAuthAccount>(
            r#"
            SELECT * FROM oauth_accounts
            WHERE provider = $1 AND provider_user_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Refreshes the stored (encrypted) provider tokens on re-login.
    pub async fn update_oauth_tokens(
        &self,
        oauth_account_id: Uuid,
        encrypted_access_token: &str,
        encrypted_refresh_token: Option<&str>,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE oauth_accounts
            SET encrypted_access_token = $1, encrypted_refresh_token = $2
            WHERE oauth_account_id = $3
            "#,
        )
        .bind(encrypted_access_token)
        .bind(encrypted_refresh_token)
        .bind(oauth_account_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes an OAuth link (unlink flow).
    pub async fn delete_oauth_account(&self, oauth_account_id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM oauth_accounts WHERE oauth_account_id = $1
            "#,
        )
        .bind(oauth_account_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // BACKUP CODE OPERATIONS
    // =========================================================================

    /// Replaces the user's backup codes with a fresh batch of hashes.
    /// All prior codes (used or not) are invalidated in the same
    /// transaction.
    pub async fn replace_backup_codes(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        code_hashes: &[String],
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM backup_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for hash in code_hashes {
            sqlx::query(
                r#"
                INSERT INTO backup_codes (tenant_id, user_id, code_hash)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(tenant_id)
            .bind(user_id)
            .bind(hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Deletes all backup codes (TOTP disable).
    pub async fn delete_backup_codes(&self, user_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM backup_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Lists the user's unused backup codes.
    pub async fn list_unused_backup_codes(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<BackupCode>, ApiError> {
        let codes = sqlx::query_as::<_, BackupCode>(
            r#"
            SELECT * FROM backup_codes
            WHERE user_id = $1 AND used_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(codes)
    }

    /// Consumes a backup code - strictly at-most-once.
    ///
    /// The `used_at IS NULL` guard makes the update a compare-and-set: a
    /// concurrent consumer of the same code sees zero rows affected and
    /// the code stays burned.
    pub async fn mark_backup_code_used(&self, backup_code_id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE backup_codes
            SET used_at = $1
            WHERE backup_code_id = $2 AND used_at IS NULL
            "#,
        )
        .bind(Utc::now())
        .bind(backup_code_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    // Repository tests require a real database; they run as #[ignore]d
    // integration tests with:
    //
    //   cargo test -- --ignored
}
