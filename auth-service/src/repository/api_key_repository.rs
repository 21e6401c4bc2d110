//! # API Key Repository
//!
//! Database operations for API keys. The visible prefix narrows lookups;
//! the secret half exists only as an Argon2id hash.

use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{ApiKey, NewApiKey};

#[derive(Debug, Clone)]
pub struct ApiKeyRepository {
    pool: PgPool,
}

impl ApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persists a new key record.
    pub async fn create(&self, new_key: NewApiKey) -> Result<ApiKey, ApiError> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (
                tenant_id, user_id, name, prefix, secret_hash, scopes, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(new_key.tenant_id)
        .bind(new_key.user_id)
        .bind(&new_key.name)
        .bind(&new_key.prefix)
        .bind(&new_key.secret_hash)
        .bind(&new_key.scopes)
        .bind(new_key.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(key)
    }

    /// All keys sharing a prefix. Prefixes are random but not guaranteed
    /// unique; the caller verifies the secret against each candidate.
    pub async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>, ApiError> {
        let keys = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT * FROM api_keys WHERE prefix = $1
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    pub async fn find_by_id(&self, api_key_id: Uuid) -> Result<Option<ApiKey>, ApiError> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT * FROM api_keys WHERE api_key_id = $1
            "#,
        )
        .bind(api_key_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    /// Lists a user's keys, newest first.
    pub async fn list_for_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<ApiKey>, ApiError> {
        let keys = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT * FROM api_keys
            WHERE tenant_id = $1 AND user_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    /// Soft-revokes a key. Returns `false` if it was already revoked.
    pub async fn revoke(&self, api_key_id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET revoked_at = NOW()
            WHERE api_key_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(api_key_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Purges keys past expiry plus the grace window. Called by the
    /// lifecycle sweep.
    pub async fn purge_expired(&self, grace_days: i64) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM api_keys
            WHERE expires_at IS NOT NULL
              AND expires_at < NOW() - make_interval(days => $1::int)
            "#,
        )
        .bind(grace_days)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    // Exercised by #[ignore]d integration tests against a real database.
}
