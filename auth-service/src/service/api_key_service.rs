//! # API Key Service
//!
//! Machine-credential issuance and validation.
//!
//! ## Key Format
//!
//! `{prefix}_{secret}` where the prefix (`ak_` + 8 alphanumerics) is the
//! searchable, visible identifier and the secret is 32 alphanumerics
//! (> 190 bits of entropy). The full string exists exactly once - in the
//! creation response. Storage keeps the prefix in cleartext and the
//! secret only as an Argon2id hash.
//!
//! ## Validation
//!
//! 1. Split the presented key on its last underscore
//! 2. Narrow by prefix, verify the secret against each candidate hash
//! 3. Reject revoked/expired keys
//! 4. Match the requested scope against the grant set (deny by default)
//! 5. Tenant isolation is inherent: the identity returned carries the
//!    key's tenant, and resource access goes through the caller guard

use chrono::{DateTime, Utc};
use shared::crypto::password::PasswordHasher;
use shared::crypto::random;
use shared::errors::ApiError;
use shared::identity::Caller;
use shared::scopes;
use shared::validation::validators;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{ApiKeySummary, NewApiKey};
use crate::repository::ApiKeyRepository;

const PREFIX_TAG: &str = "ak";
const PREFIX_RANDOM_LEN: usize = 8;
const SECRET_LEN: usize = 32;

/// Creation response: the only moment the full key string exists.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedApiKey {
    #[serde(flatten)]
    pub key: ApiKeySummary,
    /// Full `{prefix}_{secret}` string - shown once, never stored
    pub full_key: String,
}

/// Identity proven by a valid API key.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyIdentity {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub scopes: Vec<String>,
}

#[derive(Clone)]
pub struct ApiKeyService {
    repository: ApiKeyRepository,
    hasher: Arc<PasswordHasher>,
}

impl ApiKeyService {
    pub fn new(repository: ApiKeyRepository, hasher: Arc<PasswordHasher>) -> Self {
        Self { repository, hasher }
    }

    // =========================================================================
    // CREATE / LIST / REVOKE
    // =========================================================================

    /// Creates a key for the caller. The full string is returned here and
    /// never again.
    pub async fn create(
        &self,
        caller: &Caller,
        name: &str,
        scopes: Vec<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<CreatedApiKey, ApiError> {
        for scope in &scopes {
            validators::valid_scope(scope).map_err(|_| ApiError::BadRequest {
                message: format!("Malformed scope: {}", scope),
            })?;
        }

        let prefix = format!("{}_{}", PREFIX_TAG, random::random_alphanumeric(PREFIX_RANDOM_LEN)?);
        let secret = random::random_alphanumeric(SECRET_LEN)?;
        let secret_hash = self.hasher.hash(&secret)?;

        let key = self
            .repository
            .create(NewApiKey {
                tenant_id: caller.tenant_id,
                user_id: caller.user_id,
                name: name.to_string(),
                prefix: prefix.clone(),
                secret_hash,
                scopes,
                expires_at,
            })
            .await?;

        info!(api_key_id = %key.api_key_id, tenant_id = %caller.tenant_id, "API key created");

        Ok(CreatedApiKey {
            full_key: format!("{}_{}", prefix, secret),
            key: key.into(),
        })
    }

    /// Lists the caller's keys (summaries only - no secret material).
    pub async fn list(&self, caller: &Caller) -> Result<Vec<ApiKeySummary>, ApiError> {
        let keys = self
            .repository
            .list_for_user(caller.tenant_id, caller.user_id)
            .await?;
        Ok(keys.into_iter().map(Into::into).collect())
    }

    /// Soft-revokes a key after the tenant guard.
    pub async fn revoke(&self, caller: &Caller, api_key_id: Uuid) -> Result<(), ApiError> {
        let key = self
            .repository
            .find_by_id(api_key_id)
            .await?
            .ok_or_else(|| ApiError::NotFound { resource: format!("api_key:{}", api_key_id) })?;

        caller.ensure_tenant(key.tenant_id)?;

        if !self.repository.revoke(api_key_id).await? {
            return Err(ApiError::ApiKeyRevoked);
        }

        info!(
            api_key_id = %api_key_id,
            tenant_id = %key.tenant_id,
            event = "auth.api_key_revoked",
            "API key revoked"
        );

        Ok(())
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Validates a presented key against a requested scope.
    ///
    /// ## Errors
    ///
    /// - `ApiKeyInvalid` - malformed string or no hash match
    /// - `ApiKeyRevoked` - matched a revoked or expired key
    /// - `ScopeDenied` - valid key, but no grant covers the request
    pub async fn validate_key(
        &self,
        presented: &str,
        requested_scope: &str,
    ) -> Result<ApiKeyIdentity, ApiError> {
        let (prefix, secret) = presented
            .rsplit_once('_')
            .ok_or(ApiError::ApiKeyInvalid)?;

        let candidates = self.repository.find_by_prefix(prefix).await?;

        for candidate in candidates {
            if !self.hasher.verify(secret, &candidate.secret_hash)? {
                continue;
            }

            if !candidate.is_active() {
                return Err(ApiError::ApiKeyRevoked);
            }

            if !scopes::any_scope_allows(&candidate.scopes, requested_scope) {
                return Err(ApiError::ScopeDenied { scope: requested_scope.to_string() });
            }

            return Ok(ApiKeyIdentity {
                user_id: candidate.user_id,
                tenant_id: candidate.tenant_id,
                scopes: candidate.scopes,
            });
        }

        Err(ApiError::ApiKeyInvalid)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_string_splits_on_last_underscore() {
        // The prefix itself contains an underscore; secrets never do
        let presented = "ak_x1Y2z3A4_S3cr3tS3cr3tS3cr3tS3cr3t";
        let (prefix, secret) = presented.rsplit_once('_').unwrap();
        assert_eq!(prefix, "ak_x1Y2z3A4");
        assert_eq!(secret, "S3cr3tS3cr3tS3cr3tS3cr3t");
    }

    #[test]
    fn test_secret_entropy_exceeds_128_bits() {
        // 32 alphanumeric chars: 62^32 > 2^190
        let bits = (SECRET_LEN as f64) * (62f64).log2();
        assert!(bits > 128.0);
    }

    // Hash round trips and store-backed validation live in
    // tests/auth_flow_tests.rs.
}
