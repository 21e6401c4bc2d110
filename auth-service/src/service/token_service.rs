//! # Token Service
//!
//! Issues, validates, rotates, and revokes bearer-token pairs. Combines
//! the stateless [`TokenEngine`](shared::token::TokenEngine) with the
//! [`RevocationStore`](shared::revocation::RevocationStore) that makes
//! tokens instantly revocable.
//!
//! ## Refresh Index Layout
//!
//! Two structures in the revocation store:
//!
//! - `refresh:{user_id}` - the single *current* refresh token for the
//!   user's session (or the revocation sentinel after reuse)
//! - `refresh_token:{digest}` - binding from a token digest back to its
//!   user, kept for the full 30-day lifetime so a rotated-away token can
//!   still be attributed when it reappears
//!
//! ## Reuse Detection
//!
//! ```text
//! presented R ──digest──▶ user_id ──▶ current = refresh:{user_id}
//!                                           │
//!            ┌──────────────────────────────┼──────────────────────┐
//!            ▼                              ▼                      ▼
//!      current == R                 current != R              (absent)
//!      rotate, return new pair      REUSE: void session,      RefreshExpired
//!                                   count metric, return
//!                                   SessionRevoked
//! ```
//!
//! Reuse voids the chain by overwriting `refresh:{user_id}` with a
//! sentinel, so every later refresh attempt for that session - including
//! the legitimate holder's - answers `SessionRevoked` rather than
//! `RefreshExpired`. Plain logout deletes the key instead, which is why
//! a post-logout refresh answers `RefreshExpired`.

use serde::Serialize;
use shared::config::RevocationPolicy;
use shared::crypto::signing;
use shared::errors::ApiError;
use shared::metrics::SecurityMetrics;
use shared::revocation::RevocationStore;
use shared::token::{AccessClaims, TokenEngine};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::User;
use crate::repository::UserRepository;

/// Marker stored in the refresh index after reuse detection. Cannot
/// collide with a real token (tokens are pure hex).
const REVOKED_SENTINEL: &str = "!session-revoked";

/// A pair of bearer credentials returned after authentication.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Signed access token for API authorization
    pub access_token: String,
    /// Opaque refresh token, single-use under rotation
    pub refresh_token: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
    /// Always `Bearer`
    pub token_type: &'static str,
}

/// Token lifecycle service.
#[derive(Clone)]
pub struct TokenService {
    engine: Arc<TokenEngine>,
    store: RevocationStore,
    repository: UserRepository,
    metrics: Arc<SecurityMetrics>,
    policy: RevocationPolicy,
}

impl TokenService {
    pub fn new(
        engine: Arc<TokenEngine>,
        store: RevocationStore,
        repository: UserRepository,
        metrics: Arc<SecurityMetrics>,
        policy: RevocationPolicy,
    ) -> Self {
        Self { engine, store, repository, metrics, policy }
    }

    fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.engine.config().refresh_token_ttl_seconds)
    }

    // =========================================================================
    // ISSUANCE
    // =========================================================================

    /// Mints a fresh access+refresh pair and registers the refresh token
    /// as the user's current session. The access token's `jti` is NOT
    /// pre-registered anywhere; it only reaches the store if revoked.
    pub async fn issue_pair(&self, user: &User) -> Result<TokenPair, ApiError> {
        let minted = self.engine.mint_access(
            user.user_id,
            user.tenant_id,
            &user.email,
            user.roles.clone(),
        )?;
        let refresh_token = self.engine.generate_refresh()?;
        let ttl = self.refresh_ttl();

        self.store
            .store_refresh(&user.user_id, &refresh_token, ttl)
            .await?;
        self.store
            .store_refresh_binding(
                &signing::sha256_hex(refresh_token.as_bytes()),
                &user.user_id,
                ttl,
            )
            .await?;

        Ok(TokenPair {
            access_token: minted.token,
            refresh_token,
            expires_in: minted.expires_in,
            token_type: "Bearer",
        })
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Full inbound validation: signature and claims via the engine, then
    /// the blacklist lookup with the configured outage policy (see
    /// [`shared::token::validate_with_revocation`]).
    pub async fn validate(&self, token: &str) -> Result<AccessClaims, ApiError> {
        shared::token::validate_with_revocation(
            &self.engine,
            &self.store,
            &self.policy,
            &self.metrics,
            token,
        )
        .await
    }

    // =========================================================================
    // ROTATION WITH REUSE DETECTION
    // =========================================================================

    /// Exchanges a refresh token for a fresh pair.
    ///
    /// ## Errors
    ///
    /// - `RefreshExpired` - unknown token, expired index, or logged out
    /// - `SessionRevoked` - the token is not the current one (reuse), or
    ///   the chain was already voided by an earlier reuse
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair, ApiError> {
        let digest = signing::sha256_hex(presented.as_bytes());

        let user_id = self
            .store
            .lookup_refresh_binding(&digest)
            .await?
            .ok_or(ApiError::RefreshExpired)?;

        let current = self
            .store
            .current_refresh(&user_id)
            .await?
            .ok_or(ApiError::RefreshExpired)?;

        if current == REVOKED_SENTINEL {
            return Err(ApiError::SessionRevoked);
        }

        if !signing::constant_time_eq(current.as_bytes(), presented.as_bytes()) {
            return Err(self.void_session_on_reuse(user_id).await);
        }

        // Token matches the index: rotate. The delete-then-set runs as
        // one pipeline on one connection; a concurrent refresh that
        // observes the overwritten key fails instead of silently
        // succeeding.
        let user = self
            .repository
            .find_by_id(user_id)
            .await?
            .ok_or(ApiError::RefreshExpired)?;

        let minted = self.engine.mint_access(
            user.user_id,
            user.tenant_id,
            &user.email,
            user.roles.clone(),
        )?;
        let new_refresh = self.engine.generate_refresh()?;
        let ttl = self.refresh_ttl();

        self.store.rotate_refresh(&user_id, &new_refresh, ttl).await?;
        self.store
            .store_refresh_binding(&signing::sha256_hex(new_refresh.as_bytes()), &user_id, ttl)
            .await?;

        info!(user_id = %user_id, "Refresh token rotated");

        Ok(TokenPair {
            access_token: minted.token,
            refresh_token: new_refresh,
            expires_in: minted.expires_in,
            token_type: "Bearer",
        })
    }

    /// Voids the session chain after observing a non-current refresh
    /// token. This is the single most important security event in the
    /// system; the metric and the audit line are written here, together.
    async fn void_session_on_reuse(&self, user_id: Uuid) -> ApiError {
        SecurityMetrics::incr(&self.metrics.refresh_reuse_detected_total);
        warn!(
            user_id = %user_id,
            event = "auth.refresh_reuse_detected",
            "Refresh token reuse detected; session chain voided"
        );

        // Tombstone instead of delete: later refresh attempts for this
        // session must answer SessionRevoked, not RefreshExpired
        if let Err(e) = self
            .store
            .store_refresh(&user_id, REVOKED_SENTINEL, self.refresh_ttl())
            .await
        {
            // The conservative failure mode still rejects the request
            warn!(error = %e, "Failed to tombstone voided session");
        }

        ApiError::SessionRevoked
    }

    // =========================================================================
    // REVOCATION
    // =========================================================================

    /// Logout: deletes the refresh index *and* blacklists the access
    /// token for its remaining lifetime. Both steps are required -
    /// neither alone closes the session.
    pub async fn revoke(&self, claims: &AccessClaims) -> Result<(), ApiError> {
        self.store.delete_refresh(&claims.sub).await?;
        self.store
            .blacklist_token(&claims.jti, "logout", claims.remaining_lifetime())
            .await?;

        SecurityMetrics::incr(&self.metrics.token_revoked_total);
        info!(user_id = %claims.sub, "Session revoked");

        Ok(())
    }

    /// Voids every outstanding session for a user (password reset,
    /// account compromise). Access tokens are not pre-registered, so the
    /// refresh index is the complete set of revocable session state; the
    /// caller may additionally blacklist the one access token it holds.
    pub async fn revoke_all_sessions(&self, user_id: Uuid) -> Result<(), ApiError> {
        self.store.delete_refresh(&user_id).await?;
        SecurityMetrics::incr(&self.metrics.token_revoked_total);
        info!(user_id = %user_id, "All sessions revoked");
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_cannot_collide_with_real_tokens() {
        // Refresh tokens are lowercase hex; the sentinel starts with '!'
        assert!(!REVOKED_SENTINEL.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_token_pair_serializes_bearer() {
        let pair = TokenPair {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_in: 900,
            token_type: "Bearer",
        };
        let json = serde_json::to_value(&pair).unwrap();
        assert_eq!(json["tokenType"], "Bearer");
        assert_eq!(json["expiresIn"], 900);
    }

    // The full issue/validate/refresh/reuse/revoke lifecycle needs Redis
    // and Postgres; see tests/auth_flow_tests.rs (#[ignore]d).
}
