//! # Revocation Store
//!
//! TTL'd key/value store backing instant revocation, token rotation, OTP
//! codes, OAuth state, rate limiting, and idempotency replay.
//!
//! ## Key Namespaces
//!
//! | Pattern | Value | TTL | Purpose |
//! |---------|-------|-----|---------|
//! | `blacklist:{jti}` | reason | remaining access-token lifetime | invalidated access tokens |
//! | `refresh:{user_id}` | current refresh token | 30 days | refresh index (rotation + reuse detection) |
//! | `otp:{user_id}:{purpose}` | code | 10 min | out-of-band one-time passwords |
//! | `otp_attempts:{user_id}:{purpose}` | counter | 10 min | OTP brute-force guard |
//! | `otp_rate:{email}` | counter | 1 hour | OTP issuance rate limit |
//! | `oauth_state:{state}` | provider + redirect | 10 min | OAuth CSRF defense |
//! | `login_fail:{account_id}` | counter | 2 min | failed-login rate limit |
//! | `reset:{token}` | email | 1 hour | password-reset tokens |
//! | `idem:{tenant}:{user}:{key}` | cached response | 24 hours | idempotent replay |
//!
//! ## Consistency
//!
//! The store assumes at-most-once semantics per logical key. Refresh
//! rotation is a delete-then-set inside a single MULTI/EXEC pipeline on
//! one connection; a concurrent rotation that observes the deleted key
//! fails instead of silently succeeding. Rate-limit increments happen on
//! the same round trip as the check (INCRBY + EXPIRE NX pipeline).
//!
//! Reuse detection requires linearizability per `refresh:{user_id}` key.
//! This client models one logical Redis instance; a sharded deployment
//! must keep each user's refresh key on a single shard.
//!
//! ## Outage Policy
//!
//! Every command carries a 2-second deadline. On store failure the raw
//! error is returned here; the *policy* (fail closed for blacklist, fail
//! open for rate limits) is applied by the callers that own those paths.

use crate::config::RedisConfig;
use crate::errors::ApiError;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

// =============================================================================
// Key Builders
// =============================================================================

/// OTP purposes; each purpose holds at most one active code per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Login,
    PasswordReset,
    EmailChange,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "login",
            OtpPurpose::PasswordReset => "password_reset",
            OtpPurpose::EmailChange => "email_change",
        }
    }
}

impl std::str::FromStr for OtpPurpose {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login" => Ok(OtpPurpose::Login),
            "password_reset" => Ok(OtpPurpose::PasswordReset),
            "email_change" => Ok(OtpPurpose::EmailChange),
            other => Err(ApiError::BadRequest {
                message: format!("Unknown OTP purpose: {}", other),
            }),
        }
    }
}

fn blacklist_key(jti: &Uuid) -> String {
    format!("blacklist:{}", jti)
}

fn refresh_key(user_id: &Uuid) -> String {
    format!("refresh:{}", user_id)
}

fn refresh_binding_key(token_digest: &str) -> String {
    format!("refresh_token:{}", token_digest)
}

fn otp_key(user_id: &Uuid, purpose: OtpPurpose) -> String {
    format!("otp:{}:{}", user_id, purpose.as_str())
}

fn otp_attempts_key(user_id: &Uuid, purpose: OtpPurpose) -> String {
    format!("otp_attempts:{}:{}", user_id, purpose.as_str())
}

fn otp_rate_key(email: &str) -> String {
    format!("otp_rate:{}", email)
}

fn oauth_state_key(state: &str) -> String {
    format!("oauth_state:{}", state)
}

fn login_fail_key(account_id: &Uuid) -> String {
    format!("login_fail:{}", account_id)
}

fn reset_key(token: &str) -> String {
    format!("reset:{}", token)
}

fn idempotency_key(tenant_id: &Uuid, user_id: &Uuid, key: &str) -> String {
    format!("idem:{}:{}:{}", tenant_id, user_id, key)
}

// =============================================================================
// Stored Values
// =============================================================================

/// One-time OAuth state entry (CSRF defense).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthStateEntry {
    /// Provider the flow was initiated for
    pub provider: String,
    /// Redirect URI the callback must match
    pub redirect_uri: String,
}

/// Cached response for idempotent replay. Replayed byte-for-byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Original HTTP status
    pub status: u16,
    /// Original response body, exactly as first produced
    pub body: String,
}

// =============================================================================
// Revocation Store
// =============================================================================

/// Async revocation store with automatic reconnection.
///
/// Wraps a `ConnectionManager`; safe to clone and share across tasks.
#[derive(Clone)]
pub struct RevocationStore {
    conn: ConnectionManager,
    command_timeout: Duration,
}

impl RevocationStore {
    /// Creates the store and establishes the connection.
    ///
    /// ## Errors
    ///
    /// Returns `ApiError::StoreUnavailable` if the URL is invalid or the
    /// server is unreachable.
    pub async fn new(config: &RedisConfig) -> Result<Self, ApiError> {
        info!(url = %config.url, "Connecting to revocation store");

        let client = redis::Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client).await?;

        info!("Revocation store connection established");

        Ok(Self {
            conn,
            command_timeout: Duration::from_secs(config.command_timeout_seconds),
        })
    }

    /// Runs a store command under the per-call deadline.
    async fn with_deadline<T, F>(&self, fut: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, redis::RedisError>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ApiError::StoreTimeout { store: "revocation" }),
        }
    }

    // =========================================================================
    // Basic Operations
    // =========================================================================

    /// Retrieves a raw string value. `None` if the key doesn't exist.
    pub async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.with_deadline(async move { conn.get(&key).await }).await
    }

    /// Stores a value with a TTL (SETEX).
    pub async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ApiError> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        let value = value.to_string();
        self.with_deadline(async move {
            conn.set_ex::<_, _, ()>(&key, &value, ttl.as_secs()).await
        })
        .await
    }

    /// Deletes a key. Returns `true` if it existed.
    pub async fn delete(&self, key: &str) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        let deleted: i64 = self.with_deadline(async move { conn.del(&key).await }).await?;
        Ok(deleted > 0)
    }

    /// Checks if a key exists.
    pub async fn exists(&self, key: &str) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.with_deadline(async move { conn.exists(&key).await }).await
    }

    /// Atomically increments a counter, setting `ttl_on_create` only when
    /// the key is first created.
    ///
    /// INCRBY and EXPIRE NX run inside one MULTI/EXEC pipeline, so the
    /// increment-and-check happens on a single round trip and the window
    /// never slides on subsequent hits.
    pub async fn incr_by(
        &self,
        key: &str,
        delta: i64,
        ttl_on_create: Duration,
    ) -> Result<i64, ApiError> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.with_deadline(async move {
            let (count,): (i64,) = redis::pipe()
                .atomic()
                .cmd("INCRBY")
                .arg(&key)
                .arg(delta)
                .cmd("EXPIRE")
                .arg(&key)
                .arg(ttl_on_create.as_secs())
                .arg("NX")
                .ignore()
                .query_async(&mut conn)
                .await?;
            Ok(count)
        })
        .await
    }

    /// Atomically reads and deletes a key (GETDEL). The backbone of every
    /// one-time credential in the system.
    async fn take(&self, key: &str) -> Result<Option<String>, ApiError> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.with_deadline(async move { conn.get_del(&key).await }).await
    }

    /// Health check - verifies the store is responding.
    pub async fn ping(&self) -> Result<(), ApiError> {
        let mut conn = self.conn.clone();
        self.with_deadline(async move {
            redis::cmd("PING").query_async::<String>(&mut conn).await.map(|_| ())
        })
        .await
    }

    // =========================================================================
    // Access-Token Blacklist
    // =========================================================================

    /// Blacklists an access token by `jti`.
    ///
    /// `ttl` must equal the token's *remaining* lifetime so the entry
    /// auto-expires exactly when the token would have.
    pub async fn blacklist_token(
        &self,
        jti: &Uuid,
        reason: &str,
        ttl: Duration,
    ) -> Result<(), ApiError> {
        // A zero TTL means the token is already expired; nothing to store.
        if ttl.is_zero() {
            return Ok(());
        }
        self.set_ex(&blacklist_key(jti), reason, ttl).await
    }

    /// Checks whether a token's `jti` is blacklisted.
    ///
    /// Callers on the validation path apply the outage policy: a store
    /// error here fails closed unless `revocation.fail_open_blacklist`.
    pub async fn is_token_blacklisted(&self, jti: &Uuid) -> Result<bool, ApiError> {
        self.exists(&blacklist_key(jti)).await
    }

    // =========================================================================
    // Refresh-Token Index
    // =========================================================================
    // At most one current refresh token per user. Presenting any other
    // value is reuse and voids the whole chain.

    /// Returns the current refresh token for a user, if any.
    pub async fn current_refresh(&self, user_id: &Uuid) -> Result<Option<String>, ApiError> {
        self.get(&refresh_key(user_id)).await
    }

    /// Registers a fresh refresh token with the full lifetime TTL.
    pub async fn store_refresh(
        &self,
        user_id: &Uuid,
        token: &str,
        ttl: Duration,
    ) -> Result<(), ApiError> {
        self.set_ex(&refresh_key(user_id), token, ttl).await
    }

    /// Replaces the refresh index entry: delete-then-set in one MULTI/EXEC
    /// pipeline on one connection.
    ///
    /// A concurrent rotation interleaving with this one either observes
    /// the old token (and loses the race at its own compare) or the
    /// deleted/overwritten key (and fails) - it can never silently succeed.
    pub async fn rotate_refresh(
        &self,
        user_id: &Uuid,
        new_token: &str,
        ttl: Duration,
    ) -> Result<(), ApiError> {
        let mut conn = self.conn.clone();
        let key = refresh_key(user_id);
        let value = new_token.to_string();
        self.with_deadline(async move {
            redis::pipe()
                .atomic()
                .del(&key)
                .ignore()
                .set_ex(&key, &value, ttl.as_secs())
                .ignore()
                .query_async::<()>(&mut conn)
                .await
        })
        .await
    }

    /// Deletes the refresh index entry, revoking the whole session chain.
    /// Returns `true` if an entry existed.
    pub async fn delete_refresh(&self, user_id: &Uuid) -> Result<bool, ApiError> {
        self.delete(&refresh_key(user_id)).await
    }

    /// Records the token -> user binding for a refresh token digest.
    ///
    /// The binding lives for the token's full lifetime and is *not*
    /// removed on rotation: presenting a rotated-away token must still
    /// resolve to its user so reuse can be detected and attributed.
    pub async fn store_refresh_binding(
        &self,
        token_digest: &str,
        user_id: &Uuid,
        ttl: Duration,
    ) -> Result<(), ApiError> {
        self.set_ex(&refresh_binding_key(token_digest), &user_id.to_string(), ttl).await
    }

    /// Resolves a refresh token digest to its user.
    pub async fn lookup_refresh_binding(
        &self,
        token_digest: &str,
    ) -> Result<Option<Uuid>, ApiError> {
        match self.get(&refresh_binding_key(token_digest)).await? {
            Some(raw) => Ok(Uuid::parse_str(&raw).ok()),
            None => Ok(None),
        }
    }

    /// Remaining TTL of a key in seconds. `None` when the key doesn't
    /// exist or has no expiry.
    pub async fn time_to_live(&self, key: &str) -> Result<Option<i64>, ApiError> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        let ttl: i64 = self
            .with_deadline(async move {
                redis::cmd("TTL").arg(&key).query_async(&mut conn).await
            })
            .await?;
        Ok(if ttl >= 0 { Some(ttl) } else { None })
    }

    /// Remaining lock time for an account, in seconds.
    pub async fn login_lock_remaining(&self, account_id: &Uuid) -> Result<Option<i64>, ApiError> {
        self.time_to_live(&login_fail_key(account_id)).await
    }

    /// Current failed-login count without incrementing.
    pub async fn login_failure_count(&self, account_id: &Uuid) -> Result<i64, ApiError> {
        match self.get(&login_fail_key(account_id)).await? {
            Some(raw) => Ok(raw.parse().unwrap_or(0)),
            None => Ok(0),
        }
    }

    // =========================================================================
    // One-Time Passwords
    // =========================================================================

    /// Stores the single active OTP code for `(user, purpose)`,
    /// overwriting any prior code. Resets the attempt counter.
    pub async fn store_otp(
        &self,
        user_id: &Uuid,
        purpose: OtpPurpose,
        code: &str,
        ttl: Duration,
    ) -> Result<(), ApiError> {
        self.delete(&otp_attempts_key(user_id, purpose)).await?;
        self.set_ex(&otp_key(user_id, purpose), code, ttl).await
    }

    /// Reads the active OTP code without consuming it.
    pub async fn peek_otp(
        &self,
        user_id: &Uuid,
        purpose: OtpPurpose,
    ) -> Result<Option<String>, ApiError> {
        self.get(&otp_key(user_id, purpose)).await
    }

    /// Consumes the OTP code (one-time use). Returns `true` only for the
    /// caller that actually removed the key, so two concurrent correct
    /// verifications cannot both succeed.
    pub async fn delete_otp(&self, user_id: &Uuid, purpose: OtpPurpose) -> Result<bool, ApiError> {
        let existed = self.delete(&otp_key(user_id, purpose)).await?;
        self.delete(&otp_attempts_key(user_id, purpose)).await?;
        Ok(existed)
    }

    /// Records a failed verification attempt and returns the new count.
    /// The counter shares the code's 10-minute window.
    pub async fn record_otp_attempt(
        &self,
        user_id: &Uuid,
        purpose: OtpPurpose,
        ttl: Duration,
    ) -> Result<i64, ApiError> {
        self.incr_by(&otp_attempts_key(user_id, purpose), 1, ttl).await
    }

    /// Increments the per-email OTP issuance counter (3/hour limit is
    /// enforced by the caller).
    pub async fn incr_otp_rate(&self, email: &str, window: Duration) -> Result<i64, ApiError> {
        self.incr_by(&otp_rate_key(email), 1, window).await
    }

    // =========================================================================
    // OAuth State
    // =========================================================================

    /// Stores a one-time OAuth state token.
    pub async fn store_oauth_state(
        &self,
        state: &str,
        entry: &OAuthStateEntry,
        ttl: Duration,
    ) -> Result<(), ApiError> {
        let value = serde_json::to_string(entry)
            .map_err(|e| ApiError::InternalError { message: e.to_string() })?;
        self.set_ex(&oauth_state_key(state), &value, ttl).await
    }

    /// Consumes an OAuth state token (one-time use). `None` means the
    /// state is unknown, expired, or already used.
    pub async fn take_oauth_state(&self, state: &str) -> Result<Option<OAuthStateEntry>, ApiError> {
        match self.take(&oauth_state_key(state)).await? {
            Some(raw) => {
                let entry = serde_json::from_str(&raw)
                    .map_err(|e| ApiError::InternalError { message: e.to_string() })?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    // =========================================================================
    // Login Rate Limiting
    // =========================================================================

    /// Records a failed login and returns the count inside the current
    /// window. Check and increment happen on the same round trip.
    pub async fn record_login_failure(
        &self,
        account_id: &Uuid,
        window: Duration,
    ) -> Result<i64, ApiError> {
        self.incr_by(&login_fail_key(account_id), 1, window).await
    }

    /// Clears the failed-login counter (on successful login).
    pub async fn reset_login_failures(&self, account_id: &Uuid) -> Result<(), ApiError> {
        self.delete(&login_fail_key(account_id)).await?;
        Ok(())
    }

    /// Extends the failed-login key into a lock for the given duration.
    pub async fn lock_account(
        &self,
        account_id: &Uuid,
        lock: Duration,
    ) -> Result<(), ApiError> {
        let mut conn = self.conn.clone();
        let key = login_fail_key(account_id);
        let secs = lock.as_secs() as i64;
        self.with_deadline(async move {
            conn.expire::<_, bool>(&key, secs).await.map(|_| ())
        })
        .await
    }

    // =========================================================================
    // Password Reset Tokens
    // =========================================================================

    /// Stores a password-reset token mapping to the account email.
    pub async fn store_reset_token(
        &self,
        token: &str,
        email: &str,
        ttl: Duration,
    ) -> Result<(), ApiError> {
        self.set_ex(&reset_key(token), email, ttl).await
    }

    /// Consumes a password-reset token (one-time use).
    pub async fn take_reset_token(&self, token: &str) -> Result<Option<String>, ApiError> {
        self.take(&reset_key(token)).await
    }

    // =========================================================================
    // Idempotency Cache
    // =========================================================================

    /// Looks up a cached response for `(tenant, user, key)`.
    pub async fn cached_response(
        &self,
        tenant_id: &Uuid,
        user_id: &Uuid,
        key: &str,
    ) -> Result<Option<CachedResponse>, ApiError> {
        match self.get(&idempotency_key(tenant_id, user_id, key)).await? {
            Some(raw) => {
                let cached = serde_json::from_str(&raw)
                    .map_err(|e| ApiError::InternalError { message: e.to_string() })?;
                Ok(Some(cached))
            }
            None => Ok(None),
        }
    }

    /// Caches the first successful response under the composite key for
    /// the idempotency window.
    pub async fn cache_response(
        &self,
        tenant_id: &Uuid,
        user_id: &Uuid,
        key: &str,
        response: &CachedResponse,
        window: Duration,
    ) -> Result<(), ApiError> {
        let value = serde_json::to_string(response)
            .map_err(|e| ApiError::InternalError { message: e.to_string() })?;
        self.set_ex(&idempotency_key(tenant_id, user_id, key), &value, window).await
    }
}

// Hide internal state in Debug output
impl std::fmt::Debug for RevocationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationStore").finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_namespaces() {
        let user = Uuid::nil();
        assert_eq!(refresh_key(&user), format!("refresh:{}", user));
        assert_eq!(blacklist_key(&user), format!("blacklist:{}", user));
        assert_eq!(
            otp_key(&user, OtpPurpose::PasswordReset),
            format!("otp:{}:password_reset", user)
        );
        assert_eq!(otp_rate_key("a@b.c"), "otp_rate:a@b.c");
        assert_eq!(oauth_state_key("s1"), "oauth_state:s1");
        assert_eq!(reset_key("t1"), "reset:t1");
    }

    #[test]
    fn test_idempotency_key_is_scoped_to_tenant_and_user() {
        let tenant = Uuid::new_v4();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        assert_ne!(
            idempotency_key(&tenant, &user_a, "k"),
            idempotency_key(&tenant, &user_b, "k")
        );
    }

    #[test]
    fn test_otp_purpose_round_trip() {
        for purpose in [OtpPurpose::Login, OtpPurpose::PasswordReset, OtpPurpose::EmailChange] {
            let parsed: OtpPurpose = purpose.as_str().parse().unwrap();
            assert_eq!(parsed, purpose);
        }
        assert!("unknown".parse::<OtpPurpose>().is_err());
    }

    // Store-backed tests require a running Redis; they are exercised by
    // the services' #[ignore]d integration tests.
}
