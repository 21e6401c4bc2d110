//! # Authentication Domain Entities
//!
//! Persistent business objects for tenants, users, OAuth links, backup
//! codes, and API keys.
//!
//! ## Entity Overview
//!
//! ```text
//! ┌──────────┐ 1:N ┌──────────────┐ 1:N ┌───────────────┐
//! │  Tenant  │────▶│     User     │────▶│ OAuthAccount  │
//! └──────────┘     ├──────────────┤     └───────────────┘
//!                  │ password_hash│ 1:N ┌───────────────┐
//!                  │ totp_secret  │────▶│  BackupCode   │
//!                  │ roles[]      │     └───────────────┘
//!                  └──────┬───────┘ 1:N ┌───────────────┐
//!                         └────────────▶│    ApiKey     │
//!                                       └───────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! - **Never expose `password_hash`, `totp_secret`, or `secret_hash`**:
//!   use [`UserProfile`] / [`ApiKeySummary`] for API responses
//! - **OAuth provider tokens** are AES-GCM encrypted before storage
//! - **Backup codes** exist only as SHA-256 hashes; `used_at` flips
//!   exactly once
//! - **Soft deletes**: `deleted_at` keeps accounts for the retention
//!   window; erasure anonymizes instead of deleting rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// TENANT
// =============================================================================

/// A tenant: the isolation boundary every other entity hangs off.
///
/// Created on first signup; never hard-deleted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Tenant {
    /// Process-stable unique identifier
    pub tenant_id: Uuid,
    /// Display name
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// USER
// =============================================================================

/// Complete user entity as stored in the database.
///
/// **Never expose this struct directly in API responses** - use
/// [`UserProfile`] instead.
///
/// # Invariants
///
/// - `email` is unique per tenant among live accounts
/// - `totp_enabled` implies `totp_secret` is non-null
/// - `password_hash` may be null only while at least one OAuth account
///   link exists (OAuth-only accounts)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    /// Login email, unique within the tenant
    pub email: String,
    /// Argon2id hash in PHC format; null for OAuth-only accounts
    pub password_hash: Option<String>,
    /// Base32 TOTP secret; set during enrollment, committed on first verify
    pub totp_secret: Option<String>,
    /// Whether the TOTP second factor is active
    pub totp_enabled: bool,
    /// Role names carried into access-token claims
    pub roles: Vec<String>,
    pub email_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete timestamp
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Whether login must demand a second factor.
    pub fn requires_mfa(&self) -> bool {
        self.totp_enabled
    }
}

/// Public user data, safe for API responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub roles: Vec<String>,
    pub totp_enabled: bool,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            tenant_id: user.tenant_id,
            email: user.email,
            roles: user.roles,
            totp_enabled: user.totp_enabled,
            email_verified: user.email_verified,
            created_at: user.created_at,
        }
    }
}

/// Data required to create a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub tenant_id: Uuid,
    pub email: String,
    /// Pre-hashed; `None` for OAuth-only accounts
    pub password_hash: Option<String>,
    pub roles: Vec<String>,
    pub email_verified: bool,
}

// =============================================================================
// OAUTH
// =============================================================================

/// Supported OAuth identity providers.
///
/// Providers are a closed set: the auth service switches on this tag and
/// never reflects over a registry at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OAuthProvider {
    Google,
    Github,
    Microsoft,
}

impl OAuthProvider {
    /// The provider's authorization endpoint for the redirect step.
    pub fn authorize_endpoint(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            OAuthProvider::Github => "https://github.com/login/oauth/authorize",
            OAuthProvider::Microsoft => {
                "https://login.microsoftonline.com/common/oauth2/v2.0/authorize"
            }
        }
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OAuthProvider::Google => write!(f, "google"),
            OAuthProvider::Github => write!(f, "github"),
            OAuthProvider::Microsoft => write!(f, "microsoft"),
        }
    }
}

impl std::str::FromStr for OAuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(OAuthProvider::Google),
            "github" => Ok(OAuthProvider::Github),
            "microsoft" => Ok(OAuthProvider::Microsoft),
            other => Err(format!("Unknown OAuth provider: {}", other)),
        }
    }
}

/// Link between a user and an external identity.
///
/// `(provider, provider_user_id)` is unique platform-wide. Provider
/// tokens are stored AES-GCM encrypted (nonce || ciphertext, base64).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OAuthAccount {
    pub oauth_account_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub provider: OAuthProvider,
    pub provider_user_id: String,
    pub encrypted_access_token: String,
    pub encrypted_refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to link an OAuth account.
#[derive(Debug, Clone)]
pub struct NewOAuthAccount {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub provider: OAuthProvider,
    pub provider_user_id: String,
    pub encrypted_access_token: String,
    pub encrypted_refresh_token: Option<String>,
}

// =============================================================================
// BACKUP CODES
// =============================================================================

/// A one-time second-factor backup code (hash only).
///
/// Transitions from unused to used exactly once; regenerating the batch
/// invalidates all prior codes.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BackupCode {
    pub backup_code_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    /// SHA-256 of the code, 64 lowercase hex chars
    pub code_hash: String,
    /// Set exactly once, when the code is consumed
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// API KEYS
// =============================================================================

/// An API key record. Secret material exists only as an Argon2id hash;
/// the full `{prefix}_{secret}` string is shown exactly once at creation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiKey {
    pub api_key_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    /// Human-assigned label
    pub name: String,
    /// Visible identifier, used to narrow the lookup
    pub prefix: String,
    /// Argon2id hash of the secret half
    pub secret_hash: String,
    /// Granted scopes (see `shared::scopes` for the grammar)
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// Whether the key can authenticate requests right now.
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
            && self.expires_at.map_or(true, |expires| expires > Utc::now())
    }
}

/// API key projection for list endpoints: no hash, no secret.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeySummary {
    pub api_key_id: Uuid,
    pub name: String,
    pub prefix: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ApiKey> for ApiKeySummary {
    fn from(key: ApiKey) -> Self {
        Self {
            api_key_id: key.api_key_id,
            name: key.name,
            prefix: key.prefix,
            scopes: key.scopes,
            expires_at: key.expires_at,
            revoked_at: key.revoked_at,
            created_at: key.created_at,
        }
    }
}

/// Data required to persist a new API key.
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub prefix: String,
    pub secret_hash: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_provider_round_trip() {
        for provider in [OAuthProvider::Google, OAuthProvider::Github, OAuthProvider::Microsoft] {
            let parsed: OAuthProvider = provider.to_string().parse().unwrap();
            assert_eq!(parsed, provider);
        }
        assert!("facebook".parse::<OAuthProvider>().is_err());
    }

    #[test]
    fn test_api_key_active_states() {
        let base = ApiKey {
            api_key_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "ci".into(),
            prefix: "ak_live_x1".into(),
            secret_hash: "$argon2id$...".into(),
            scopes: vec!["read:*".into()],
            expires_at: None,
            revoked_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(base.is_active());

        let revoked = ApiKey { revoked_at: Some(Utc::now()), ..base.clone() };
        assert!(!revoked.is_active());

        let expired = ApiKey {
            expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
            ..base.clone()
        };
        assert!(!expired.is_active());

        let future_expiry = ApiKey {
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            ..base
        };
        assert!(future_expiry.is_active());
    }

    #[test]
    fn test_user_profile_hides_secrets() {
        let user = User {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            email: "a@b.c".into(),
            password_hash: Some("$argon2id$...".into()),
            totp_secret: Some("SECRET".into()),
            totp_enabled: true,
            roles: vec!["member".into()],
            email_verified: true,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };

        let profile: UserProfile = user.into();
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("totpSecret").is_none());
        assert_eq!(json["totpEnabled"], true);
    }
}
