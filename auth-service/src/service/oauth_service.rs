//! # OAuth Federation
//!
//! Two-step OAuth login against the closed provider set
//! (google / github / microsoft).
//!
//! ## Flow
//!
//! ```text
//! InitiateOAuth(provider)
//!   └─▶ one-time state token (10 min TTL) + provider authorize URL
//!
//! HandleOAuthCallback(provider, code, state)
//!   1. consume state (one-time; CSRF defense)
//!   2. exchange code via the collaborator (never implemented here)
//!   3. find existing link ──▶ log that user in
//!      or find user by email ──▶ auto-link + log in
//!      or create tenant + user + link
//!   4. mint a token pair
//! ```
//!
//! Provider tokens are AES-256-GCM encrypted with a key managed outside
//! the core before they touch the identity store.
//!
//! Auto-linking by verified email reveals account existence to anyone who
//! completes an OAuth flow with that address (the provider has verified
//! control of it, which is why the trade-off is accepted). A stricter
//! deployment would require an interactive confirmation step here.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use shared::config::OAuthConfig;
use shared::crypto::random;
use shared::errors::ApiError;
use shared::revocation::{OAuthStateEntry, RevocationStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::domain::{NewOAuthAccount, NewUser, OAuthProvider, User};
use crate::repository::UserRepository;
use crate::service::auth_service::AuthResponse;
use crate::service::token_service::TokenService;

/// OAuth state lifetime (CSRF window).
const STATE_TTL: Duration = Duration::from_secs(10 * 60);

// =============================================================================
// Collaborator Contract
// =============================================================================

/// Identity returned by the provider after the code exchange.
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub provider_user_id: String,
    /// Email the provider has verified
    pub email: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// The code-for-token exchange, delegated to a collaborator. The core
/// never performs the provider HTTP call itself.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OAuthExchanger: Send + Sync {
    async fn exchange_code(
        &self,
        provider: OAuthProvider,
        code: &str,
    ) -> Result<OAuthProfile, ApiError>;
}

// =============================================================================
// Provider-Token Encryption
// =============================================================================

/// AES-256-GCM cipher for provider tokens at rest.
///
/// Output layout: base64(nonce || ciphertext). The key is provisioned by
/// configuration and managed outside the core.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Builds the cipher from a 32-byte hex key.
    pub fn from_hex_key(key_hex: &str) -> Result<Self, ApiError> {
        let key_bytes = hex::decode(key_hex).map_err(|_| ApiError::CryptoError {
            message: "Token encryption key is not valid hex".to_string(),
        })?;
        if key_bytes.len() != 32 {
            return Err(ApiError::CryptoError {
                message: format!("Token encryption key must be 32 bytes, got {}", key_bytes.len()),
            });
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, ApiError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| ApiError::CryptoError {
                message: "Provider token encryption failed".to_string(),
            })?;

        let mut blob = nonce.to_vec();
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, ApiError> {
        let blob = BASE64.decode(encoded).map_err(|_| ApiError::CryptoError {
            message: "Stored provider token is not valid base64".to_string(),
        })?;
        if blob.len() < 12 {
            return Err(ApiError::CryptoError {
                message: "Stored provider token is truncated".to_string(),
            });
        }
        let (nonce, ciphertext) = blob.split_at(12);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ApiError::CryptoError {
                message: "Provider token decryption failed".to_string(),
            })?;
        String::from_utf8(plaintext).map_err(|_| ApiError::CryptoError {
            message: "Decrypted provider token is not UTF-8".to_string(),
        })
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

// =============================================================================
// OAuth Service
// =============================================================================

/// Initiation URL plus the state the client must carry back.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthInitiation {
    pub url: String,
    pub state: String,
}

#[derive(Clone)]
pub struct OAuthService {
    repository: UserRepository,
    store: RevocationStore,
    tokens: TokenService,
    cipher: TokenCipher,
    exchanger: Arc<dyn OAuthExchanger>,
    config: OAuthConfig,
}

impl OAuthService {
    pub fn new(
        repository: UserRepository,
        store: RevocationStore,
        tokens: TokenService,
        cipher: TokenCipher,
        exchanger: Arc<dyn OAuthExchanger>,
        config: OAuthConfig,
    ) -> Self {
        Self { repository, store, tokens, cipher, exchanger, config }
    }

    fn client_id(&self, provider: OAuthProvider) -> &str {
        match provider {
            OAuthProvider::Google => &self.config.google_client_id,
            OAuthProvider::Github => &self.config.github_client_id,
            OAuthProvider::Microsoft => &self.config.microsoft_client_id,
        }
    }

    fn provider_scope(provider: OAuthProvider) -> &'static str {
        match provider {
            OAuthProvider::Google => "openid email profile",
            OAuthProvider::Github => "read:user user:email",
            OAuthProvider::Microsoft => "openid email profile",
        }
    }

    // =========================================================================
    // INITIATION
    // =========================================================================

    /// Generates the one-time state token and the provider authorization
    /// URL with the state embedded.
    pub async fn initiate(&self, provider: OAuthProvider) -> Result<OAuthInitiation, ApiError> {
        let state = random::random_hex(16)?;

        self.store
            .store_oauth_state(
                &state,
                &OAuthStateEntry {
                    provider: provider.to_string(),
                    redirect_uri: self.config.redirect_uri.clone(),
                },
                STATE_TTL,
            )
            .await?;

        let url = Url::parse_with_params(
            provider.authorize_endpoint(),
            &[
                ("client_id", self.client_id(provider)),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", Self::provider_scope(provider)),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| ApiError::InternalError {
            message: format!("Cannot build authorize URL: {}", e),
        })?;

        info!(provider = %provider, "OAuth flow initiated");

        Ok(OAuthInitiation { url: url.into(), state })
    }

    // =========================================================================
    // CALLBACK
    // =========================================================================

    /// Completes the flow: state proof, code exchange, then
    /// find-or-link-or-create, then token minting.
    pub async fn handle_callback(
        &self,
        provider: OAuthProvider,
        code: &str,
        state: &str,
    ) -> Result<AuthResponse, ApiError> {
        // One-time state consumption; unknown, expired, or replayed
        // states all land here
        let entry = self
            .store
            .take_oauth_state(state)
            .await?
            .ok_or_else(|| ApiError::BadRequest {
                message: "Unknown or expired OAuth state".to_string(),
            })?;

        if entry.provider != provider.to_string() {
            return Err(ApiError::BadRequest {
                message: "OAuth state was issued for a different provider".to_string(),
            });
        }

        let profile = self.exchanger.exchange_code(provider, code).await?;

        let encrypted_access = self.cipher.encrypt(&profile.access_token)?;
        let encrypted_refresh = profile
            .refresh_token
            .as_deref()
            .map(|t| self.cipher.encrypt(t))
            .transpose()?;

        let user = self
            .resolve_user(provider, &profile, &encrypted_access, encrypted_refresh)
            .await?;

        self.repository.update_last_login(user.user_id).await?;

        info!(user_id = %user.user_id, provider = %provider, "OAuth login");

        let tokens = self.tokens.issue_pair(&user).await?;
        Ok(AuthResponse { tokens, user: user.into() })
    }

    /// (a) existing link -> that user; (b) known verified email ->
    /// auto-link; (c) otherwise bootstrap tenant + user + link.
    async fn resolve_user(
        &self,
        provider: OAuthProvider,
        profile: &OAuthProfile,
        encrypted_access: &str,
        encrypted_refresh: Option<String>,
    ) -> Result<User, ApiError> {
        if let Some(account) = self
            .repository
            .find_oauth_account(provider, &profile.provider_user_id)
            .await?
        {
            self.repository
                .update_oauth_tokens(
                    account.oauth_account_id,
                    encrypted_access,
                    encrypted_refresh.as_deref(),
                )
                .await?;
            return self
                .repository
                .find_by_id(account.user_id)
                .await?
                .ok_or_else(|| ApiError::InternalError {
                    message: "OAuth account references a missing user".to_string(),
                });
        }

        if let Some(user) = self.repository.find_by_email_global(&profile.email).await? {
            self.repository
                .create_oauth_account(NewOAuthAccount {
                    tenant_id: user.tenant_id,
                    user_id: user.user_id,
                    provider,
                    provider_user_id: profile.provider_user_id.clone(),
                    encrypted_access_token: encrypted_access.to_string(),
                    encrypted_refresh_token: encrypted_refresh,
                })
                .await?;
            info!(user_id = %user.user_id, provider = %provider, "OAuth account linked");
            return Ok(user);
        }

        // Fresh identity: bootstrap a tenant, an OAuth-only user (no
        // password hash), and the link
        let tenant = self.repository.create_tenant(&profile.email).await?;
        let user = self
            .repository
            .create(NewUser {
                tenant_id: tenant.tenant_id,
                email: profile.email.clone(),
                password_hash: None,
                roles: vec!["admin".to_string(), "member".to_string()],
                email_verified: true,
            })
            .await?;
        self.repository
            .create_oauth_account(NewOAuthAccount {
                tenant_id: tenant.tenant_id,
                user_id: user.user_id,
                provider,
                provider_user_id: profile.provider_user_id.clone(),
                encrypted_access_token: encrypted_access.to_string(),
                encrypted_refresh_token: encrypted_refresh,
            })
            .await?;

        info!(user_id = %user.user_id, provider = %provider, "User created from OAuth");

        Ok(user)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> TokenCipher {
        TokenCipher::from_hex_key(&"ab".repeat(32)).unwrap()
    }

    #[test]
    fn test_token_cipher_round_trip() {
        let cipher = cipher();
        let encrypted = cipher.encrypt("ya29.provider-access-token").unwrap();

        assert_ne!(encrypted, "ya29.provider-access-token");
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "ya29.provider-access-token");
    }

    #[test]
    fn test_token_cipher_fresh_nonce_per_encryption() {
        let cipher = cipher();
        let a = cipher.encrypt("same-token").unwrap();
        let b = cipher.encrypt("same-token").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_cipher_rejects_bad_key() {
        assert!(TokenCipher::from_hex_key("deadbeef").is_err());
        assert!(TokenCipher::from_hex_key("not-hex").is_err());
    }

    #[test]
    fn test_token_cipher_rejects_tampered_blob() {
        let cipher = cipher();
        let mut encrypted = cipher.encrypt("token").unwrap();
        encrypted.replace_range(0..1, if encrypted.starts_with('A') { "B" } else { "A" });
        assert!(cipher.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_provider_scopes_are_fixed() {
        assert_eq!(OAuthService::provider_scope(OAuthProvider::Google), "openid email profile");
        assert_eq!(OAuthService::provider_scope(OAuthProvider::Github), "read:user user:email");
    }
}
