//! End-to-end auth flows against real Postgres and Redis.
//!
//! These tests are #[ignore]d by default; run them with backing stores
//! available:
//!
//! ```bash
//! DATABASE_URL=postgres://... REDIS_URL=redis://... cargo test -- --ignored
//! ```

use std::sync::Arc;

use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::RsaPrivateKey;
use shared::config::{RedisConfig, RevocationPolicy, TokenConfig};
use shared::crypto::password::PasswordHasher;
use shared::errors::ApiError;
use shared::identity::Caller;
use shared::metrics::SecurityMetrics;
use shared::revocation::RevocationStore;
use shared::token::TokenEngine;
use sqlx::PgPool;
use uuid::Uuid;

use auth_service::domain::OAuthProvider;
use auth_service::repository::{ApiKeyRepository, UserRepository};
use auth_service::service::oauth_service::{
    OAuthExchanger, OAuthProfile, OAuthService, TokenCipher,
};
use auth_service::service::{ApiKeyService, AuthService, TokenService};
use shared::config::OAuthConfig;

struct TestContext {
    auth: AuthService,
    tokens: TokenService,
    api_keys: ApiKeyService,
    oauth: OAuthService,
    metrics: Arc<SecurityMetrics>,
}

/// Stand-in for the identity-provider collaborator: answers every code
/// exchange with a fixed profile.
struct StubExchanger {
    profile: OAuthProfile,
}

#[async_trait::async_trait]
impl OAuthExchanger for StubExchanger {
    async fn exchange_code(
        &self,
        _provider: OAuthProvider,
        _code: &str,
    ) -> Result<OAuthProfile, ApiError> {
        Ok(self.profile.clone())
    }
}

async fn test_context() -> TestContext {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL required for integration tests");
    let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL required for integration tests");

    let pool = PgPool::connect(&database_url).await.expect("database");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");

    let store = RevocationStore::new(&RedisConfig {
        url: redis_url,
        command_timeout_seconds: 2,
    })
    .await
    .expect("revocation store");

    let key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).expect("keygen");
    let token_config = TokenConfig {
        signing_key_pem: key.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF).unwrap().to_string(),
        public_key_pem: key
            .to_public_key()
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .unwrap(),
        kid: "it-key-1".to_string(),
        previous_public_key_pem: None,
        previous_kid: None,
        previous_retired_at: None,
        rotation_grace_hours: 24,
        access_token_ttl_seconds: 900,
        refresh_token_ttl_seconds: 2_592_000,
        issuer: "aegis".to_string(),
        audiences: vec!["aegis-api".to_string()],
    };
    let engine = Arc::new(TokenEngine::new(token_config).unwrap());

    let metrics = Arc::new(SecurityMetrics::new());
    let hasher = Arc::new(PasswordHasher::new());
    let users = UserRepository::new(pool.clone());
    let keys = ApiKeyRepository::new(pool.clone());

    let tokens = TokenService::new(
        engine,
        store.clone(),
        users.clone(),
        metrics.clone(),
        RevocationPolicy::default(),
    );
    let auth = AuthService::new(
        users,
        tokens.clone(),
        hasher.clone(),
        store,
        metrics.clone(),
    );
    let api_keys = ApiKeyService::new(keys, hasher);

    let oauth_profile = OAuthProfile {
        provider_user_id: Uuid::new_v4().to_string(),
        email: unique_email("federated"),
        access_token: "provider-access-token".to_string(),
        refresh_token: Some("provider-refresh-token".to_string()),
    };
    let oauth = OAuthService::new(
        UserRepository::new(pool.clone()),
        RevocationStore::new(&RedisConfig {
            url: std::env::var("REDIS_URL").unwrap(),
            command_timeout_seconds: 2,
        })
        .await
        .unwrap(),
        tokens.clone(),
        TokenCipher::from_hex_key(&"ab".repeat(32)).unwrap(),
        Arc::new(StubExchanger { profile: oauth_profile }),
        OAuthConfig {
            redirect_uri: "https://app.example.com/oauth/callback".to_string(),
            token_encryption_key_hex: "ab".repeat(32),
            google_client_id: "google-client".to_string(),
            github_client_id: "github-client".to_string(),
            microsoft_client_id: "microsoft-client".to_string(),
        },
    );

    TestContext { auth, tokens, api_keys, oauth, metrics }
}

fn unique_email(tag: &str) -> String {
    use fake::faker::internet::en::FreeEmailProvider;
    use fake::Fake;

    let provider: String = FreeEmailProvider().fake();
    format!("{}+{}@{}", tag, Uuid::new_v4().simple(), provider)
}

/// Login + logout kills the access token: Validate(A1) succeeds, then
/// after Logout(A1, R1) every Validate(A1) answers TokenRevoked and
/// Refresh(R1) answers RefreshExpired.
#[tokio::test]
#[ignore]
async fn login_then_logout_kills_access_token() {
    let ctx = test_context().await;
    let email = unique_email("heinstein");

    let registered = ctx
        .auth
        .register(&email, "P@ssword1234", None, None)
        .await
        .expect("register");
    let tenant_id = registered.user.tenant_id;

    let session = ctx
        .auth
        .login(tenant_id, &email, "P@ssword1234", None)
        .await
        .expect("login");
    let a1 = session.tokens.access_token.clone();
    let r1 = session.tokens.refresh_token.clone();

    let claims = ctx.tokens.validate(&a1).await.expect("A1 valid before logout");
    assert_eq!(claims.email, email);

    ctx.auth.logout(&claims).await.expect("logout");

    assert!(matches!(ctx.tokens.validate(&a1).await, Err(ApiError::TokenRevoked)));
    assert!(matches!(ctx.tokens.refresh(&r1).await, Err(ApiError::RefreshExpired)));
}

/// Refresh reuse revokes the whole session chain and counts the
/// dedicated metric; the legitimate successor token dies with it.
#[tokio::test]
#[ignore]
async fn refresh_reuse_revokes_session_chain() {
    let ctx = test_context().await;
    let email = unique_email("reuse");

    let registered = ctx
        .auth
        .register(&email, "P@ssword1234", None, None)
        .await
        .expect("register");

    let session = ctx
        .auth
        .login(registered.user.tenant_id, &email, "P@ssword1234", None)
        .await
        .expect("login");
    let r1 = session.tokens.refresh_token.clone();

    let rotated = ctx.tokens.refresh(&r1).await.expect("first rotation");
    let r2 = rotated.refresh_token.clone();

    let reuse_before = SecurityMetrics::get(&ctx.metrics.refresh_reuse_detected_total);

    // Presenting R1 again is reuse
    assert!(matches!(ctx.tokens.refresh(&r1).await, Err(ApiError::SessionRevoked)));
    assert_eq!(
        SecurityMetrics::get(&ctx.metrics.refresh_reuse_detected_total),
        reuse_before + 1
    );

    // The chain is void: R2 no longer works either
    assert!(matches!(ctx.tokens.refresh(&r2).await, Err(ApiError::SessionRevoked)));
}

/// Rotation produces a usable successor: the new access token validates
/// and the new refresh token rotates again.
#[tokio::test]
#[ignore]
async fn rotation_produces_working_pair() {
    let ctx = test_context().await;
    let email = unique_email("rotate");

    let registered = ctx
        .auth
        .register(&email, "P@ssword1234", None, None)
        .await
        .expect("register");

    let session = ctx
        .auth
        .login(registered.user.tenant_id, &email, "P@ssword1234", None)
        .await
        .expect("login");

    let rotated = ctx
        .tokens
        .refresh(&session.tokens.refresh_token)
        .await
        .expect("rotation");

    assert!(ctx.tokens.validate(&rotated.access_token).await.is_ok());
    assert!(ctx.tokens.refresh(&rotated.refresh_token).await.is_ok());
}

/// Wrong-password attempts lock the account at the threshold and emit
/// AccountLocked thereafter.
#[tokio::test]
#[ignore]
async fn repeated_failures_lock_account() {
    let ctx = test_context().await;
    let email = unique_email("lock");

    let registered = ctx
        .auth
        .register(&email, "P@ssword1234", None, None)
        .await
        .expect("register");
    let tenant_id = registered.user.tenant_id;

    let mut locked = false;
    for _ in 0..20 {
        match ctx.auth.login(tenant_id, &email, "WrongP@ss9999", None).await {
            Err(ApiError::InvalidCredentials) => {}
            Err(ApiError::AccountLocked { .. }) => {
                locked = true;
                break;
            }
            other => panic!("unexpected login outcome: {:?}", other.map(|_| ())),
        }
    }
    assert!(locked, "20th failure must lock the account");

    // Even the correct password is refused while locked
    assert!(matches!(
        ctx.auth.login(tenant_id, &email, "P@ssword1234", None).await,
        Err(ApiError::AccountLocked { .. })
    ));
}

/// Scope grammar through the API-key path: `read:*` covers
/// `read:upload` but neither `write:upload` nor `readonly:upload`.
#[tokio::test]
#[ignore]
async fn api_key_scope_wildcard_has_colon_boundary() {
    let ctx = test_context().await;
    let email = unique_email("scopes");

    let registered = ctx
        .auth
        .register(&email, "P@ssword1234", None, None)
        .await
        .expect("register");

    let caller = Caller {
        user_id: registered.user.user_id,
        tenant_id: registered.user.tenant_id,
        email: registered.user.email.clone(),
        roles: registered.user.roles.clone(),
    };

    let created = ctx
        .api_keys
        .create(&caller, "ci-reader", vec!["read:*".to_string()], None)
        .await
        .expect("create key");

    // Shown once: the stored record carries only prefix + hash
    assert!(created.full_key.starts_with(&created.key.prefix));

    let identity = ctx
        .api_keys
        .validate_key(&created.full_key, "read:upload")
        .await
        .expect("read:upload allowed");
    assert_eq!(identity.tenant_id, registered.user.tenant_id);

    assert!(matches!(
        ctx.api_keys.validate_key(&created.full_key, "write:upload").await,
        Err(ApiError::ScopeDenied { .. })
    ));
    assert!(matches!(
        ctx.api_keys.validate_key(&created.full_key, "readonly:upload").await,
        Err(ApiError::ScopeDenied { .. })
    ));

    // A revoked key stops authenticating entirely
    ctx.api_keys.revoke(&caller, created.key.api_key_id).await.expect("revoke");
    assert!(matches!(
        ctx.api_keys.validate_key(&created.full_key, "read:upload").await,
        Err(ApiError::ApiKeyRevoked)
    ));
}

/// OAuth: state is one-time, callbacks create the user on first login
/// and find the link on the second.
#[tokio::test]
#[ignore]
async fn oauth_state_is_one_time_and_user_is_created_once() {
    let ctx = test_context().await;

    let initiation = ctx.oauth.initiate(OAuthProvider::Github).await.expect("initiate");
    assert!(initiation.url.contains(&format!("state={}", initiation.state)));

    let first = ctx
        .oauth
        .handle_callback(OAuthProvider::Github, "provider-code", &initiation.state)
        .await
        .expect("first callback");

    // Replaying the consumed state is refused
    assert!(ctx
        .oauth
        .handle_callback(OAuthProvider::Github, "provider-code", &initiation.state)
        .await
        .is_err());

    // A fresh state logs the same user in via the existing link
    let second_state = ctx.oauth.initiate(OAuthProvider::Github).await.unwrap();
    let second = ctx
        .oauth
        .handle_callback(OAuthProvider::Github, "provider-code", &second_state.state)
        .await
        .expect("second callback");

    assert_eq!(first.user.user_id, second.user.user_id);
}

/// Distinct API keys produce distinct stored hashes.
#[tokio::test]
#[ignore]
async fn api_key_secrets_hash_distinctly() {
    let ctx = test_context().await;
    let email = unique_email("hashes");

    let registered = ctx
        .auth
        .register(&email, "P@ssword1234", None, None)
        .await
        .expect("register");

    let caller = Caller {
        user_id: registered.user.user_id,
        tenant_id: registered.user.tenant_id,
        email: registered.user.email.clone(),
        roles: registered.user.roles.clone(),
    };

    let a = ctx.api_keys.create(&caller, "a", vec!["read:*".into()], None).await.unwrap();
    let b = ctx.api_keys.create(&caller, "b", vec!["read:*".into()], None).await.unwrap();

    assert_ne!(a.full_key, b.full_key);
}
