//! Auth Service - Entry point
//!
//! Starts the Actix-web HTTP server for the identity core. The server
//! binds with mutual TLS whenever `tls` is configured; plain HTTP is a
//! development convenience only.
//!
//! ## Initialization Sequence
//!
//! 1. Load configuration from environment variables
//! 2. Initialize structured logging/tracing
//! 3. Create the PostgreSQL pool and the revocation store
//! 4. Parse the RS256 key material into the token engine
//! 5. Wire services and start the HTTP server

use actix_web::{web, App, HttpServer};
use shared::config::AppConfig;
use shared::crypto::password::PasswordHasher;
use shared::database;
use shared::errors::ApiError;
use shared::metrics::SecurityMetrics;
use shared::revocation::RevocationStore;
use shared::token::TokenEngine;
use shared::transport::MutualTls;
use shared::tracing_config;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;

use auth_service::api::{routes, AppState};
use auth_service::domain::OAuthProvider;
use auth_service::repository::{ApiKeyRepository, UserRepository};
use auth_service::service::email_port::SqlEmailEnqueuer;
use auth_service::service::oauth_service::{OAuthExchanger, OAuthProfile, TokenCipher};
use auth_service::service::{
    ApiKeyService, AuthService, OAuthService, OtpService, TokenService, TwoFactorService,
};

/// Grace window after expiry before an API key row is purged.
const API_KEY_PURGE_GRACE_DAYS: i64 = 30;

/// Placeholder exchanger used when no collaborator is wired in. The
/// real code-for-token HTTP exchange is owned by the identity-provider
/// collaborator; this stub refuses every callback.
struct UnconfiguredExchanger;

#[async_trait::async_trait]
impl OAuthExchanger for UnconfiguredExchanger {
    async fn exchange_code(
        &self,
        _provider: OAuthProvider,
        _code: &str,
    ) -> Result<OAuthProfile, ApiError> {
        Err(ApiError::InternalError {
            message: "No OAuth exchanger configured".to_string(),
        })
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Configuration and logging come first; everything after can log
    let config = AppConfig::from_env().expect("Failed to load configuration");
    tracing_config::init_tracing(&config.service_name, config.is_production());

    info!(
        service = %config.service_name,
        host = %config.server.host,
        port = %config.server.port,
        "Starting auth-service"
    );

    let db_pool = database::create_pool(&config.database)
        .await
        .expect("Failed to create database pool");

    let store = RevocationStore::new(&config.redis)
        .await
        .expect("Failed to connect to revocation store");

    let engine =
        Arc::new(TokenEngine::new(config.token.clone()).expect("Invalid token key material"));
    let metrics = Arc::new(SecurityMetrics::new());
    let password_hasher = Arc::new(PasswordHasher::new());

    let user_repository = UserRepository::new(db_pool.clone());
    let api_key_repository = ApiKeyRepository::new(db_pool.clone());
    let mailer = Arc::new(SqlEmailEnqueuer::new(db_pool.clone()));

    let token_service = TokenService::new(
        engine.clone(),
        store.clone(),
        user_repository.clone(),
        metrics.clone(),
        config.revocation.clone(),
    );
    let auth_service = AuthService::new(
        user_repository.clone(),
        token_service.clone(),
        password_hasher.clone(),
        store.clone(),
        metrics.clone(),
    );
    let two_factor_service =
        TwoFactorService::new(user_repository.clone(), config.token.issuer.clone());
    let otp_service = OtpService::new(
        user_repository.clone(),
        store.clone(),
        token_service.clone(),
        password_hasher.clone(),
        mailer,
    );

    let oauth_config = config.oauth.clone().expect("OAuth configuration is required");
    let cipher = TokenCipher::from_hex_key(&oauth_config.token_encryption_key_hex)
        .expect("Invalid OAuth token encryption key");
    let oauth_service = OAuthService::new(
        user_repository.clone(),
        store.clone(),
        token_service.clone(),
        cipher,
        Arc::new(UnconfiguredExchanger),
        oauth_config,
    );

    let api_key_service = ApiKeyService::new(api_key_repository.clone(), password_hasher);

    // Lifecycle sweep: API keys past expiry plus the grace window are
    // purged; revoked/expired token state self-expires via store TTLs
    {
        let sweeper = api_key_repository;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
            loop {
                interval.tick().await;
                match sweeper.purge_expired(API_KEY_PURGE_GRACE_DAYS).await {
                    Ok(purged) if purged > 0 => info!(purged, "Expired API keys purged"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "API key purge sweep failed"),
                }
            }
        });
    }

    let app_state = web::Data::new(AppState {
        auth_service,
        token_service,
        two_factor_service,
        otp_service,
        oauth_service,
        api_key_service,
        metrics,
    });

    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(TracingLogger::default())
            .configure(routes::configure)
    });

    // Inter-service channels are mutually authenticated; plain HTTP is a
    // development convenience only
    let bind_addr = (config.server.host.as_str(), config.server.port);
    let server = match &config.tls {
        Some(tls) => {
            let rustls_config =
                MutualTls::server_config(tls).expect("Invalid mutual-TLS configuration");
            info!("Binding with mutual TLS");
            server.bind_rustls_0_23(bind_addr, rustls_config)?
        }
        None => {
            info!("Binding without TLS (development only)");
            server.bind(bind_addr)?
        }
    };

    server.run().await
}
