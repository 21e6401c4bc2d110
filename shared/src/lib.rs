//! # Aegis - Shared Library
//!
//! Core shared functionality for the Aegis auth/billing microservices.
//!
//! This crate provides the primitives every service in the platform depends
//! on: configuration, error taxonomy, crypto, the token engine, the
//! revocation store, scope matching, tenant isolation, and the mutually
//! authenticated transport layer. It follows the DRY principle so the
//! security-critical code paths exist exactly once.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Microservices                           │
//! │  ┌─────────┐ ┌─────────┐ ┌──────────┐                      │
//! │  │  Auth   │ │ Billing │ │ Delivery │                      │
//! │  └────┬────┘ └────┬────┘ └────┬─────┘                      │
//! │       │           │           │                             │
//! │       └───────────┴───────────┘                             │
//! │                   │                                         │
//! │          ┌────────▼────────┐                                │
//! │          │  shared crate   │ ◄── You are here               │
//! │          └─────────────────┘                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose | Key Types |
//! |--------|---------|-----------|
//! | [`config`] | Environment-based configuration | [`AppConfig`] |
//! | [`errors`] | Standardized error taxonomy | [`ApiError`], [`ApiResult`] |
//! | [`crypto`] | Password hashing, TOTP, HMAC signing, secure random | [`crypto::password::PasswordHasher`] |
//! | [`token`] | RS256 bearer-token engine | [`token::TokenEngine`], [`token::AccessClaims`] |
//! | [`identity`] | Validated caller identity + tenant isolation | [`identity::Caller`] |
//! | [`scopes`] | API-key scope grammar | [`scopes::scope_allows`] |
//! | [`revocation`] | TTL'd revocation/rate-limit store | [`revocation::RevocationStore`] |
//! | [`database`] | PostgreSQL connection pool | [`database::create_pool`] |
//! | [`transport`] | Mutual-TLS channel configs | [`transport::MutualTls`] |
//! | [`metrics`] | Security event counters | [`metrics::SecurityMetrics`] |
//! | [`tracing_config`] | Structured logging setup | [`tracing_config::init_tracing`] |
//! | [`validation`] | Request validation helpers | Custom validators |
//!
//! ## Design Decisions
//!
//! 1. **Single source of truth**: token validation, scope matching, and the
//!    revocation key namespaces live here and nowhere else
//! 2. **Security first**: RS256-only token envelope, Argon2id everywhere a
//!    secret is persisted, constant-time comparisons on every verifier
//! 3. **Observable by default**: structured logging plus in-process
//!    security counters the test suite can read back
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use shared::{AppConfig, ApiError, ApiResult};
//! use shared::token::TokenEngine;
//! use shared::database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env()?;
//!     let db_pool = database::create_pool(&config.database).await?;
//!     let engine = TokenEngine::new(config.token.clone())?;
//!
//!     // Ready to build your service!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crypto;
pub mod database;
pub mod errors;
pub mod identity;
pub mod metrics;
pub mod revocation;
pub mod scopes;
pub mod token;
pub mod tracing_config;
pub mod transport;
pub mod validation;

// Re-exports for convenience - import commonly used types directly from `shared`
pub use config::AppConfig;
pub use errors::{ApiError, ApiResult};
