//! # Service Layer
//!
//! Business logic for the authentication service. Each service owns one
//! slice of the domain and composes the shared primitives (crypto, token
//! engine, revocation store):
//!
//! | Service | Responsibility |
//! |---------|----------------|
//! | [`TokenService`] | issue / validate / rotate / revoke bearer pairs, reuse detection |
//! | [`AuthService`] | signup, login + second factor, rate limiting, logout |
//! | [`TwoFactorService`] | TOTP enrollment lifecycle, backup codes |
//! | [`OtpService`] | out-of-band OTP, email change, password reset |
//! | [`OAuthService`] | federation flows, provider-token encryption |
//! | [`ApiKeyService`] | machine credentials + scope checks |
//!
//! Collaborator boundaries ([`email_port::EmailEnqueuer`],
//! [`oauth_service::OAuthExchanger`]) are traits so the flows are
//! testable without a mail transport or a provider.

pub mod api_key_service;
pub mod auth_service;
pub mod email_port;
pub mod oauth_service;
pub mod otp_service;
pub mod token_service;
pub mod two_factor_service;

pub use api_key_service::ApiKeyService;
pub use auth_service::AuthService;
pub use oauth_service::OAuthService;
pub use otp_service::OtpService;
pub use token_service::TokenService;
pub use two_factor_service::TwoFactorService;
