//! # Route Configuration
//!
//! URL patterns for the authentication service.
//!
//! ```text
//! /
//! ├── health                                GET  → health_check
//! │
//! ├── api/v1/auth/
//! │   ├── register                          POST → register
//! │   ├── login                             POST → login
//! │   ├── refresh                           POST → refresh_token
//! │   ├── logout                            POST → logout
//! │   ├── logout-all                        POST → logout_all
//! │   ├── me                                GET  → get_profile
//! │   ├── validate                          POST → validate_token
//! │   ├── totp/enroll                       POST → enroll_totp
//! │   ├── totp/verify                       POST → verify_totp
//! │   ├── totp/disable                      POST → disable_totp
//! │   ├── totp/backup-codes                 POST → regenerate_backup_codes
//! │   ├── otp/send                          POST → send_otp
//! │   ├── otp/verify                        POST → verify_otp
//! │   ├── email/change                      POST → change_email
//! │   ├── oauth/{provider}                  GET  → oauth_initiate
//! │   ├── oauth/{provider}/callback         POST → oauth_callback
//! │   ├── forgot-password                   POST → forgot_password
//! │   └── reset-password                    POST → reset_password
//! │
//! └── api/v1/api-keys/
//!     ├── (root)                            POST → create_api_key
//!     ├── (root)                            GET  → list_api_keys
//!     ├── {id}                              DELETE → revoke_api_key
//!     └── validate                          POST → validate_api_key
//! ```
//!
//! Protected routes re-validate the bearer token inside the handler
//! (defense in depth behind the mTLS edge).

use actix_web::web;

use super::handlers;

/// Configures all routes for the auth service.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // ─────────────────────────────────────────────────────────────────
        // Health Check
        // ─────────────────────────────────────────────────────────────────
        .route("/health", web::get().to(handlers::health_check))
        // ─────────────────────────────────────────────────────────────────
        // Auth API v1
        // ─────────────────────────────────────────────────────────────────
        .service(
            web::scope("/api/v1/auth")
                .route("/register", web::post().to(handlers::register))
                .route("/login", web::post().to(handlers::login))
                .route("/refresh", web::post().to(handlers::refresh_token))
                .route("/logout", web::post().to(handlers::logout))
                .route("/logout-all", web::post().to(handlers::logout_all))
                .route("/me", web::get().to(handlers::get_profile))
                .route("/validate", web::post().to(handlers::validate_token))
                .route("/totp/enroll", web::post().to(handlers::enroll_totp))
                .route("/totp/verify", web::post().to(handlers::verify_totp))
                .route("/totp/disable", web::post().to(handlers::disable_totp))
                .route(
                    "/totp/backup-codes",
                    web::post().to(handlers::regenerate_backup_codes),
                )
                .route("/otp/send", web::post().to(handlers::send_otp))
                .route("/otp/verify", web::post().to(handlers::verify_otp))
                .route("/email/change", web::post().to(handlers::change_email))
                .route("/oauth/{provider}", web::get().to(handlers::oauth_initiate))
                .route(
                    "/oauth/{provider}/callback",
                    web::post().to(handlers::oauth_callback),
                )
                .route("/forgot-password", web::post().to(handlers::forgot_password))
                .route("/reset-password", web::post().to(handlers::reset_password)),
        )
        // ─────────────────────────────────────────────────────────────────
        // API Keys v1
        // ─────────────────────────────────────────────────────────────────
        .service(
            web::scope("/api/v1/api-keys")
                .route("", web::post().to(handlers::create_api_key))
                .route("", web::get().to(handlers::list_api_keys))
                .route("/validate", web::post().to(handlers::validate_api_key))
                .route("/{id}", web::delete().to(handlers::revoke_api_key)),
        );
}
