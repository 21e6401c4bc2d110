//! # Route Configuration
//!
//! ```text
//! /
//! ├── health                          GET    → health_check
//! │
//! ├── api/v1/emails/
//! │   ├── (root)                      POST   → enqueue_email
//! │   └── {id}                        GET    → get_email
//! │
//! └── api/v1/webhooks/
//!     ├── (root)                      POST   → create_webhook
//!     ├── (root)                      GET    → list_webhooks
//!     ├── {id}/test                   POST   → test_webhook
//!     └── {id}                        DELETE → delete_webhook
//! ```

use actix_web::web;

use super::handlers;

/// Configures all routes for the delivery service.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(handlers::health_check))
        .service(
            web::scope("/api/v1/emails")
                .route("", web::post().to(handlers::enqueue_email))
                .route("/{id}", web::get().to(handlers::get_email)),
        )
        .service(
            web::scope("/api/v1/webhooks")
                .route("", web::post().to(handlers::create_webhook))
                .route("", web::get().to(handlers::list_webhooks))
                .route("/{id}/test", web::post().to(handlers::test_webhook))
                .route("/{id}", web::delete().to(handlers::delete_webhook)),
        );
}
