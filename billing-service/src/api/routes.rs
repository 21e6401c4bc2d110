//! # Route Configuration
//!
//! ```text
//! /
//! ├── health                                    GET    → health_check
//! │
//! ├── api/v1/subscriptions/
//! │   ├── (root)                                POST   → create_subscription
//! │   ├── (root)                                GET    → list_subscriptions
//! │   ├── {id}                                  GET    → get_subscription
//! │   ├── {id}                                  PATCH  → update_subscription
//! │   ├── {id}/cancel                           POST   → cancel_subscription
//! │   ├── {id}/pause                            POST   → pause_subscription
//! │   ├── {id}/resume                           POST   → resume_subscription
//! │   └── {id}/usage                            GET    → get_usage
//! │
//! ├── api/v1/payment-methods/
//! │   ├── (root)                                POST   → add_payment_method
//! │   └── {id}                                  DELETE → detach_payment_method
//! │
//! └── api/v1/invoices                           GET    → list_invoices
//! ```

use actix_web::web;

use super::handlers;

/// Configures all routes for the billing service.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(handlers::health_check))
        .service(
            web::scope("/api/v1/subscriptions")
                .route("", web::post().to(handlers::create_subscription))
                .route("", web::get().to(handlers::list_subscriptions))
                .route("/{id}", web::get().to(handlers::get_subscription))
                .route("/{id}", web::patch().to(handlers::update_subscription))
                .route("/{id}/cancel", web::post().to(handlers::cancel_subscription))
                .route("/{id}/pause", web::post().to(handlers::pause_subscription))
                .route("/{id}/resume", web::post().to(handlers::resume_subscription))
                .route("/{id}/usage", web::get().to(handlers::get_usage)),
        )
        .service(
            web::scope("/api/v1/payment-methods")
                .route("", web::post().to(handlers::add_payment_method))
                .route("/{id}", web::delete().to(handlers::detach_payment_method)),
        )
        .route("/api/v1/invoices", web::get().to(handlers::list_invoices));
}
