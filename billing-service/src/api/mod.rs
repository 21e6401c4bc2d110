//! # API Layer
//!
//! HTTP surface of the billing service.
//!
//! ## Endpoint Summary
//!
//! | Method | Path | Auth | Idempotency-Key |
//! |--------|------|------|-----------------|
//! | POST | `/api/v1/subscriptions` | Yes | required |
//! | GET  | `/api/v1/subscriptions` | Yes | - |
//! | GET  | `/api/v1/subscriptions/{id}` | Yes | - |
//! | PATCH | `/api/v1/subscriptions/{id}` | Yes | required |
//! | POST | `/api/v1/subscriptions/{id}/cancel` | Yes | required |
//! | POST | `/api/v1/subscriptions/{id}/pause` | Yes | required |
//! | POST | `/api/v1/subscriptions/{id}/resume` | Yes | required |
//! | GET  | `/api/v1/subscriptions/{id}/usage` | Yes | - |
//! | POST | `/api/v1/payment-methods` | Yes | required |
//! | DELETE | `/api/v1/payment-methods/{id}` | Yes | required |
//! | GET  | `/api/v1/invoices` | Yes | - |
//! | GET  | `/health` | No | - |
//!
//! Payment and subscription mutations REQUIRE the `Idempotency-Key`
//! header; retries inside the 24-hour window replay the first response
//! byte-for-byte.

pub mod dto;
pub mod handlers;
pub mod routes;

use crate::service::{BillingService, IdempotencyLayer, SubscriptionService};
use shared::config::RevocationPolicy;
use shared::metrics::SecurityMetrics;
use shared::revocation::RevocationStore;
use shared::token::TokenEngine;
use std::sync::Arc;

/// Shared application state injected into all request handlers.
pub struct AppState {
    pub subscription_service: SubscriptionService,
    pub billing_service: BillingService,
    pub idempotency: IdempotencyLayer,
    pub token_engine: Arc<TokenEngine>,
    pub revocation_store: RevocationStore,
    pub revocation_policy: RevocationPolicy,
    pub metrics: Arc<SecurityMetrics>,
}
