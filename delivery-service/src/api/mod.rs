//! # API Layer
//!
//! HTTP surface of the delivery service.
//!
//! ## Endpoint Summary
//!
//! | Method | Path | Auth |
//! |--------|------|------|
//! | POST | `/api/v1/emails` | Yes (internal enqueue) |
//! | GET  | `/api/v1/emails/{id}` | Yes |
//! | POST | `/api/v1/webhooks` | Yes |
//! | GET  | `/api/v1/webhooks` | Yes |
//! | POST | `/api/v1/webhooks/{id}/test` | Yes |
//! | DELETE | `/api/v1/webhooks/{id}` | Yes |
//! | GET  | `/health` | No |

pub mod dto;
pub mod handlers;
pub mod routes;

use crate::service::{EmailService, WebhookService};
use shared::config::RevocationPolicy;
use shared::metrics::SecurityMetrics;
use shared::revocation::RevocationStore;
use shared::token::TokenEngine;
use std::sync::Arc;

/// Shared application state injected into all request handlers.
pub struct AppState {
    pub email_service: EmailService,
    pub webhook_service: WebhookService,
    pub token_engine: Arc<TokenEngine>,
    pub revocation_store: RevocationStore,
    pub revocation_policy: RevocationPolicy,
    pub metrics: Arc<SecurityMetrics>,
}
