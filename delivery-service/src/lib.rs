//! Delivery Service - Outbound Email & Webhooks
//!
//! This service owns the platform's outbound delivery primitives:
//! - Durable email queue with priorities, single-claimer workers,
//!   bounded retries (1 s / 5 s / 30 s), and hard-bounce suppression
//! - Webhook endpoints with string-based SSRF URL validation,
//!   HMAC-SHA256 payload signing (secret shown once), a
//!   1 s / 5 s / 30 s / 5 min / 30 min retry schedule, and auto-disable
//!   after ten consecutive failures
//!
//! The real mail transport is a collaborator behind
//! [`service::mail_transport::MailTransport`].

pub mod api;
pub mod domain;
pub mod repository;
pub mod service;

pub use api::AppState;
