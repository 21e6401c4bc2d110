//! Billing Service - Subscription & Payment Management
//!
//! This service handles the billing half of the platform:
//! - Subscription lifecycle (trialing / active / past_due / unpaid /
//!   canceled / paused) with the terminal check on every mutation
//! - Payment retry schedule (day 1 / 3 / 7, at most three attempts)
//! - Invoices with a monotonic draft → open → paid lifecycle
//! - Payment methods (gateway tokens only)
//! - Usage metering
//! - Idempotent mutations keyed by `(tenant, user, Idempotency-Key)`
//!
//! The payment processor is the deterministic in-memory double in
//! [`service::gateway`]; its state machine encodes the invariants the
//! real gateway integration must satisfy.

pub mod api;
pub mod domain;
pub mod repository;
pub mod service;

pub use api::AppState;
