//! # Service Layer
//!
//! | Service | Responsibility |
//! |---------|----------------|
//! | [`SubscriptionService`] | lifecycle mutations under SERIALIZABLE, payment retry schedule, period-end sweep |
//! | [`BillingService`] | invoices (monotonic lifecycle), payment methods, usage |
//! | [`gateway::PaymentGateway`] | deterministic in-memory processor double |
//! | [`idempotency::IdempotencyLayer`] | at-most-once mutation replay |

pub mod billing_service;
pub mod gateway;
pub mod idempotency;
pub mod subscription_service;

pub use billing_service::BillingService;
pub use gateway::PaymentGateway;
pub use idempotency::IdempotencyLayer;
pub use subscription_service::SubscriptionService;
