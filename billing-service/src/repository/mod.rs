//! # Repository Layer
//!
//! Data access for plans, subscriptions, invoices, payment methods,
//! usage, and the billing audit trail. Financial mutations go through
//! the transaction-scoped helpers so the service layer can wrap the
//! state-check-and-transition in a SERIALIZABLE transaction.

pub mod billing_repository;

pub use billing_repository::BillingRepository;
