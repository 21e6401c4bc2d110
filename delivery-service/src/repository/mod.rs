//! # Repository Layer
//!
//! Data access for the email queue (including the single-claimer row
//! claim), the suppression list, webhook endpoints, and the delivery
//! attempt log.

pub mod delivery_repository;

pub use delivery_repository::DeliveryRepository;
