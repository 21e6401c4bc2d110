//! Auth Service - Identity core of the Aegis platform
//!
//! This service handles all authentication functionality:
//! - Signup with tenant bootstrap, login with a second factor
//! - Bearer-token issuance, validation, rotation, and revocation
//! - TOTP enrollment and backup codes
//! - Out-of-band OTP, email change, password reset
//! - OAuth federation (google / github / microsoft)
//! - API keys with scoped, deny-by-default authorization

pub mod api;
pub mod domain;
pub mod repository;
pub mod service;

pub use api::AppState;
