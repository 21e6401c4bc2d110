//! # Domain Layer
//!
//! Core business entities and domain events for the authentication
//! service. Framework-agnostic; maps directly to the database tables in
//! `migrations/0001_initial_schema.sql`.
//!
//! | Module     | Purpose                                           |
//! |------------|---------------------------------------------------|
//! | `entities` | Tenants, users, OAuth links, backup codes, API keys |
//! | `events`   | Security/audit events emitted by the service layer |
//!
//! ## Design Decisions
//!
//! 1. **Entities vs DTOs**: entities carry all database fields including
//!    secret hashes; the API layer exposes only the safe projections.
//! 2. **`FromRow` derive**: automatic mapping from database rows.
//! 3. **Soft deletes**: `deleted_at` preserves accounts for the retention
//!    window; all queries filter on it.
//! 4. **Cyclic references** (User <-> OAuthAccount <-> session) are
//!    represented as independently owned rows joined by id; the refresh
//!    binding lives in the revocation store, not here, which is what makes
//!    instant revocation cheap.

pub mod entities;
pub mod events;

pub use entities::*;
