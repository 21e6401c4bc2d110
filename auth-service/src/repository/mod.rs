//! # Repository Layer
//!
//! Data access for the authentication domain. All statements are
//! parameterized (`$1`, `$2` - never string interpolation) and all
//! user-facing queries filter `deleted_at IS NULL`.
//!
//! | Repository | Tables |
//! |------------|--------|
//! | [`UserRepository`] | `tenants`, `users`, `oauth_accounts`, `backup_codes` |
//! | [`ApiKeyRepository`] | `api_keys` |
//!
//! Repositories hold a `PgPool` clone (Arc internally) and are cheap to
//! clone into services. Database errors map to
//! [`shared::errors::ApiError`]; unique-constraint violations surface as
//! `Conflict`.

pub mod api_key_repository;
pub mod user_repository;

pub use api_key_repository::ApiKeyRepository;
pub use user_repository::UserRepository;
