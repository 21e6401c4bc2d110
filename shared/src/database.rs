//! # PostgreSQL Connection Pool
//!
//! Identity-store connection management using sqlx's async pool.
//!
//! ## Pool Configuration
//!
//! | Parameter | Default | Description |
//! |-----------|---------|-------------|
//! | `max_connections` | 10 | Maximum connections in pool |
//! | `min_connections` | 1 | Minimum connections to maintain |
//! | `connect_timeout` | 30s | Timeout for acquiring connection |
//! | `statement_timeout` | 5s | Per-statement deadline |
//! | `max_lifetime` | 30min | Recycle connections after this time |
//!
//! Contention manifests as a bounded acquire queue plus timeout, never as
//! unbounded connection growth. Every connection is verified before being
//! handed out (`test_before_acquire`).
//!
//! ## Isolation Levels
//!
//! Plain queries run under the server default (`READ COMMITTED`). Financial
//! mutations (subscription transitions, invoice state) MUST go through
//! [`begin_serializable`] so the state-check-and-transition is serialized.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use shared::database::{create_pool, begin_serializable};
//!
//! let pool = create_pool(&config.database).await?;
//!
//! let mut tx = begin_serializable(&pool).await?;
//! // ... check state, apply transition ...
//! tx.commit().await?;
//! ```

use crate::config::DatabaseConfig;
use crate::errors::ApiError;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::Transaction;
use std::time::Duration;
use tracing::info;

// =============================================================================
// Pool Creation
// =============================================================================

/// Creates a PostgreSQL connection pool.
///
/// Call once at application startup; `PgPool` is `Arc`-based and cheap to
/// clone into repositories.
///
/// ## Errors
///
/// Returns `ApiError::DatabaseError` if the URL is invalid, the database is
/// unreachable, or authentication fails.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, ApiError> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_timeout_seconds = config.connect_timeout_seconds,
        statement_timeout_seconds = config.statement_timeout_seconds,
        "Creating database connection pool"
    );

    let statement_timeout = config.statement_timeout_seconds;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .max_lifetime(Duration::from_secs(config.max_lifetime_seconds))
        // Verify connection is valid before handing it out
        .test_before_acquire(true)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                // Per-statement deadline; a slow statement surfaces as a
                // query error rather than an indefinitely held worker
                sqlx::Executor::execute(
                    &mut *conn,
                    format!("SET statement_timeout = '{}s'", statement_timeout).as_str(),
                )
                .await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create database pool");
            ApiError::DatabaseError(e)
        })?;

    info!("Database connection pool created successfully");

    Ok(pool)
}

// =============================================================================
// Transactions
// =============================================================================

/// Begins a SERIALIZABLE transaction for financial mutations.
///
/// Subscription and invoice state changes require that the
/// read-check-write sequence be serialized; concurrent conflicting
/// transactions fail with a serialization error and the caller retries or
/// surfaces the conflict.
pub async fn begin_serializable(pool: &PgPool) -> Result<Transaction<'_, Postgres>, ApiError> {
    let mut tx = pool.begin().await.map_err(ApiError::DatabaseError)?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *tx)
        .await
        .map_err(ApiError::DatabaseError)?;
    Ok(tx)
}

// =============================================================================
// Health Check
// =============================================================================

/// Verifies database connectivity with a `SELECT 1`.
///
/// Used by health check endpoints.
pub async fn health_check(pool: &PgPool) -> Result<(), ApiError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(ApiError::DatabaseError)?;

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    // Database tests require a real database connection.
    // They are marked with #[ignore] and run with:
    //
    //   cargo test -- --ignored
}
