//! # Email Handoff Port
//!
//! The auth service never talks to a mail transport. Outbound messages
//! (OTP codes, reset links, security notices) are handed off to the
//! delivery service's durable queue; workers there own retries, bounce
//! handling, and suppression.

use async_trait::async_trait;
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

/// A message handed off for delivery.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub tenant_id: Option<Uuid>,
    pub recipient: String,
    /// Template identifier resolved by the delivery pipeline
    pub template_id: String,
    /// Template variables (the rendered values, e.g. the OTP code)
    pub variables: serde_json::Value,
    /// 0 (low) ..= 10 (high)
    pub priority: i32,
}

/// Handoff boundary to the delivery queue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailEnqueuer: Send + Sync {
    async fn enqueue(&self, email: OutboundEmail) -> Result<(), ApiError>;
}

/// Enqueues by inserting into the delivery service's `email_queue`
/// table (the services share one Postgres, schemas split by service).
#[derive(Debug, Clone)]
pub struct SqlEmailEnqueuer {
    pool: PgPool,
}

impl SqlEmailEnqueuer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmailEnqueuer for SqlEmailEnqueuer {
    async fn enqueue(&self, email: OutboundEmail) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO email_queue (
                tenant_id, recipient, template_id, variables, priority, status, scheduled_at
            )
            VALUES ($1, $2, $3, $4, $5, 'pending', NOW())
            "#,
        )
        .bind(email.tenant_id)
        .bind(&email.recipient)
        .bind(&email.template_id)
        .bind(&email.variables)
        .bind(email.priority)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
