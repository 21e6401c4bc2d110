//! # Delivery Repository
//!
//! SQL for the delivery domain. The email claim uses
//! `FOR UPDATE SKIP LOCKED` inside an `UPDATE ... WHERE email_id IN
//! (SELECT ...)` so concurrent workers never hold the same row: the
//! status flip to `sending` *is* the claim.

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    BounceType, EmailMessage, EmailStatus, NewEmail, WebhookDelivery, WebhookDeliveryStatus,
    WebhookEndpoint,
};

#[derive(Debug, Clone)]
pub struct DeliveryRepository {
    pool: PgPool,
}

impl DeliveryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // =========================================================================
    // EMAIL QUEUE
    // =========================================================================

    pub async fn enqueue_email(&self, email: NewEmail) -> Result<EmailMessage, ApiError> {
        let message = sqlx::query_as::<_, EmailMessage>(
            r#"
            INSERT INTO email_queue (tenant_id, recipient, template_id, variables, priority, scheduled_at)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, NOW()))
            RETURNING *
            "#,
        )
        .bind(email.tenant_id)
        .bind(&email.recipient)
        .bind(&email.template_id)
        .bind(&email.variables)
        .bind(email.priority)
        .bind(email.scheduled_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    /// Claims up to `limit` due rows for this worker.
    ///
    /// The inner select takes row locks with SKIP LOCKED and the update
    /// flips them to `sending` in the same statement, so at most one
    /// worker ever holds a given row.
    pub async fn claim_due_emails(&self, limit: i64) -> Result<Vec<EmailMessage>, ApiError> {
        let claimed = sqlx::query_as::<_, EmailMessage>(
            r#"
            UPDATE email_queue
            SET status = 'sending'
            WHERE email_id IN (
                SELECT email_id FROM email_queue
                WHERE status IN ('pending', 'retry') AND scheduled_at <= NOW()
                ORDER BY priority DESC, scheduled_at
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            )
            RETURNING *
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(claimed)
    }

    pub async fn mark_email_sent(&self, email_id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE email_queue
            SET status = 'sent', sent_at = NOW(), last_error = NULL
            WHERE email_id = $1
            "#,
        )
        .bind(email_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Schedules a retry (or any other terminal transition) for a
    /// claimed row.
    pub async fn update_email_outcome(
        &self,
        email_id: Uuid,
        status: EmailStatus,
        retry_count: i32,
        scheduled_at: Option<DateTime<Utc>>,
        last_error: Option<&str>,
        bounce_type: Option<BounceType>,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE email_queue
            SET status = $1,
                retry_count = $2,
                scheduled_at = COALESCE($3, scheduled_at),
                last_error = $4,
                bounce_type = $5
            WHERE email_id = $6
            "#,
        )
        .bind(status)
        .bind(retry_count)
        .bind(scheduled_at)
        .bind(last_error)
        .bind(bounce_type)
        .bind(email_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_email(&self, email_id: Uuid) -> Result<Option<EmailMessage>, ApiError> {
        let message = sqlx::query_as::<_, EmailMessage>(
            r#"
            SELECT * FROM email_queue WHERE email_id = $1
            "#,
        )
        .bind(email_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    // =========================================================================
    // SUPPRESSIONS
    // =========================================================================

    pub async fn is_suppressed(&self, recipient: &str) -> Result<bool, ApiError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT recipient FROM email_suppressions WHERE recipient = $1
            "#,
        )
        .bind(recipient)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    pub async fn suppress_recipient(&self, recipient: &str, reason: &str) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO email_suppressions (recipient, reason)
            VALUES ($1, $2)
            ON CONFLICT (recipient) DO NOTHING
            "#,
        )
        .bind(recipient)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // WEBHOOK ENDPOINTS
    // =========================================================================

    pub async fn create_endpoint(
        &self,
        tenant_id: Uuid,
        url: &str,
        events: &[String],
        secret: &str,
    ) -> Result<WebhookEndpoint, ApiError> {
        let endpoint = sqlx::query_as::<_, WebhookEndpoint>(
            r#"
            INSERT INTO webhook_endpoints (tenant_id, url, events, secret)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(url)
        .bind(events)
        .bind(secret)
        .fetch_one(&self.pool)
        .await?;

        Ok(endpoint)
    }

    pub async fn find_endpoint(
        &self,
        webhook_endpoint_id: Uuid,
    ) -> Result<Option<WebhookEndpoint>, ApiError> {
        let endpoint = sqlx::query_as::<_, WebhookEndpoint>(
            r#"
            SELECT * FROM webhook_endpoints WHERE webhook_endpoint_id = $1
            "#,
        )
        .bind(webhook_endpoint_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(endpoint)
    }

    pub async fn list_endpoints_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<WebhookEndpoint>, ApiError> {
        let endpoints = sqlx::query_as::<_, WebhookEndpoint>(
            r#"
            SELECT * FROM webhook_endpoints
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(endpoints)
    }

    /// Active endpoints subscribed to an event within a tenant.
    pub async fn find_subscribed_endpoints(
        &self,
        tenant_id: Uuid,
        event_type: &str,
    ) -> Result<Vec<WebhookEndpoint>, ApiError> {
        let endpoints = sqlx::query_as::<_, WebhookEndpoint>(
            r#"
            SELECT * FROM webhook_endpoints
            WHERE tenant_id = $1
              AND disabled_at IS NULL
              AND ($2 = ANY(events) OR '*' = ANY(events))
            "#,
        )
        .bind(tenant_id)
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(endpoints)
    }

    pub async fn delete_endpoint(&self, webhook_endpoint_id: Uuid) -> Result<bool, ApiError> {
        // Attempt log first (FK)
        sqlx::query("DELETE FROM webhook_deliveries WHERE webhook_endpoint_id = $1")
            .bind(webhook_endpoint_id)
            .execute(&self.pool)
            .await?;

        let result = sqlx::query("DELETE FROM webhook_endpoints WHERE webhook_endpoint_id = $1")
            .bind(webhook_endpoint_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Resets the failure streak after a successful delivery.
    pub async fn reset_endpoint_failures(
        &self,
        webhook_endpoint_id: Uuid,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE webhook_endpoints
            SET consecutive_failures = 0
            WHERE webhook_endpoint_id = $1
            "#,
        )
        .bind(webhook_endpoint_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Increments the failure streak, returning the new count.
    pub async fn record_endpoint_failure(
        &self,
        webhook_endpoint_id: Uuid,
    ) -> Result<i32, ApiError> {
        let (count,): (i32,) = sqlx::query_as(
            r#"
            UPDATE webhook_endpoints
            SET consecutive_failures = consecutive_failures + 1
            WHERE webhook_endpoint_id = $1
            RETURNING consecutive_failures
            "#,
        )
        .bind(webhook_endpoint_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    pub async fn disable_endpoint(&self, webhook_endpoint_id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE webhook_endpoints
            SET disabled_at = NOW()
            WHERE webhook_endpoint_id = $1 AND disabled_at IS NULL
            "#,
        )
        .bind(webhook_endpoint_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Email address of a tenant admin (the auth service owns the users
    /// table; the services share one Postgres).
    pub async fn find_tenant_admin_email(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<String>, ApiError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT email FROM users
            WHERE tenant_id = $1 AND 'admin' = ANY(roles) AND deleted_at IS NULL
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(email,)| email))
    }

    // =========================================================================
    // WEBHOOK DELIVERIES
    // =========================================================================

    pub async fn create_delivery(
        &self,
        tenant_id: Uuid,
        webhook_endpoint_id: Uuid,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<WebhookDelivery, ApiError> {
        let delivery = sqlx::query_as::<_, WebhookDelivery>(
            r#"
            INSERT INTO webhook_deliveries (tenant_id, webhook_endpoint_id, event_type, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(webhook_endpoint_id)
        .bind(event_type)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;

        Ok(delivery)
    }

    /// Claims due deliveries with the same single-claimer discipline as
    /// the email queue: the status flip to `sending` is the claim.
    pub async fn claim_due_deliveries(&self, limit: i64) -> Result<Vec<WebhookDelivery>, ApiError> {
        let due = sqlx::query_as::<_, WebhookDelivery>(
            r#"
            UPDATE webhook_deliveries
            SET status = 'sending'
            WHERE webhook_delivery_id IN (
                SELECT webhook_delivery_id FROM webhook_deliveries
                WHERE status IN ('pending', 'retry') AND next_attempt_at <= NOW()
                ORDER BY next_attempt_at
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            )
            RETURNING *
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(due)
    }

    pub async fn update_delivery(
        &self,
        webhook_delivery_id: Uuid,
        status: WebhookDeliveryStatus,
        attempt_count: i32,
        next_attempt_at: Option<DateTime<Utc>>,
        last_status_code: Option<i32>,
        last_error: Option<&str>,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = $1,
                attempt_count = $2,
                next_attempt_at = COALESCE($3, next_attempt_at),
                last_status_code = $4,
                last_error = $5
            WHERE webhook_delivery_id = $6
            "#,
        )
        .bind(status)
        .bind(attempt_count)
        .bind(next_attempt_at)
        .bind(last_status_code)
        .bind(last_error)
        .bind(webhook_delivery_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Exercised by #[ignore]d integration tests against a real database.
}
