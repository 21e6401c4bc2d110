//! # Billing Repository
//!
//! All SQL for the billing domain. Statements are parameterized; the
//! subscription row helpers exist in two flavors - pool-backed reads and
//! transaction-scoped read/write pairs (`SELECT ... FOR UPDATE` plus the
//! matching `UPDATE`) for the SERIALIZABLE mutation paths.

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    BillingEventType, Invoice, InvoiceStatus, PaymentMethod, Plan, Subscription, UsageRecord,
    UsageSummary,
};

#[derive(Debug, Clone)]
pub struct BillingRepository {
    pool: PgPool,
}

impl BillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // =========================================================================
    // PLANS
    // =========================================================================

    pub async fn create_plan(&self, plan: &Plan) -> Result<Plan, ApiError> {
        let created = sqlx::query_as::<_, Plan>(
            r#"
            INSERT INTO plans (plan_id, slug, name, amount_cents, currency, interval, trial_days, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(plan.plan_id)
        .bind(&plan.slug)
        .bind(&plan.name)
        .bind(plan.amount_cents)
        .bind(&plan.currency)
        .bind(plan.interval)
        .bind(plan.trial_days)
        .bind(plan.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint() == Some("plans_slug_key") {
                    return ApiError::Conflict { resource: "plan slug".to_string() };
                }
            }
            ApiError::DatabaseError(e)
        })?;

        Ok(created)
    }

    pub async fn find_plan_by_slug(&self, slug: &str) -> Result<Option<Plan>, ApiError> {
        let plan = sqlx::query_as::<_, Plan>(
            r#"
            SELECT * FROM plans WHERE slug = $1 AND is_active
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(plan)
    }

    pub async fn find_plan_by_id(&self, plan_id: Uuid) -> Result<Option<Plan>, ApiError> {
        let plan = sqlx::query_as::<_, Plan>(
            r#"
            SELECT * FROM plans WHERE plan_id = $1
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(plan)
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    pub async fn create_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<Subscription, ApiError> {
        let created = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (
                subscription_id, tenant_id, user_id, customer_id,
                gateway_subscription_id, plan_id, payment_method_id, status,
                amount_cents, currency, current_period_start,
                current_period_end, trial_end, cancel_at_period_end,
                canceled_at, retry_count, first_payment_failure_at, next_retry_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING *
            "#,
        )
        .bind(subscription.subscription_id)
        .bind(subscription.tenant_id)
        .bind(subscription.user_id)
        .bind(&subscription.customer_id)
        .bind(&subscription.gateway_subscription_id)
        .bind(subscription.plan_id)
        .bind(subscription.payment_method_id)
        .bind(subscription.status)
        .bind(subscription.amount_cents)
        .bind(&subscription.currency)
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.trial_end)
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.canceled_at)
        .bind(subscription.retry_count)
        .bind(subscription.first_payment_failure_at)
        .bind(subscription.next_retry_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    pub async fn find_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, ApiError> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT * FROM subscriptions WHERE subscription_id = $1
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscription)
    }

    /// Row-locked read inside a SERIALIZABLE transaction; pairs with
    /// [`Self::update_subscription_in_tx`].
    pub async fn find_subscription_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, ApiError> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT * FROM subscriptions WHERE subscription_id = $1 FOR UPDATE
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(subscription)
    }

    /// Writes the mutable lifecycle fields inside the caller's
    /// transaction.
    pub async fn update_subscription_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        subscription: &Subscription,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $1,
                plan_id = $2,
                payment_method_id = $3,
                amount_cents = $4,
                current_period_start = $5,
                current_period_end = $6,
                cancel_at_period_end = $7,
                canceled_at = $8,
                retry_count = $9,
                first_payment_failure_at = $10,
                next_retry_at = $11
            WHERE subscription_id = $12
            "#,
        )
        .bind(subscription.status)
        .bind(subscription.plan_id)
        .bind(subscription.payment_method_id)
        .bind(subscription.amount_cents)
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.canceled_at)
        .bind(subscription.retry_count)
        .bind(subscription.first_payment_failure_at)
        .bind(subscription.next_retry_at)
        .bind(subscription.subscription_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    pub async fn list_subscriptions_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<Subscription>, ApiError> {
        let subscriptions = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT * FROM subscriptions
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(subscriptions)
    }

    /// Soft-canceled subscriptions whose period has ended; input for the
    /// period-end sweep.
    pub async fn find_period_end_cancellations(
        &self,
        limit: i64,
    ) -> Result<Vec<Subscription>, ApiError> {
        let subscriptions = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT * FROM subscriptions
            WHERE cancel_at_period_end
              AND status <> 'canceled'
              AND current_period_end < NOW()
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(subscriptions)
    }

    // =========================================================================
    // INVOICES
    // =========================================================================

    pub async fn create_invoice(&self, invoice: &Invoice) -> Result<Invoice, ApiError> {
        let created = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (
                invoice_id, tenant_id, subscription_id, gateway_invoice_id,
                status, amount_due_cents, amount_paid_cents, due_at, paid_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(invoice.tenant_id)
        .bind(invoice.subscription_id)
        .bind(&invoice.gateway_invoice_id)
        .bind(invoice.status)
        .bind(invoice.amount_due_cents)
        .bind(invoice.amount_paid_cents)
        .bind(invoice.due_at)
        .bind(invoice.paid_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    pub async fn find_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, ApiError> {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT * FROM invoices WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(invoice)
    }

    /// Row-locked invoice read for the SERIALIZABLE state changes.
    pub async fn find_invoice_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, ApiError> {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT * FROM invoices WHERE invoice_id = $1 FOR UPDATE
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(invoice)
    }

    pub async fn update_invoice_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: Uuid,
        status: InvoiceStatus,
        amount_paid_cents: i64,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE invoices
            SET status = $1, amount_paid_cents = $2, paid_at = $3
            WHERE invoice_id = $4
            "#,
        )
        .bind(status)
        .bind(amount_paid_cents)
        .bind(paid_at)
        .bind(invoice_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    pub async fn list_invoices_for_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Invoice>, ApiError> {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT * FROM invoices
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(invoices)
    }

    // =========================================================================
    // PAYMENT METHODS
    // =========================================================================

    pub async fn create_payment_method(
        &self,
        method: &PaymentMethod,
    ) -> Result<PaymentMethod, ApiError> {
        let created = sqlx::query_as::<_, PaymentMethod>(
            r#"
            INSERT INTO payment_methods (
                payment_method_id, tenant_id, user_id, gateway_payment_method_id,
                card_brand, card_last_four, card_exp_month, card_exp_year, is_default
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(method.payment_method_id)
        .bind(method.tenant_id)
        .bind(method.user_id)
        .bind(&method.gateway_payment_method_id)
        .bind(&method.card_brand)
        .bind(&method.card_last_four)
        .bind(method.card_exp_month)
        .bind(method.card_exp_year)
        .bind(method.is_default)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    pub async fn find_payment_method(
        &self,
        payment_method_id: Uuid,
    ) -> Result<Option<PaymentMethod>, ApiError> {
        let method = sqlx::query_as::<_, PaymentMethod>(
            r#"
            SELECT * FROM payment_methods WHERE payment_method_id = $1
            "#,
        )
        .bind(payment_method_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(method)
    }

    pub async fn mark_payment_method_detached(
        &self,
        payment_method_id: Uuid,
    ) -> Result<bool, ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_methods
            SET detached_at = NOW(), is_default = FALSE
            WHERE payment_method_id = $1 AND detached_at IS NULL
            "#,
        )
        .bind(payment_method_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // USAGE
    // =========================================================================

    pub async fn record_usage(&self, record: &UsageRecord) -> Result<UsageRecord, ApiError> {
        let created = sqlx::query_as::<_, UsageRecord>(
            r#"
            INSERT INTO usage_records (
                usage_record_id, tenant_id, subscription_id, feature_key, quantity, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(record.usage_record_id)
        .bind(record.tenant_id)
        .bind(record.subscription_id)
        .bind(&record.feature_key)
        .bind(record.quantity)
        .bind(record.recorded_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    pub async fn usage_summary(
        &self,
        subscription_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<UsageSummary>, ApiError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT feature_key, COALESCE(SUM(quantity), 0)::BIGINT
            FROM usage_records
            WHERE subscription_id = $1 AND recorded_at >= $2 AND recorded_at < $3
            GROUP BY feature_key
            ORDER BY feature_key
            "#,
        )
        .bind(subscription_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(feature_key, total)| UsageSummary { feature_key, total })
            .collect())
    }

    // =========================================================================
    // AUDIT EVENTS
    // =========================================================================

    pub async fn log_event(
        &self,
        tenant_id: Uuid,
        subscription_id: Option<Uuid>,
        invoice_id: Option<Uuid>,
        event_type: BillingEventType,
        amount_cents: Option<i64>,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO billing_events (tenant_id, subscription_id, invoice_id, event_type, amount_cents)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(tenant_id)
        .bind(subscription_id)
        .bind(invoice_id)
        .bind(event_type)
        .bind(amount_cents)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Exercised by #[ignore]d integration tests against a real database.
}
