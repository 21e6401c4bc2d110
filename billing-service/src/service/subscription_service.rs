//! # Subscription Service
//!
//! Lifecycle mutations over the subscription state machine. Every
//! mutation loads the row under a SERIALIZABLE transaction with a row
//! lock, checks [`SubscriptionStatus::can_transition_to`] (the terminal
//! check included), applies the change, and commits - a concurrent
//! conflicting mutation fails instead of corrupting the lifecycle.

use chrono::{Duration as ChronoDuration, Utc};
use shared::database;
use shared::errors::ApiError;
use shared::identity::Caller;
use shared::metrics::SecurityMetrics;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    retry_delay_days, BillingEventType, Plan, Subscription, SubscriptionStatus,
    MAX_PAYMENT_RETRIES,
};
use crate::repository::BillingRepository;
use crate::service::gateway::PaymentGateway;

#[derive(Clone)]
pub struct SubscriptionService {
    repository: BillingRepository,
    gateway: Arc<PaymentGateway>,
    metrics: Arc<SecurityMetrics>,
}

impl SubscriptionService {
    pub fn new(
        repository: BillingRepository,
        gateway: Arc<PaymentGateway>,
        metrics: Arc<SecurityMetrics>,
    ) -> Self {
        Self { repository, gateway, metrics }
    }

    // =========================================================================
    // CREATE
    // =========================================================================

    /// Checkout: creates the gateway customer and subscription, then the
    /// local row. `trialing` with a trial, `active` without.
    pub async fn create_subscription(
        &self,
        caller: &Caller,
        plan_slug: &str,
        payment_method_id: Option<Uuid>,
        trial_days_override: Option<i32>,
    ) -> Result<Subscription, ApiError> {
        let plan = self
            .repository
            .find_plan_by_slug(plan_slug)
            .await?
            .ok_or_else(|| ApiError::NotFound { resource: format!("plan:{}", plan_slug) })?;

        if let Some(method_id) = payment_method_id {
            let method = self
                .repository
                .find_payment_method(method_id)
                .await?
                .ok_or_else(|| ApiError::NotFound {
                    resource: format!("payment_method:{}", method_id),
                })?;
            caller.ensure_tenant(method.tenant_id)?;
        }

        let trial_days = trial_days_override.unwrap_or(plan.trial_days);

        let customer = self.gateway.create_customer(&caller.email);
        let gateway_subscription = self.gateway.create_subscription(
            &customer.id,
            &plan.slug,
            plan.amount_cents,
            trial_days,
        )?;

        let now = Utc::now();
        let subscription = Subscription {
            subscription_id: Uuid::new_v4(),
            tenant_id: caller.tenant_id,
            user_id: caller.user_id,
            customer_id: customer.id,
            gateway_subscription_id: Some(gateway_subscription.id),
            plan_id: plan.plan_id,
            payment_method_id,
            status: gateway_subscription.status,
            amount_cents: plan.amount_cents,
            currency: plan.currency.clone(),
            current_period_start: now,
            current_period_end: now + ChronoDuration::days(plan.interval.days()),
            trial_end: gateway_subscription.trial_end,
            cancel_at_period_end: false,
            canceled_at: None,
            retry_count: 0,
            first_payment_failure_at: None,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
        };

        let created = self.repository.create_subscription(&subscription).await?;
        self.repository
            .log_event(
                caller.tenant_id,
                Some(created.subscription_id),
                None,
                BillingEventType::SubscriptionCreated,
                Some(created.amount_cents),
            )
            .await?;

        info!(
            subscription_id = %created.subscription_id,
            tenant_id = %caller.tenant_id,
            plan = plan_slug,
            status = %created.status,
            "Subscription created"
        );

        Ok(created)
    }

    // =========================================================================
    // READ
    // =========================================================================

    /// Tenant-guarded load. A foreign-tenant id is a permission failure,
    /// never `NotFound`.
    pub async fn get_subscription(
        &self,
        caller: &Caller,
        subscription_id: Uuid,
    ) -> Result<Subscription, ApiError> {
        let subscription = self
            .repository
            .find_subscription(subscription_id)
            .await?
            .ok_or(ApiError::SubscriptionNotFound)?;

        caller.ensure_tenant(subscription.tenant_id)?;
        Ok(subscription)
    }

    pub async fn list_subscriptions(&self, caller: &Caller) -> Result<Vec<Subscription>, ApiError> {
        self.repository.list_subscriptions_for_tenant(caller.tenant_id).await
    }

    // =========================================================================
    // MUTATIONS (SERIALIZABLE)
    // =========================================================================

    /// Runs one guarded mutation: row lock under SERIALIZABLE, transition
    /// check, write, commit.
    async fn mutate<F>(&self, subscription_id: Uuid, apply: F) -> Result<Subscription, ApiError>
    where
        F: FnOnce(&mut Subscription) -> Result<Option<BillingEventType>, ApiError>,
    {
        let mut tx = database::begin_serializable(self.repository.pool()).await?;

        let mut subscription = self
            .repository
            .find_subscription_for_update(&mut tx, subscription_id)
            .await?
            .ok_or(ApiError::SubscriptionNotFound)?;

        let event = apply(&mut subscription)?;

        self.repository
            .update_subscription_in_tx(&mut tx, &subscription)
            .await?;
        tx.commit().await?;

        if let Some(event_type) = event {
            self.repository
                .log_event(
                    subscription.tenant_id,
                    Some(subscription.subscription_id),
                    None,
                    event_type,
                    Some(subscription.amount_cents),
                )
                .await?;
        }

        Ok(subscription)
    }

    /// Checks and applies a status transition (terminal check included).
    fn transition(
        subscription: &mut Subscription,
        target: SubscriptionStatus,
    ) -> Result<(), ApiError> {
        if !subscription.status.can_transition_to(target) {
            return Err(ApiError::InvalidPlanTransition {
                from: subscription.status.to_string(),
                to: target.to_string(),
            });
        }
        subscription.status = target;
        Ok(())
    }

    /// Changes the plan (price follows). Terminal subscriptions reject
    /// every mutation, plan changes included.
    pub async fn change_plan(
        &self,
        caller: &Caller,
        subscription_id: Uuid,
        new_plan_slug: &str,
    ) -> Result<Subscription, ApiError> {
        // Guard outside the transaction; the id is re-read under lock
        self.get_subscription(caller, subscription_id).await?;

        let plan: Plan = self
            .repository
            .find_plan_by_slug(new_plan_slug)
            .await?
            .ok_or_else(|| ApiError::NotFound { resource: format!("plan:{}", new_plan_slug) })?;

        self.mutate(subscription_id, move |subscription| {
            if subscription.status.is_terminal() {
                return Err(ApiError::InvalidPlanTransition {
                    from: subscription.status.to_string(),
                    to: subscription.status.to_string(),
                });
            }
            if subscription.plan_id == plan.plan_id {
                return Err(ApiError::BadRequest {
                    message: "Subscription is already on this plan".to_string(),
                });
            }
            subscription.plan_id = plan.plan_id;
            subscription.amount_cents = plan.amount_cents;
            Ok(Some(BillingEventType::SubscriptionPlanChanged))
        })
        .await
    }

    /// Cancels a subscription. `immediate` transitions to the terminal
    /// state now; otherwise the soft-cancel flag is set and the
    /// period-end sweep performs the transition later.
    pub async fn cancel_subscription(
        &self,
        caller: &Caller,
        subscription_id: Uuid,
        immediate: bool,
    ) -> Result<Subscription, ApiError> {
        let existing = self.get_subscription(caller, subscription_id).await?;

        if let Some(gateway_id) = existing.gateway_subscription_id.as_deref() {
            if immediate {
                self.gateway.cancel_subscription(gateway_id)?;
            }
        }

        self.mutate(subscription_id, move |subscription| {
            if immediate {
                Self::transition(subscription, SubscriptionStatus::Canceled)?;
                subscription.canceled_at = Some(Utc::now());
            } else {
                if subscription.status.is_terminal() {
                    return Err(ApiError::InvalidPlanTransition {
                        from: subscription.status.to_string(),
                        to: SubscriptionStatus::Canceled.to_string(),
                    });
                }
                subscription.cancel_at_period_end = true;
            }
            Ok(Some(BillingEventType::SubscriptionCanceled))
        })
        .await
    }

    /// `{active, past_due} -> paused`.
    pub async fn pause_subscription(
        &self,
        caller: &Caller,
        subscription_id: Uuid,
    ) -> Result<Subscription, ApiError> {
        self.get_subscription(caller, subscription_id).await?;
        self.mutate(subscription_id, |subscription| {
            Self::transition(subscription, SubscriptionStatus::Paused)?;
            Ok(Some(BillingEventType::SubscriptionPaused))
        })
        .await
    }

    /// `paused -> active`.
    pub async fn resume_subscription(
        &self,
        caller: &Caller,
        subscription_id: Uuid,
    ) -> Result<Subscription, ApiError> {
        self.get_subscription(caller, subscription_id).await?;
        self.mutate(subscription_id, |subscription| {
            Self::transition(subscription, SubscriptionStatus::Active)?;
            Ok(Some(BillingEventType::SubscriptionResumed))
        })
        .await
    }

    // =========================================================================
    // PAYMENT OUTCOMES
    // =========================================================================

    /// Applies a failed charge: first failure anchors the day-1/3/7
    /// schedule and moves the subscription to `past_due`; the third
    /// failure exhausts retries and moves it to `unpaid`.
    pub async fn record_payment_failure(
        &self,
        subscription_id: Uuid,
    ) -> Result<Subscription, ApiError> {
        let metrics = self.metrics.clone();
        let updated = self
            .mutate(subscription_id, move |subscription| {
                if subscription.status.is_terminal() {
                    return Err(ApiError::InvalidPlanTransition {
                        from: subscription.status.to_string(),
                        to: SubscriptionStatus::PastDue.to_string(),
                    });
                }

                let now = Utc::now();
                let anchor = *subscription.first_payment_failure_at.get_or_insert(now);
                subscription.retry_count += 1;

                if subscription.retry_count >= MAX_PAYMENT_RETRIES {
                    Self::transition(subscription, SubscriptionStatus::Unpaid)?;
                    subscription.next_retry_at = None;
                    SecurityMetrics::incr(&metrics.payment_retry_exhausted_total);
                    warn!(
                        subscription_id = %subscription.subscription_id,
                        "Payment retries exhausted; subscription unpaid"
                    );
                    Ok(Some(BillingEventType::PaymentRetriesExhausted))
                } else {
                    if subscription.status != SubscriptionStatus::PastDue {
                        Self::transition(subscription, SubscriptionStatus::PastDue)?;
                    }
                    subscription.next_retry_at = retry_delay_days(subscription.retry_count)
                        .map(|days| anchor + ChronoDuration::days(days));
                    Ok(Some(BillingEventType::PaymentFailed))
                }
            })
            .await?;

        if let Some(gateway_id) = updated.gateway_subscription_id.as_deref() {
            // Keep the gateway double's mirror in step
            let _ = self.gateway.record_payment_failure(gateway_id);
        }

        Ok(updated)
    }

    /// Applies a successful charge: `past_due -> active`, retry state
    /// cleared.
    pub async fn record_payment_success(
        &self,
        subscription_id: Uuid,
    ) -> Result<Subscription, ApiError> {
        let updated = self
            .mutate(subscription_id, |subscription| {
                if subscription.status == SubscriptionStatus::PastDue {
                    Self::transition(subscription, SubscriptionStatus::Active)?;
                }
                subscription.retry_count = 0;
                subscription.first_payment_failure_at = None;
                subscription.next_retry_at = None;
                Ok(Some(BillingEventType::PaymentSucceeded))
            })
            .await?;

        if let Some(gateway_id) = updated.gateway_subscription_id.as_deref() {
            let _ = self.gateway.record_payment_success(gateway_id);
        }

        Ok(updated)
    }

    /// Whether the billing worker should schedule another charge.
    pub async fn should_retry_payment(&self, subscription_id: Uuid) -> Result<bool, ApiError> {
        let subscription = self
            .repository
            .find_subscription(subscription_id)
            .await?
            .ok_or(ApiError::SubscriptionNotFound)?;
        Ok(subscription.status == SubscriptionStatus::PastDue
            && subscription.retry_count < MAX_PAYMENT_RETRIES)
    }

    // =========================================================================
    // PERIOD-END SWEEP
    // =========================================================================

    /// Background sweep: transitions soft-canceled subscriptions whose
    /// period has ended into the terminal state. Returns how many were
    /// finalized.
    pub async fn sweep_period_end_cancellations(&self, batch: i64) -> Result<u64, ApiError> {
        let due = self.repository.find_period_end_cancellations(batch).await?;
        let mut swept = 0;

        for subscription in due {
            let result = self
                .mutate(subscription.subscription_id, |row| {
                    // Re-check under the lock; another worker may have
                    // finalized it already
                    if !row.cancel_at_period_end || row.status.is_terminal() {
                        return Ok(None);
                    }
                    Self::transition(row, SubscriptionStatus::Canceled)?;
                    row.canceled_at = Some(Utc::now());
                    Ok(Some(BillingEventType::SubscriptionCanceled))
                })
                .await;

            match result {
                Ok(row) if row.status == SubscriptionStatus::Canceled => swept += 1,
                Ok(_) => {}
                Err(e) => warn!(
                    subscription_id = %subscription.subscription_id,
                    error = %e,
                    "Period-end sweep failed for subscription"
                ),
            }
        }

        if swept > 0 {
            info!(swept, "Period-end cancellations finalized");
        }

        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    // State-machine rules are covered in domain::entities and the
    // gateway double; the SERIALIZABLE round trips live in
    // tests/billing_flow_tests.rs (#[ignore]d).
}
