//! # Payment Gateway Double
//!
//! Deterministic in-memory stand-in for the payment processor. The double
//! is not a toy: its subscription state machine and payment-retry
//! contract encode the billing invariants the real gateway integration
//! must also satisfy, and the test suite drives them through this
//! implementation.
//!
//! ## Determinism
//!
//! Ids are counter-based (`cus_1`, `sub_2`, ...) and payment outcomes
//! follow an explicitly configured [`PaymentOutcome`] - no randomness, so
//! every test run observes identical behavior.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use shared::errors::ApiError;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::{
    retry_delay_days, InvoiceStatus, SubscriptionStatus, MAX_PAYMENT_RETRIES,
};

// =============================================================================
// Configured Outcomes
// =============================================================================

/// Deterministic payment behavior, tunable per test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Every charge succeeds
    SucceedAll,
    /// Every charge fails
    FailAll,
    /// The next `n` charges fail, then charges succeed
    FailNext(u32),
}

// =============================================================================
// Gateway Records
// =============================================================================

#[derive(Debug, Clone)]
pub struct GatewayCustomer {
    pub id: String,
    pub email: String,
    pub default_payment_method: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayPaymentMethod {
    pub id: String,
    pub card_last_four: String,
    pub exp_month: i32,
    pub exp_year: i32,
    pub attached_to: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewaySubscription {
    pub id: String,
    pub customer_id: String,
    pub plan_slug: String,
    pub amount_cents: i64,
    pub status: SubscriptionStatus,
    pub trial_end: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub first_payment_failure_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct GatewayInvoice {
    pub id: String,
    pub subscription_id: String,
    pub amount_cents: i64,
    pub status: InvoiceStatus,
}

/// Result of a charge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeResult {
    Succeeded,
    Failed,
}

// =============================================================================
// The Double
// =============================================================================

#[derive(Debug, Default)]
struct GatewayState {
    customers: HashMap<String, GatewayCustomer>,
    payment_methods: HashMap<String, GatewayPaymentMethod>,
    subscriptions: HashMap<String, GatewaySubscription>,
    invoices: HashMap<String, GatewayInvoice>,
    counter: u64,
}

/// In-memory payment gateway.
///
/// Interior mutability behind a `Mutex`; call sites hold the lock only
/// for the duration of one operation, mirroring the single round trip a
/// real gateway call would be.
#[derive(Debug)]
pub struct PaymentGateway {
    state: Mutex<GatewayState>,
    outcome: Mutex<PaymentOutcome>,
}

impl Default for PaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GatewayState::default()),
            outcome: Mutex::new(PaymentOutcome::SucceedAll),
        }
    }

    /// Reconfigures charge behavior (testing hook).
    pub fn set_outcome(&self, outcome: PaymentOutcome) {
        *self.outcome.lock().expect("gateway lock") = outcome;
    }

    fn next_id(state: &mut GatewayState, prefix: &str) -> String {
        state.counter += 1;
        format!("{}_{}", prefix, state.counter)
    }

    /// Decides (and consumes) the outcome of one charge.
    fn decide_charge(&self) -> ChargeResult {
        let mut outcome = self.outcome.lock().expect("gateway lock");
        match *outcome {
            PaymentOutcome::SucceedAll => ChargeResult::Succeeded,
            PaymentOutcome::FailAll => ChargeResult::Failed,
            PaymentOutcome::FailNext(0) => {
                *outcome = PaymentOutcome::SucceedAll;
                ChargeResult::Succeeded
            }
            PaymentOutcome::FailNext(n) => {
                *outcome = PaymentOutcome::FailNext(n - 1);
                ChargeResult::Failed
            }
        }
    }

    // =========================================================================
    // CUSTOMERS & PAYMENT METHODS
    // =========================================================================

    pub fn create_customer(&self, email: &str) -> GatewayCustomer {
        let mut state = self.state.lock().expect("gateway lock");
        let id = Self::next_id(&mut state, "cus");
        let customer = GatewayCustomer {
            id: id.clone(),
            email: email.to_string(),
            default_payment_method: None,
        };
        state.customers.insert(id, customer.clone());
        customer
    }

    pub fn create_payment_method(
        &self,
        card_last_four: &str,
        exp_month: i32,
        exp_year: i32,
    ) -> GatewayPaymentMethod {
        let mut state = self.state.lock().expect("gateway lock");
        let id = Self::next_id(&mut state, "pm");
        let method = GatewayPaymentMethod {
            id: id.clone(),
            card_last_four: card_last_four.to_string(),
            exp_month,
            exp_year,
            attached_to: None,
        };
        state.payment_methods.insert(id, method.clone());
        method
    }

    pub fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().expect("gateway lock");
        if !state.customers.contains_key(customer_id) {
            return Err(ApiError::ProcessorError);
        }
        let method = state
            .payment_methods
            .get_mut(payment_method_id)
            .ok_or(ApiError::ProcessorError)?;
        method.attached_to = Some(customer_id.to_string());
        let customer = state
            .customers
            .get_mut(customer_id)
            .expect("customer checked above");
        customer.default_payment_method = Some(payment_method_id.to_string());
        Ok(())
    }

    pub fn detach_payment_method(&self, payment_method_id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().expect("gateway lock");
        let method = state
            .payment_methods
            .get_mut(payment_method_id)
            .ok_or(ApiError::ProcessorError)?;
        let owner = method.attached_to.take();
        if let Some(customer_id) = owner {
            if let Some(customer) = state.customers.get_mut(&customer_id) {
                if customer.default_payment_method.as_deref() == Some(payment_method_id) {
                    customer.default_payment_method = None;
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    /// Creates a gateway subscription: `trialing` with a trial, `active`
    /// without one.
    pub fn create_subscription(
        &self,
        customer_id: &str,
        plan_slug: &str,
        amount_cents: i64,
        trial_days: i32,
    ) -> Result<GatewaySubscription, ApiError> {
        let mut state = self.state.lock().expect("gateway lock");
        if !state.customers.contains_key(customer_id) {
            return Err(ApiError::ProcessorError);
        }

        let id = Self::next_id(&mut state, "sub");
        let (status, trial_end) = if trial_days > 0 {
            (
                SubscriptionStatus::Trialing,
                Some(Utc::now() + ChronoDuration::days(trial_days as i64)),
            )
        } else {
            (SubscriptionStatus::Active, None)
        };

        let subscription = GatewaySubscription {
            id: id.clone(),
            customer_id: customer_id.to_string(),
            plan_slug: plan_slug.to_string(),
            amount_cents,
            status,
            trial_end,
            retry_count: 0,
            first_payment_failure_at: None,
            next_retry_at: None,
        };
        state.subscriptions.insert(id, subscription.clone());
        Ok(subscription)
    }

    pub fn get_subscription(&self, id: &str) -> Result<GatewaySubscription, ApiError> {
        let state = self.state.lock().expect("gateway lock");
        state
            .subscriptions
            .get(id)
            .cloned()
            .ok_or(ApiError::SubscriptionNotFound)
    }

    /// Cancels at the gateway. Terminal check applies here exactly as it
    /// does in the service layer.
    pub fn cancel_subscription(&self, id: &str) -> Result<GatewaySubscription, ApiError> {
        let mut state = self.state.lock().expect("gateway lock");
        let subscription = state
            .subscriptions
            .get_mut(id)
            .ok_or(ApiError::SubscriptionNotFound)?;

        if !subscription.status.can_transition_to(SubscriptionStatus::Canceled) {
            return Err(ApiError::InvalidPlanTransition {
                from: subscription.status.to_string(),
                to: SubscriptionStatus::Canceled.to_string(),
            });
        }
        subscription.status = SubscriptionStatus::Canceled;
        Ok(subscription.clone())
    }

    // =========================================================================
    // PAYMENT RETRY CONTRACT
    // =========================================================================

    /// Records a failed charge against a subscription.
    ///
    /// First failure: `active`/`trialing` -> `past_due`, the failure
    /// timestamp anchors the day-1/3/7 schedule. Each failure increments
    /// `retry_count`; at three the subscription goes `unpaid` and no
    /// further retry is scheduled.
    pub fn record_payment_failure(&self, id: &str) -> Result<GatewaySubscription, ApiError> {
        let mut state = self.state.lock().expect("gateway lock");
        let subscription = state
            .subscriptions
            .get_mut(id)
            .ok_or(ApiError::SubscriptionNotFound)?;

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
            subscription.status = SubscriptionStatus::Unpaid;
            subscription.next_retry_at = None;
        } else {
            if subscription.status != SubscriptionStatus::PastDue {
                subscription.status = SubscriptionStatus::PastDue;
            }
            subscription.next_retry_at = retry_delay_days(subscription.retry_count)
                .map(|days| anchor + ChronoDuration::days(days));
        }

        Ok(subscription.clone())
    }

    /// Records a successful charge: `past_due` -> `active`, retry state
    /// cleared.
    pub fn record_payment_success(&self, id: &str) -> Result<GatewaySubscription, ApiError> {
        let mut state = self.state.lock().expect("gateway lock");
        let subscription = state
            .subscriptions
            .get_mut(id)
            .ok_or(ApiError::SubscriptionNotFound)?;

        if subscription.status == SubscriptionStatus::PastDue {
            subscription.status = SubscriptionStatus::Active;
        }
        subscription.retry_count = 0;
        subscription.first_payment_failure_at = None;
        subscription.next_retry_at = None;

        Ok(subscription.clone())
    }

    /// Whether another retry should be attempted.
    pub fn should_retry_payment(&self, id: &str) -> Result<bool, ApiError> {
        let state = self.state.lock().expect("gateway lock");
        let subscription = state
            .subscriptions
            .get(id)
            .ok_or(ApiError::SubscriptionNotFound)?;
        Ok(subscription.status == SubscriptionStatus::PastDue
            && subscription.retry_count < MAX_PAYMENT_RETRIES)
    }

    // =========================================================================
    // INVOICES
    // =========================================================================

    pub fn create_invoice(
        &self,
        subscription_id: &str,
        amount_cents: i64,
    ) -> Result<GatewayInvoice, ApiError> {
        let mut state = self.state.lock().expect("gateway lock");
        if !state.subscriptions.contains_key(subscription_id) {
            return Err(ApiError::SubscriptionNotFound);
        }
        let id = Self::next_id(&mut state, "in");
        let invoice = GatewayInvoice {
            id: id.clone(),
            subscription_id: subscription_id.to_string(),
            amount_cents,
            status: InvoiceStatus::Draft,
        };
        state.invoices.insert(id, invoice.clone());
        Ok(invoice)
    }

    pub fn finalize_invoice(&self, id: &str) -> Result<GatewayInvoice, ApiError> {
        let mut state = self.state.lock().expect("gateway lock");
        let invoice = state.invoices.get_mut(id).ok_or(ApiError::ProcessorError)?;
        if !invoice.status.can_transition_to(InvoiceStatus::Open) {
            return Err(ApiError::ProcessorError);
        }
        invoice.status = InvoiceStatus::Open;
        Ok(invoice.clone())
    }

    /// Attempts to charge an open invoice. The configured
    /// [`PaymentOutcome`] decides success; a success marks the invoice
    /// paid, a failure leaves it open (the caller records the failure
    /// against the subscription).
    pub fn pay_invoice(&self, id: &str) -> Result<ChargeResult, ApiError> {
        {
            let state = self.state.lock().expect("gateway lock");
            let invoice = state.invoices.get(id).ok_or(ApiError::ProcessorError)?;
            if invoice.status == InvoiceStatus::Paid {
                return Err(ApiError::InvoiceAlreadyPaid);
            }
            if invoice.status != InvoiceStatus::Open {
                return Err(ApiError::ProcessorError);
            }
        }

        let result = self.decide_charge();

        if result == ChargeResult::Succeeded {
            let mut state = self.state.lock().expect("gateway lock");
            let invoice = state.invoices.get_mut(id).ok_or(ApiError::ProcessorError)?;
            invoice.status = InvoiceStatus::Paid;
        }

        Ok(result)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Three failed payments send the subscription to `unpaid`
    /// (spec-level scenario: create on plan `pro` with trial_days=0 ->
    /// active; three RecordPaymentFailure calls walk it through
    /// past_due to unpaid).
    #[test]
    fn test_three_failures_reach_unpaid() {
        let gateway = PaymentGateway::new();
        let customer = gateway.create_customer("billing@example.com");
        let sub = gateway
            .create_subscription(&customer.id, "pro", 4900, 0)
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);

        let after_first = gateway.record_payment_failure(&sub.id).unwrap();
        assert_eq!(after_first.status, SubscriptionStatus::PastDue);
        assert_eq!(after_first.retry_count, 1);
        assert!(gateway.should_retry_payment(&sub.id).unwrap());

        let after_second = gateway.record_payment_failure(&sub.id).unwrap();
        assert_eq!(after_second.status, SubscriptionStatus::PastDue);
        assert_eq!(after_second.retry_count, 2);

        let after_third = gateway.record_payment_failure(&sub.id).unwrap();
        assert_eq!(after_third.retry_count, 3);
        assert_eq!(after_third.status, SubscriptionStatus::Unpaid);
        assert!(after_third.next_retry_at.is_none());
        assert!(!gateway.should_retry_payment(&sub.id).unwrap());
    }

    #[test]
    fn test_retry_schedule_anchored_to_first_failure() {
        let gateway = PaymentGateway::new();
        let customer = gateway.create_customer("retry@example.com");
        let sub = gateway
            .create_subscription(&customer.id, "pro", 4900, 0)
            .unwrap();

        let first = gateway.record_payment_failure(&sub.id).unwrap();
        let anchor = first.first_payment_failure_at.unwrap();
        let day1 = first.next_retry_at.unwrap();
        assert_eq!((day1 - anchor).num_days(), 1);

        let second = gateway.record_payment_failure(&sub.id).unwrap();
        // Same anchor; day-3 offset counts from the original failure
        assert_eq!(second.first_payment_failure_at.unwrap(), anchor);
        assert_eq!((second.next_retry_at.unwrap() - anchor).num_days(), 3);
    }

    #[test]
    fn test_payment_success_recovers_past_due() {
        let gateway = PaymentGateway::new();
        let customer = gateway.create_customer("recover@example.com");
        let sub = gateway
            .create_subscription(&customer.id, "pro", 4900, 0)
            .unwrap();

        gateway.record_payment_failure(&sub.id).unwrap();
        let recovered = gateway.record_payment_success(&sub.id).unwrap();

        assert_eq!(recovered.status, SubscriptionStatus::Active);
        assert_eq!(recovered.retry_count, 0);
        assert!(recovered.first_payment_failure_at.is_none());
    }

    #[test]
    fn test_trialing_when_trial_days_positive() {
        let gateway = PaymentGateway::new();
        let customer = gateway.create_customer("trial@example.com");
        let sub = gateway
            .create_subscription(&customer.id, "pro", 4900, 14)
            .unwrap();

        assert_eq!(sub.status, SubscriptionStatus::Trialing);
        assert!(sub.trial_end.is_some());
    }

    #[test]
    fn test_canceled_admits_no_mutation() {
        let gateway = PaymentGateway::new();
        let customer = gateway.create_customer("terminal@example.com");
        let sub = gateway
            .create_subscription(&customer.id, "pro", 4900, 0)
            .unwrap();

        gateway.cancel_subscription(&sub.id).unwrap();

        // Re-canceling and failing payments are both rejected
        assert!(matches!(
            gateway.cancel_subscription(&sub.id),
            Err(ApiError::InvalidPlanTransition { .. })
        ));
        assert!(matches!(
            gateway.record_payment_failure(&sub.id),
            Err(ApiError::InvalidPlanTransition { .. })
        ));
    }

    #[test]
    fn test_invoice_lifecycle_and_charge_outcomes() {
        let gateway = PaymentGateway::new();
        let customer = gateway.create_customer("invoice@example.com");
        let sub = gateway
            .create_subscription(&customer.id, "pro", 4900, 0)
            .unwrap();

        let invoice = gateway.create_invoice(&sub.id, 4900).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Draft);

        // Draft invoices can't be charged
        assert!(gateway.pay_invoice(&invoice.id).is_err());

        gateway.finalize_invoice(&invoice.id).unwrap();

        gateway.set_outcome(PaymentOutcome::FailNext(1));
        assert_eq!(gateway.pay_invoice(&invoice.id).unwrap(), ChargeResult::Failed);
        assert_eq!(gateway.pay_invoice(&invoice.id).unwrap(), ChargeResult::Succeeded);

        // Paying a paid invoice is a conflict
        assert!(matches!(
            gateway.pay_invoice(&invoice.id),
            Err(ApiError::InvoiceAlreadyPaid)
        ));
    }

    #[test]
    fn test_ids_are_deterministic() {
        let gateway = PaymentGateway::new();
        let c1 = gateway.create_customer("a@example.com");
        let c2 = gateway.create_customer("b@example.com");
        assert_eq!(c1.id, "cus_1");
        assert_eq!(c2.id, "cus_2");
    }

    #[test]
    fn test_detach_clears_customer_default() {
        let gateway = PaymentGateway::new();
        let customer = gateway.create_customer("cards@example.com");
        let method = gateway.create_payment_method("4242", 12, 2030);

        gateway.attach_payment_method(&method.id, &customer.id).unwrap();
        gateway.detach_payment_method(&method.id).unwrap();

        // Re-detaching an unattached method is harmless
        assert!(gateway.detach_payment_method(&method.id).is_ok());
    }
}
