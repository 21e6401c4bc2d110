// =============================================================================
// Domain Entities - Billing Service
// =============================================================================
// Subscription lifecycle, invoices, payment methods, usage, audit events
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// Subscription Status
// =============================================================================

/// Subscription status lifecycle.
///
/// ```text
///           trial end / payment ok
/// trialing ───────────────────────▶ active ◀──────────┐
///     │                              │  ▲             │ payment ok
///     │ user cancel                  │  └── resume    │
///     ▼                   1st failure│       ▲        │
/// canceled ◀── immediate cancel ──── ▼       │        │
///     ▲                           past_due ──┴─▶ paused
///     │                              │
///     │ period-end sweep             │ retry_count == 3
///  (cancel_at_period_end)            ▼
///                                 unpaid
/// ```
///
/// `canceled` is terminal: no mutation moves a subscription out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// In trial period
    Trialing,
    /// Active and paid
    Active,
    /// Payment failed, retry schedule running
    PastDue,
    /// Retries exhausted
    Unpaid,
    /// Terminal
    Canceled,
    /// Temporarily paused by the customer
    Paused,
}

impl SubscriptionStatus {
    /// Whether `self -> target` is a legal lifecycle transition.
    ///
    /// The allowed set is exactly:
    /// trialing→{active, canceled}; active→{past_due, canceled, paused};
    /// past_due→{active, unpaid, paused}; paused→{active}. Everything
    /// else - in particular anything out of `canceled` or `unpaid` - is
    /// rejected.
    pub fn can_transition_to(&self, target: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            (Trialing, Active)
                | (Trialing, Canceled)
                | (Active, PastDue)
                | (Active, Canceled)
                | (Active, Paused)
                | (PastDue, Active)
                | (PastDue, Unpaid)
                | (PastDue, Paused)
                | (Paused, Active)
        )
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Canceled)
    }

    /// Lenient decoder for external gateway payloads: unknown strings map
    /// to `Canceled`, the safe terminal default (an unknown state must
    /// never grant access).
    pub fn from_str_or_default(s: &str) -> Self {
        s.parse().unwrap_or(SubscriptionStatus::Canceled)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionStatus::Trialing => write!(f, "trialing"),
            SubscriptionStatus::Active => write!(f, "active"),
            SubscriptionStatus::PastDue => write!(f, "past_due"),
            SubscriptionStatus::Unpaid => write!(f, "unpaid"),
            SubscriptionStatus::Canceled => write!(f, "canceled"),
            SubscriptionStatus::Paused => write!(f, "paused"),
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "unpaid" => Ok(SubscriptionStatus::Unpaid),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "paused" => Ok(SubscriptionStatus::Paused),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Payment Retry Schedule
// =============================================================================

/// Days after the *original* failure at which retries run.
pub const RETRY_SCHEDULE_DAYS: [i64; 3] = [1, 3, 7];

/// Maximum retry count before the subscription goes unpaid.
pub const MAX_PAYMENT_RETRIES: i32 = 3;

/// Days until the next retry for a just-incremented `retry_count`, or
/// `None` once retries are exhausted (`retry_count == 3` -> unpaid).
pub fn retry_delay_days(retry_count: i32) -> Option<i64> {
    if !(1..MAX_PAYMENT_RETRIES).contains(&retry_count) {
        return None;
    }
    Some(RETRY_SCHEDULE_DAYS[(retry_count - 1) as usize])
}

// =============================================================================
// Plan
// =============================================================================

/// Billing interval for plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Monthly,
    Annual,
}

impl BillingInterval {
    pub fn days(&self) -> i64 {
        match self {
            BillingInterval::Monthly => 30,
            BillingInterval::Annual => 365,
        }
    }
}

impl std::fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingInterval::Monthly => write!(f, "monthly"),
            BillingInterval::Annual => write!(f, "annual"),
        }
    }
}

/// Subscription plan (platform catalog; not tenant-scoped).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: Uuid,
    pub slug: String,
    pub name: String,
    pub amount_cents: i64,
    pub currency: String,
    pub interval: BillingInterval,
    pub trial_days: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Subscription
// =============================================================================

/// A tenant's subscription.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    /// Gateway-side customer id
    pub customer_id: String,
    /// Gateway-side subscription id
    pub gateway_subscription_id: Option<String>,
    pub plan_id: Uuid,
    /// Optional; FK declared ON DELETE SET NULL
    pub payment_method_id: Option<Uuid>,
    pub status: SubscriptionStatus,
    pub amount_cents: i64,
    pub currency: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_end: Option<DateTime<Utc>>,
    /// Soft cancel: status stays `active` until the period-end sweep
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    /// Bounded by [`MAX_PAYMENT_RETRIES`]
    pub retry_count: i32,
    pub first_payment_failure_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Invoice
// =============================================================================

/// Invoice status. Monotonic: draft → open → paid; void and refunded are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Open,
    Paid,
    Void,
    Refunded,
}

impl InvoiceStatus {
    pub fn can_transition_to(&self, target: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, target),
            (Draft, Open) | (Draft, Void) | (Open, Paid) | (Open, Void) | (Paid, Refunded)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Void | InvoiceStatus::Refunded)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvoiceStatus::Draft => write!(f, "draft"),
            InvoiceStatus::Open => write!(f, "open"),
            InvoiceStatus::Paid => write!(f, "paid"),
            InvoiceStatus::Void => write!(f, "void"),
            InvoiceStatus::Refunded => write!(f, "refunded"),
        }
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(InvoiceStatus::Draft),
            "open" => Ok(InvoiceStatus::Open),
            "paid" => Ok(InvoiceStatus::Paid),
            "void" => Ok(InvoiceStatus::Void),
            "refunded" => Ok(InvoiceStatus::Refunded),
            _ => Err(()),
        }
    }
}

/// Subscription invoice.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub subscription_id: Uuid,
    pub gateway_invoice_id: Option<String>,
    pub status: InvoiceStatus,
    pub amount_due_cents: i64,
    pub amount_paid_cents: i64,
    pub due_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Payment Method
// =============================================================================

/// A stored payment method (gateway token only - no PAN ever touches
/// this system).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub payment_method_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub gateway_payment_method_id: String,
    pub card_brand: Option<String>,
    pub card_last_four: Option<String>,
    pub card_exp_month: Option<i32>,
    pub card_exp_year: Option<i32>,
    pub is_default: bool,
    pub detached_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Usage & Events
// =============================================================================

/// Usage record for metered features.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UsageRecord {
    pub usage_record_id: Uuid,
    pub tenant_id: Uuid,
    pub subscription_id: Uuid,
    pub feature_key: String,
    pub quantity: i64,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregated usage per feature over a period.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub feature_key: String,
    pub total: i64,
}

/// Billing event type for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingEventType {
    SubscriptionCreated,
    SubscriptionActivated,
    SubscriptionPlanChanged,
    SubscriptionCanceled,
    SubscriptionPaused,
    SubscriptionResumed,
    PaymentSucceeded,
    PaymentFailed,
    PaymentRetriesExhausted,
    InvoiceCreated,
    InvoiceFinalized,
    InvoicePaid,
    InvoiceVoided,
    InvoiceRefunded,
    PaymentMethodAttached,
    PaymentMethodDetached,
}

/// Append-only billing audit event.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BillingEvent {
    pub billing_event_id: Uuid,
    pub tenant_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub invoice_id: Option<Uuid>,
    pub event_type: BillingEventType,
    pub amount_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        use SubscriptionStatus::*;
        assert!(Trialing.can_transition_to(Active));
        assert!(Trialing.can_transition_to(Canceled));
        assert!(Active.can_transition_to(PastDue));
        assert!(Active.can_transition_to(Canceled));
        assert!(Active.can_transition_to(Paused));
        assert!(PastDue.can_transition_to(Active));
        assert!(PastDue.can_transition_to(Unpaid));
        assert!(PastDue.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
    }

    #[test]
    fn test_canceled_is_terminal() {
        use SubscriptionStatus::*;
        assert!(Canceled.is_terminal());
        for target in [Trialing, Active, PastDue, Unpaid, Paused] {
            assert!(!Canceled.can_transition_to(target), "canceled -> {}", target);
        }
    }

    #[test]
    fn test_rejected_transitions() {
        use SubscriptionStatus::*;
        assert!(!Trialing.can_transition_to(PastDue));
        assert!(!Trialing.can_transition_to(Paused));
        assert!(!Unpaid.can_transition_to(Active));
        assert!(!Paused.can_transition_to(PastDue));
        assert!(!Active.can_transition_to(Trialing));
        assert!(!Active.can_transition_to(Unpaid));
    }

    #[test]
    fn test_status_string_round_trip() {
        use SubscriptionStatus::*;
        for status in [Trialing, Active, PastDue, Unpaid, Canceled, Paused] {
            let parsed: SubscriptionStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_unknown_status_string_defaults_to_canceled() {
        assert!("incomplete".parse::<SubscriptionStatus>().is_err());
        assert_eq!(
            SubscriptionStatus::from_str_or_default("incomplete"),
            SubscriptionStatus::Canceled
        );
    }

    #[test]
    fn test_retry_schedule() {
        assert_eq!(retry_delay_days(1), Some(1));
        assert_eq!(retry_delay_days(2), Some(3));
        // The third failure exhausts retries: no further schedule
        assert_eq!(retry_delay_days(3), None);
        assert_eq!(retry_delay_days(0), None);
        assert_eq!(retry_delay_days(4), None);
    }

    #[test]
    fn test_invoice_monotonic_lifecycle() {
        use InvoiceStatus::*;
        assert!(Draft.can_transition_to(Open));
        assert!(Open.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Refunded));
        assert!(Draft.can_transition_to(Void));
        assert!(Open.can_transition_to(Void));

        assert!(!Paid.can_transition_to(Open));
        assert!(!Open.can_transition_to(Draft));
        assert!(!Void.can_transition_to(Open));
        assert!(!Refunded.can_transition_to(Paid));
        assert!(Void.is_terminal());
        assert!(Refunded.is_terminal());
    }
}
