// =============================================================================
// Domain Entities - Delivery Service
// =============================================================================
// Email queue, suppression list, webhook endpoints and deliveries
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// Email Queue
// =============================================================================

/// Email delivery status.
///
/// ```text
/// pending ──claim──▶ sending ──▶ sent
///    ▲                  │
///    │                  ├──soft failure──▶ retry (≤3) ──▶ exhausted
///    └──── re-queue ────┘                  │
///                       └──hard bounce──▶ bounced (+ suppression)
/// ```
///
/// At most one worker holds a row in `sending`; the claim is a
/// `FOR UPDATE SKIP LOCKED` status flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Pending,
    Sending,
    Sent,
    Failed,
    Retry,
    Exhausted,
    Bounced,
}

impl std::fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailStatus::Pending => write!(f, "pending"),
            EmailStatus::Sending => write!(f, "sending"),
            EmailStatus::Sent => write!(f, "sent"),
            EmailStatus::Failed => write!(f, "failed"),
            EmailStatus::Retry => write!(f, "retry"),
            EmailStatus::Exhausted => write!(f, "exhausted"),
            EmailStatus::Bounced => write!(f, "bounced"),
        }
    }
}

/// Bounce classification reported by the mail transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BounceType {
    /// Transient (mailbox full, greylisting): retry
    Soft,
    /// Permanent (no such address): suppress the recipient
    Hard,
}

/// Email retry delays, indexed by the retry count being scheduled.
/// Retry counts beyond the table reuse the final 30-second delay.
pub const EMAIL_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(30),
];

/// Retries before a message is exhausted.
pub const EMAIL_MAX_RETRIES: i32 = 3;

/// Delay before retry number `retry_count` (1-based); capped at the
/// final table entry for any higher count.
pub fn email_retry_delay(retry_count: i32) -> Duration {
    let index = (retry_count.max(1) as usize - 1).min(EMAIL_RETRY_DELAYS.len() - 1);
    EMAIL_RETRY_DELAYS[index]
}

/// A queued outbound email.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailMessage {
    pub email_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub recipient: String,
    /// Template identifier resolved by the (out-of-scope) renderer
    pub template_id: String,
    pub variables: serde_json::Value,
    /// 0 (low) ..= 10 (high)
    pub priority: i32,
    pub status: EmailStatus,
    pub retry_count: i32,
    pub scheduled_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub bounce_type: Option<BounceType>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data for enqueuing a new message.
#[derive(Debug, Clone)]
pub struct NewEmail {
    pub tenant_id: Option<Uuid>,
    pub recipient: String,
    pub template_id: String,
    pub variables: serde_json::Value,
    pub priority: i32,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// A suppressed recipient (hard bounce).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Suppression {
    pub recipient: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Webhooks
// =============================================================================

/// Webhook delivery retry delays. The sixth attempt and beyond reuse the
/// final 30-minute delay.
pub const WEBHOOK_RETRY_DELAYS: [Duration; 5] = [
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(30),
    Duration::from_secs(5 * 60),
    Duration::from_secs(30 * 60),
];

/// Consecutive failures after which an endpoint is auto-disabled.
pub const WEBHOOK_DISABLE_THRESHOLD: i32 = 10;

/// Delay before attempt number `attempt` (1-based = first retry);
/// capped at 30 minutes for any higher attempt.
pub fn webhook_retry_delay(attempt: i32) -> Duration {
    let index = (attempt.max(1) as usize - 1).min(WEBHOOK_RETRY_DELAYS.len() - 1);
    WEBHOOK_RETRY_DELAYS[index]
}

/// A tenant's webhook endpoint.
///
/// The URL passes SSRF validation at creation *and* before each
/// delivery. After [`WEBHOOK_DISABLE_THRESHOLD`] consecutive failures
/// the endpoint is auto-disabled and the tenant admin notified.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub webhook_endpoint_id: Uuid,
    pub tenant_id: Uuid,
    pub url: String,
    /// Event types this endpoint subscribes to
    pub events: Vec<String>,
    /// Per-endpoint HMAC signing secret (shown once at creation)
    #[serde(skip_serializing)]
    pub secret: String,
    pub consecutive_failures: i32,
    pub disabled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEndpoint {
    pub fn is_active(&self) -> bool {
        self.disabled_at.is_none()
    }

    /// Whether the endpoint subscribes to an event type.
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.events.iter().any(|e| e == event_type || e == "*")
    }
}

/// Endpoint projection for API responses: the secret never reappears.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEndpointSummary {
    pub webhook_endpoint_id: Uuid,
    pub url: String,
    pub events: Vec<String>,
    pub consecutive_failures: i32,
    pub disabled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<WebhookEndpoint> for WebhookEndpointSummary {
    fn from(endpoint: WebhookEndpoint) -> Self {
        Self {
            webhook_endpoint_id: endpoint.webhook_endpoint_id,
            url: endpoint.url,
            events: endpoint.events,
            consecutive_failures: endpoint.consecutive_failures,
            disabled_at: endpoint.disabled_at,
            created_at: endpoint.created_at,
        }
    }
}

/// Webhook delivery status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WebhookDeliveryStatus {
    Pending,
    /// Claimed by a worker for this attempt
    Sending,
    Retry,
    Delivered,
    /// Gave up (endpoint disabled or URL now fails validation)
    Abandoned,
}

/// One logical webhook delivery with its attempt state.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub webhook_delivery_id: Uuid,
    pub tenant_id: Uuid,
    pub webhook_endpoint_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: WebhookDeliveryStatus,
    pub attempt_count: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_status_code: Option<i32>,
    pub last_error: Option<String>,
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
    fn test_email_retry_delays_capped_at_thirty_seconds() {
        assert_eq!(email_retry_delay(1), Duration::from_secs(1));
        assert_eq!(email_retry_delay(2), Duration::from_secs(5));
        assert_eq!(email_retry_delay(3), Duration::from_secs(30));
        // Any higher retry count reuses the cap
        assert_eq!(email_retry_delay(4), Duration::from_secs(30));
        assert_eq!(email_retry_delay(99), Duration::from_secs(30));
    }

    #[test]
    fn test_webhook_retry_schedule() {
        assert_eq!(webhook_retry_delay(1), Duration::from_secs(1));
        assert_eq!(webhook_retry_delay(2), Duration::from_secs(5));
        assert_eq!(webhook_retry_delay(3), Duration::from_secs(30));
        assert_eq!(webhook_retry_delay(4), Duration::from_secs(300));
        assert_eq!(webhook_retry_delay(5), Duration::from_secs(1800));
        // Sixth retry and beyond reuse 30 minutes
        assert_eq!(webhook_retry_delay(6), Duration::from_secs(1800));
        assert_eq!(webhook_retry_delay(20), Duration::from_secs(1800));
    }

    #[test]
    fn test_endpoint_subscription_matching() {
        let endpoint = WebhookEndpoint {
            webhook_endpoint_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            url: "https://api.example.com/hooks".into(),
            events: vec!["subscription.created".into()],
            secret: "whsec".into(),
            consecutive_failures: 0,
            disabled_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(endpoint.subscribes_to("subscription.created"));
        assert!(!endpoint.subscribes_to("invoice.paid"));

        let wildcard = WebhookEndpoint { events: vec!["*".into()], ..endpoint };
        assert!(wildcard.subscribes_to("invoice.paid"));
    }

    #[test]
    fn test_endpoint_summary_omits_secret() {
        let endpoint = WebhookEndpoint {
            webhook_endpoint_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            url: "https://api.example.com/hooks".into(),
            events: vec![],
            secret: "whsec_sensitive".into(),
            consecutive_failures: 0,
            disabled_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(WebhookEndpointSummary::from(endpoint)).unwrap();
        assert!(json.get("secret").is_none());
    }
}
