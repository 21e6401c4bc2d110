//! # Security Events
//!
//! Audit events emitted on security-relevant state changes. Each event is
//! logged as a structured WARN/INFO line on the same code path that
//! increments its counterpart counter in
//! [`shared::metrics::SecurityMetrics`], so the log and the metric can
//! never disagree.
//!
//! | Event | Trigger | Counter |
//! |-------|---------|---------|
//! | `RefreshReuseDetected` | stale refresh token presented | `refresh_reuse_detected_total` |
//! | `AuthRateLimit` | failed-login threshold hit | `auth_rate_limit_total` |
//! | `SessionRevoked` | logout / reset voided a session | `token_revoked_total` |
//! | `TotpEnabled` / `TotpDisabled` | second factor toggled | - |
//! | `PasswordResetCompleted` | reset flow finished | - |
//! | `ApiKeyRevoked` | API key soft-revoked | - |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A security/audit event. Serializable for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SecurityEvent {
    /// A refresh token not matching the current index entry was presented.
    /// The whole session chain has been voided.
    RefreshReuseDetected {
        user_id: Uuid,
        tenant_id: Uuid,
        occurred_at: DateTime<Utc>,
    },

    /// Failed-login threshold reached; the account is locked.
    AuthRateLimit {
        user_id: Uuid,
        tenant_id: Uuid,
        locked_until: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    },

    /// A session was explicitly revoked (logout, logout-all, reset).
    SessionRevoked {
        user_id: Uuid,
        tenant_id: Uuid,
        occurred_at: DateTime<Utc>,
    },

    /// TOTP second factor committed for a user.
    TotpEnabled {
        user_id: Uuid,
        occurred_at: DateTime<Utc>,
    },

    /// TOTP second factor disabled; backup codes invalidated.
    TotpDisabled {
        user_id: Uuid,
        occurred_at: DateTime<Utc>,
    },

    /// Password reset completed; all outstanding sessions invalidated.
    PasswordResetCompleted {
        user_id: Uuid,
        occurred_at: DateTime<Utc>,
    },

    /// An API key was soft-revoked.
    ApiKeyRevoked {
        api_key_id: Uuid,
        tenant_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
}

impl SecurityEvent {
    /// Stable event-type name for routing and filtering.
    pub fn event_type(&self) -> &'static str {
        match self {
            SecurityEvent::RefreshReuseDetected { .. } => "auth.refresh_reuse_detected",
            SecurityEvent::AuthRateLimit { .. } => "auth.rate_limit",
            SecurityEvent::SessionRevoked { .. } => "auth.session_revoked",
            SecurityEvent::TotpEnabled { .. } => "auth.totp_enabled",
            SecurityEvent::TotpDisabled { .. } => "auth.totp_disabled",
            SecurityEvent::PasswordResetCompleted { .. } => "auth.password_reset_completed",
            SecurityEvent::ApiKeyRevoked { .. } => "auth.api_key_revoked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = SecurityEvent::RefreshReuseDetected {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "refresh_reuse_detected");
        assert_eq!(event.event_type(), "auth.refresh_reuse_detected");
    }
}
