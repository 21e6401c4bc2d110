//! # Mail Transport Boundary
//!
//! The actual SMTP/provider integration is a collaborator outside this
//! core; the queue worker only needs its outcome classification.

use async_trait::async_trait;
use shared::errors::ApiError;
use tracing::info;

use crate::domain::EmailMessage;

/// Outcome of one delivery attempt, as classified by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted by the receiving server
    Sent,
    /// Transient rejection (mailbox full, greylisting): retry
    SoftBounce,
    /// Permanent rejection (no such address): suppress the recipient
    HardBounce,
}

/// The mail transport contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: &EmailMessage) -> Result<DeliveryOutcome, ApiError>;
}

/// Development transport: logs the message and reports success. Stands
/// in until a real transport collaborator is wired up.
#[derive(Debug, Default)]
pub struct LogOnlyTransport;

#[async_trait]
impl MailTransport for LogOnlyTransport {
    async fn deliver(&self, message: &EmailMessage) -> Result<DeliveryOutcome, ApiError> {
        info!(
            email_id = %message.email_id,
            template_id = %message.template_id,
            "Log-only transport: message considered sent"
        );
        Ok(DeliveryOutcome::Sent)
    }
}
