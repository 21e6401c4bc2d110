//! # Email Queue Service
//!
//! Durable outbound-email processing: enqueue with suppression check,
//! single-claimer worker loop, bounded retries (1 s / 5 s / 30 s,
//! capped), and hard-bounce suppression.
//!
//! ## Row Lifecycle
//!
//! | From | Event | To |
//! |------|-------|----|
//! | pending / retry | worker claim | sending |
//! | sending | transport accepts | sent |
//! | sending | soft bounce, retries left | retry (rescheduled) |
//! | sending | soft bounce, retries consumed | exhausted |
//! | sending | hard bounce | bounced (+ suppression entry) |

use chrono::{Duration as ChronoDuration, Utc};
use shared::errors::ApiError;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    email_retry_delay, BounceType, EmailMessage, EmailStatus, NewEmail, EMAIL_MAX_RETRIES,
};
use crate::repository::DeliveryRepository;
use crate::service::mail_transport::{DeliveryOutcome, MailTransport};

#[derive(Clone)]
pub struct EmailService {
    repository: DeliveryRepository,
    transport: Arc<dyn MailTransport>,
}

impl EmailService {
    pub fn new(repository: DeliveryRepository, transport: Arc<dyn MailTransport>) -> Self {
        Self { repository, transport }
    }

    // =========================================================================
    // ENQUEUE
    // =========================================================================

    /// Enqueues a message unless the recipient is suppressed. Returns
    /// `None` for suppressed recipients - the send is skipped, not
    /// failed, because suppression is the expected steady state after a
    /// hard bounce.
    pub async fn enqueue(&self, email: NewEmail) -> Result<Option<EmailMessage>, ApiError> {
        if self.repository.is_suppressed(&email.recipient).await? {
            info!("Send skipped for suppressed recipient");
            return Ok(None);
        }

        let message = self.repository.enqueue_email(email).await?;
        Ok(Some(message))
    }

    pub async fn get_message(&self, email_id: Uuid) -> Result<EmailMessage, ApiError> {
        self.repository
            .find_email(email_id)
            .await?
            .ok_or_else(|| ApiError::NotFound { resource: format!("email:{}", email_id) })
    }

    // =========================================================================
    // WORKER
    // =========================================================================

    /// One worker iteration: claim a batch and process every claimed
    /// row. Returns how many rows were handled.
    pub async fn process_batch(&self, batch: i64) -> Result<usize, ApiError> {
        let claimed = self.repository.claim_due_emails(batch).await?;
        let count = claimed.len();

        for message in claimed {
            if let Err(e) = self.process_one(&message).await {
                warn!(email_id = %message.email_id, error = %e, "Email processing failed");
            }
        }

        Ok(count)
    }

    /// Processes one claimed row through the transport.
    async fn process_one(&self, message: &EmailMessage) -> Result<(), ApiError> {
        // Suppression may have landed after this row was enqueued
        // (other services insert into the queue directly)
        if self.repository.is_suppressed(&message.recipient).await? {
            self.repository
                .update_email_outcome(
                    message.email_id,
                    EmailStatus::Bounced,
                    message.retry_count,
                    None,
                    Some("recipient suppressed"),
                    Some(BounceType::Hard),
                )
                .await?;
            return Ok(());
        }

        let outcome = match self.transport.deliver(message).await {
            Ok(outcome) => outcome,
            // Transport infrastructure failure counts as a soft bounce:
            // the message is retryable
            Err(e) => {
                warn!(email_id = %message.email_id, error = %e, "Transport error");
                DeliveryOutcome::SoftBounce
            }
        };

        match outcome {
            DeliveryOutcome::Sent => {
                self.repository.mark_email_sent(message.email_id).await?;
                info!(email_id = %message.email_id, "Email sent");
            }
            DeliveryOutcome::SoftBounce => self.handle_soft_bounce(message).await?,
            DeliveryOutcome::HardBounce => self.handle_hard_bounce(message).await?,
        }

        Ok(())
    }

    /// Soft bounce: schedule a retry or exhaust.
    async fn handle_soft_bounce(&self, message: &EmailMessage) -> Result<(), ApiError> {
        let retry_count = message.retry_count + 1;

        if retry_count > EMAIL_MAX_RETRIES {
            self.repository
                .update_email_outcome(
                    message.email_id,
                    EmailStatus::Exhausted,
                    message.retry_count,
                    None,
                    Some("retries exhausted"),
                    Some(BounceType::Soft),
                )
                .await?;
            warn!(email_id = %message.email_id, "Email retries exhausted");
            return Ok(());
        }

        let delay = email_retry_delay(retry_count);
        let scheduled_at = Utc::now() + ChronoDuration::seconds(delay.as_secs() as i64);

        self.repository
            .update_email_outcome(
                message.email_id,
                EmailStatus::Retry,
                retry_count,
                Some(scheduled_at),
                Some("soft bounce"),
                Some(BounceType::Soft),
            )
            .await?;

        info!(
            email_id = %message.email_id,
            retry_count,
            delay_seconds = delay.as_secs(),
            "Email retry scheduled"
        );

        Ok(())
    }

    /// Hard bounce: terminal for the message, and the recipient joins
    /// the suppression list so future sends are skipped.
    async fn handle_hard_bounce(&self, message: &EmailMessage) -> Result<(), ApiError> {
        self.repository
            .update_email_outcome(
                message.email_id,
                EmailStatus::Bounced,
                message.retry_count,
                None,
                Some("hard bounce"),
                Some(BounceType::Hard),
            )
            .await?;
        self.repository
            .suppress_recipient(&message.recipient, "hard bounce")
            .await?;

        warn!(email_id = %message.email_id, "Hard bounce; recipient suppressed");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // The retry schedule and status taxonomy are covered in
    // domain::entities; queue round trips with a mock transport live in
    // tests/delivery_flow_tests.rs (#[ignore]d - they need Postgres).
}
