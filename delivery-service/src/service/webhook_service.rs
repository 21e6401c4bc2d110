//! # Webhook Service
//!
//! Endpoint management, payload signing, and the delivery worker.
//!
//! ## Signing
//!
//! Every payload is signed with HMAC-SHA256 using the per-endpoint
//! secret provisioned at creation (shown once). The signature is the
//! lowercase hex digest of `HMAC(secret, raw_payload_bytes)`,
//! transmitted in the `X-Aegis-Signature` header; receivers verify with
//! a constant-time comparison.
//!
//! ## Retry & Auto-Disable
//!
//! Failed deliveries retry at 1 s / 5 s / 30 s / 5 min / 30 min, then
//! every 30 minutes. Ten consecutive failures auto-disable the endpoint
//! and notify the tenant admin by email.
//!
//! ## SSRF Defense
//!
//! Target URLs pass [`url_policy::validate_webhook_url`] at creation
//! *and* before every dispatch; redirects are never followed.

use chrono::{Duration as ChronoDuration, Utc};
use shared::crypto::{random, signing};
use shared::errors::ApiError;
use shared::identity::Caller;
use shared::metrics::SecurityMetrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    webhook_retry_delay, NewEmail, WebhookDelivery, WebhookDeliveryStatus, WebhookEndpoint,
    WebhookEndpointSummary, WEBHOOK_DISABLE_THRESHOLD,
};
use crate::repository::DeliveryRepository;
use crate::service::url_policy;

/// Outbound request deadline.
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Signature header on outbound deliveries.
pub const SIGNATURE_HEADER: &str = "X-Aegis-Signature";

/// Creation response: the only moment the signing secret is visible.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedWebhook {
    #[serde(flatten)]
    pub endpoint: WebhookEndpointSummary,
    /// Per-endpoint signing secret - shown once
    pub secret: String,
}

#[derive(Clone)]
pub struct WebhookService {
    repository: DeliveryRepository,
    client: reqwest::Client,
    metrics: Arc<SecurityMetrics>,
}

impl WebhookService {
    pub fn new(repository: DeliveryRepository, metrics: Arc<SecurityMetrics>) -> Self {
        // No redirects: every hop would need re-validation, so there are
        // none to follow
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(DISPATCH_TIMEOUT)
            .build()
            .expect("reqwest client");

        Self { repository, client, metrics }
    }

    // =========================================================================
    // SIGNING
    // =========================================================================

    /// Signs raw payload bytes with the endpoint secret (64 lowercase
    /// hex chars).
    pub fn sign_payload(payload: &[u8], secret: &str) -> String {
        signing::hmac_sha256_hex(payload, secret.as_bytes())
    }

    /// Constant-time signature verification for receivers.
    pub fn verify_signature(payload: &[u8], secret: &str, signature_hex: &str) -> bool {
        signing::verify_hmac_sha256(payload, secret.as_bytes(), signature_hex)
    }

    // =========================================================================
    // ENDPOINT MANAGEMENT
    // =========================================================================

    /// Creates an endpoint after URL validation. The signing secret is
    /// returned here and never again.
    pub async fn create_endpoint(
        &self,
        caller: &Caller,
        url: &str,
        events: Vec<String>,
    ) -> Result<CreatedWebhook, ApiError> {
        url_policy::validate_webhook_url(url)?;

        let secret = format!("whsec_{}", random::random_alphanumeric(32)?);
        let endpoint = self
            .repository
            .create_endpoint(caller.tenant_id, url, &events, &secret)
            .await?;

        info!(
            webhook_endpoint_id = %endpoint.webhook_endpoint_id,
            tenant_id = %caller.tenant_id,
            "Webhook endpoint created"
        );

        Ok(CreatedWebhook { endpoint: endpoint.into(), secret })
    }

    pub async fn list_endpoints(
        &self,
        caller: &Caller,
    ) -> Result<Vec<WebhookEndpointSummary>, ApiError> {
        let endpoints = self
            .repository
            .list_endpoints_for_tenant(caller.tenant_id)
            .await?;
        Ok(endpoints.into_iter().map(Into::into).collect())
    }

    /// Deletes an endpoint after the tenant guard.
    pub async fn delete_endpoint(
        &self,
        caller: &Caller,
        webhook_endpoint_id: Uuid,
    ) -> Result<(), ApiError> {
        let endpoint = self.load_guarded(caller, webhook_endpoint_id).await?;
        self.repository
            .delete_endpoint(endpoint.webhook_endpoint_id)
            .await?;
        info!(webhook_endpoint_id = %webhook_endpoint_id, "Webhook endpoint deleted");
        Ok(())
    }

    /// Queues a synthetic event through the normal validation + signing
    /// path.
    pub async fn test_endpoint(
        &self,
        caller: &Caller,
        webhook_endpoint_id: Uuid,
    ) -> Result<WebhookDelivery, ApiError> {
        let endpoint = self.load_guarded(caller, webhook_endpoint_id).await?;

        if !endpoint.is_active() {
            return Err(ApiError::BadRequest {
                message: "Endpoint is disabled".to_string(),
            });
        }

        let payload = serde_json::json!({
            "event": "webhook.test",
            "endpoint_id": endpoint.webhook_endpoint_id,
        });

        self.repository
            .create_delivery(caller.tenant_id, endpoint.webhook_endpoint_id, "webhook.test", &payload)
            .await
    }

    async fn load_guarded(
        &self,
        caller: &Caller,
        webhook_endpoint_id: Uuid,
    ) -> Result<WebhookEndpoint, ApiError> {
        let endpoint = self
            .repository
            .find_endpoint(webhook_endpoint_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("webhook:{}", webhook_endpoint_id),
            })?;
        caller.ensure_tenant(endpoint.tenant_id)?;
        Ok(endpoint)
    }

    // =========================================================================
    // EVENT FAN-OUT
    // =========================================================================

    /// Queues one delivery per active subscribed endpoint in the tenant.
    pub async fn publish_event(
        &self,
        tenant_id: Uuid,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<usize, ApiError> {
        let endpoints = self
            .repository
            .find_subscribed_endpoints(tenant_id, event_type)
            .await?;
        let count = endpoints.len();

        for endpoint in endpoints {
            self.repository
                .create_delivery(tenant_id, endpoint.webhook_endpoint_id, event_type, payload)
                .await?;
        }

        Ok(count)
    }

    // =========================================================================
    // DELIVERY WORKER
    // =========================================================================

    /// One worker iteration over due deliveries.
    pub async fn process_batch(&self, batch: i64) -> Result<usize, ApiError> {
        let due = self.repository.claim_due_deliveries(batch).await?;
        let count = due.len();

        for delivery in due {
            if let Err(e) = self.process_one(&delivery).await {
                warn!(
                    webhook_delivery_id = %delivery.webhook_delivery_id,
                    error = %e,
                    "Webhook delivery processing failed"
                );
            }
        }

        Ok(count)
    }

    async fn process_one(&self, delivery: &WebhookDelivery) -> Result<(), ApiError> {
        let endpoint = match self
            .repository
            .find_endpoint(delivery.webhook_endpoint_id)
            .await?
        {
            Some(endpoint) if endpoint.is_active() => endpoint,
            // Endpoint deleted or disabled since the event was queued
            _ => {
                return self
                    .repository
                    .update_delivery(
                        delivery.webhook_delivery_id,
                        WebhookDeliveryStatus::Abandoned,
                        delivery.attempt_count,
                        None,
                        None,
                        Some("endpoint inactive"),
                    )
                    .await;
            }
        };

        // Re-validated on every hop, not just at creation
        if let Err(rejection) = url_policy::validate_webhook_url(&endpoint.url) {
            warn!(
                webhook_endpoint_id = %endpoint.webhook_endpoint_id,
                "Stored webhook URL no longer passes validation"
            );
            self.repository
                .update_delivery(
                    delivery.webhook_delivery_id,
                    WebhookDeliveryStatus::Abandoned,
                    delivery.attempt_count,
                    None,
                    None,
                    Some(&rejection.to_string()),
                )
                .await?;
            return Ok(());
        }

        let payload_bytes = serde_json::to_vec(&delivery.payload)
            .map_err(|e| ApiError::InternalError { message: e.to_string() })?;
        let signature = Self::sign_payload(&payload_bytes, &endpoint.secret);

        let response = self
            .client
            .post(&endpoint.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(payload_bytes)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                self.on_success(delivery, resp.status().as_u16() as i32).await
            }
            Ok(resp) => {
                let status = resp.status().as_u16() as i32;
                self.on_failure(delivery, &endpoint, Some(status), "non-2xx response")
                    .await
            }
            Err(e) => {
                self.on_failure(delivery, &endpoint, None, &e.to_string())
                    .await
            }
        }
    }

    async fn on_success(
        &self,
        delivery: &WebhookDelivery,
        status_code: i32,
    ) -> Result<(), ApiError> {
        self.repository
            .update_delivery(
                delivery.webhook_delivery_id,
                WebhookDeliveryStatus::Delivered,
                delivery.attempt_count + 1,
                None,
                Some(status_code),
                None,
            )
            .await?;
        self.repository
            .reset_endpoint_failures(delivery.webhook_endpoint_id)
            .await?;

        info!(
            webhook_delivery_id = %delivery.webhook_delivery_id,
            "Webhook delivered"
        );

        Ok(())
    }

    async fn on_failure(
        &self,
        delivery: &WebhookDelivery,
        endpoint: &WebhookEndpoint,
        status_code: Option<i32>,
        error: &str,
    ) -> Result<(), ApiError> {
        let attempt_count = delivery.attempt_count + 1;
        let delay = webhook_retry_delay(attempt_count);
        let next_attempt_at = Utc::now() + ChronoDuration::seconds(delay.as_secs() as i64);

        self.repository
            .update_delivery(
                delivery.webhook_delivery_id,
                WebhookDeliveryStatus::Retry,
                attempt_count,
                Some(next_attempt_at),
                status_code,
                Some(error),
            )
            .await?;

        let failures = self
            .repository
            .record_endpoint_failure(endpoint.webhook_endpoint_id)
            .await?;

        if failures >= WEBHOOK_DISABLE_THRESHOLD {
            self.auto_disable(endpoint).await?;
        }

        Ok(())
    }

    /// Disables the endpoint after the failure threshold and notifies
    /// the tenant admin through the email queue.
    async fn auto_disable(&self, endpoint: &WebhookEndpoint) -> Result<(), ApiError> {
        self.repository
            .disable_endpoint(endpoint.webhook_endpoint_id)
            .await?;
        SecurityMetrics::incr(&self.metrics.webhook_auto_disabled_total);

        warn!(
            webhook_endpoint_id = %endpoint.webhook_endpoint_id,
            tenant_id = %endpoint.tenant_id,
            "Webhook endpoint auto-disabled after consecutive failures"
        );

        // Admin notification rides the normal email queue
        match self
            .repository
            .find_tenant_admin_email(endpoint.tenant_id)
            .await?
        {
            Some(admin_email) => {
                self.repository
                    .enqueue_email(NewEmail {
                        tenant_id: Some(endpoint.tenant_id),
                        recipient: admin_email,
                        template_id: "webhook_disabled".to_string(),
                        variables: serde_json::json!({
                            "endpoint_url": endpoint.url,
                            "failures": WEBHOOK_DISABLE_THRESHOLD,
                        }),
                        priority: 7,
                        scheduled_at: None,
                    })
                    .await?;
            }
            None => warn!(
                tenant_id = %endpoint.tenant_id,
                "No admin account found for auto-disable notification"
            ),
        }

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let payload = br#"{"event":"subscription.created"}"#;
        let secret = "whsec_testsecret";

        let signature = WebhookService::sign_payload(payload, secret);

        assert_eq!(signature.len(), 64);
        assert!(signature
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(WebhookService::verify_signature(payload, secret, &signature));
    }

    #[test]
    fn test_signature_rejects_any_changed_byte() {
        let payload = br#"{"event":"subscription.created"}"#;
        let secret = "whsec_testsecret";
        let signature = WebhookService::sign_payload(payload, secret);

        let tampered = br#"{"event":"subscription.creates"}"#;
        assert!(!WebhookService::verify_signature(tampered, secret, &signature));
        assert!(!WebhookService::verify_signature(payload, "whsec_other", &signature));
    }
}
