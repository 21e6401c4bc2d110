//! # Data Transfer Objects
//!
//! Request/response contracts for the delivery API.

use serde::{Deserialize, Serialize};
use validator::Validate;

// =============================================================================
// EMAILS
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueEmailRequest {
    #[validate(email(message = "Invalid recipient address"))]
    pub recipient: String,

    #[validate(length(min = 1, max = 200, message = "Template id is required"))]
    pub template_id: String,

    #[serde(default)]
    pub variables: serde_json::Value,

    /// 0 (low) ..= 10 (high)
    #[validate(range(min = 0, max = 10, message = "Priority must be 0-10"))]
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    5
}

// =============================================================================
// WEBHOOKS
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebhookRequest {
    /// Target URL; must pass SSRF validation
    #[validate(length(min = 1, max = 2000, message = "URL is required"))]
    pub url: String,

    /// Event types to subscribe to (`*` for all)
    #[validate(length(min = 1, message = "At least one event type is required"))]
    pub events: Vec<String>,
}

// =============================================================================
// GENERIC RESPONSES
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: String,
}
