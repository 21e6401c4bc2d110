//! # Data Transfer Objects
//!
//! Request/response contracts for the billing API. JSON uses
//! `camelCase`; incoming DTOs derive `Validate`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// =============================================================================
// SUBSCRIPTIONS
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    /// Plan slug from the catalog (e.g. "pro")
    #[validate(length(min = 1, max = 100, message = "Plan is required"))]
    pub plan: String,

    /// Stored payment method to charge
    pub payment_method_id: Option<Uuid>,

    /// Overrides the plan's trial length (0 disables the trial)
    #[validate(range(min = 0, max = 365, message = "Trial days out of range"))]
    pub trial_days: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSubscriptionRequest {
    /// Target plan slug
    #[validate(length(min = 1, max = 100, message = "Plan is required"))]
    pub plan: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionRequest {
    /// `true` cancels now (terminal); `false` flags cancel-at-period-end
    #[serde(default)]
    pub immediate: bool,
}

// =============================================================================
// PAYMENT METHODS
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddPaymentMethodRequest {
    /// Last four digits only - the PAN never reaches this service
    #[validate(length(min = 4, max = 4, message = "Last four digits required"))]
    pub card_last_four: String,

    #[validate(range(min = 1, max = 12, message = "Invalid month"))]
    pub exp_month: i32,

    #[validate(range(min = 2020, max = 2100, message = "Invalid year"))]
    pub exp_year: i32,

    pub card_brand: Option<String>,
}

// =============================================================================
// USAGE
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
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
