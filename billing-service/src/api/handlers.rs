//! # Request Handlers
//!
//! Billing HTTP handlers. Every endpoint re-validates the bearer token
//! on arrival (defense in depth); mutating endpoints run inside the
//! idempotency layer, which replays the first successful response
//! byte-for-byte for retried keys.

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use shared::errors::ApiError;
use shared::identity::{authenticate_request, Caller};
use shared::validation;
use uuid::Uuid;

use crate::api::AppState;
use crate::service::idempotency;

use super::dto::{
    AddPaymentMethodRequest, CancelSubscriptionRequest, CreateSubscriptionRequest,
    HealthResponse, ListQuery, MessageResponse, UpdateSubscriptionRequest, UsageQuery,
};

async fn authenticate(req: &HttpRequest, state: &AppState) -> Result<Caller, ApiError> {
    let (_claims, caller) = authenticate_request(
        req,
        &state.token_engine,
        &state.revocation_store,
        &state.revocation_policy,
        &state.metrics,
    )
    .await?;
    Ok(caller)
}

fn body_json<T: serde::Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string(value).map_err(|e| ApiError::InternalError { message: e.to_string() })
}

// =============================================================================
// HEALTH
// =============================================================================

/// `GET /health`
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: "billing-service".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

// =============================================================================
// SUBSCRIPTIONS
// =============================================================================

/// `POST /api/v1/subscriptions` (Idempotency-Key required)
pub async fn create_subscription(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreateSubscriptionRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let caller = authenticate(&req, &state).await?;
    let key = idempotency::extract_key(&req, true)?;

    let service = state.subscription_service.clone();
    let op_caller = caller.clone();
    state
        .idempotency
        .execute(&caller, key.as_deref(), || async move {
            let subscription = service
                .create_subscription(
                    &op_caller,
                    &body.plan,
                    body.payment_method_id,
                    body.trial_days,
                )
                .await?;
            Ok((StatusCode::CREATED, body_json(&subscription)?))
        })
        .await
}

/// `GET /api/v1/subscriptions`
pub async fn list_subscriptions(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&req, &state).await?;
    let subscriptions = state.subscription_service.list_subscriptions(&caller).await?;
    Ok(HttpResponse::Ok().json(subscriptions))
}

/// `GET /api/v1/subscriptions/{id}`
pub async fn get_subscription(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&req, &state).await?;
    let subscription = state
        .subscription_service
        .get_subscription(&caller, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(subscription))
}

/// `PATCH /api/v1/subscriptions/{id}` - plan change (Idempotency-Key
/// required).
pub async fn update_subscription(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateSubscriptionRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let caller = authenticate(&req, &state).await?;
    let key = idempotency::extract_key(&req, true)?;
    let subscription_id = path.into_inner();

    let service = state.subscription_service.clone();
    let op_caller = caller.clone();
    state
        .idempotency
        .execute(&caller, key.as_deref(), || async move {
            let subscription = service
                .change_plan(&op_caller, subscription_id, &body.plan)
                .await?;
            Ok((StatusCode::OK, body_json(&subscription)?))
        })
        .await
}

/// `POST /api/v1/subscriptions/{id}/cancel` (Idempotency-Key required)
pub async fn cancel_subscription(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<CancelSubscriptionRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();

    let caller = authenticate(&req, &state).await?;
    let key = idempotency::extract_key(&req, true)?;
    let subscription_id = path.into_inner();

    let service = state.subscription_service.clone();
    let op_caller = caller.clone();
    state
        .idempotency
        .execute(&caller, key.as_deref(), || async move {
            let subscription = service
                .cancel_subscription(&op_caller, subscription_id, body.immediate)
                .await?;
            Ok((StatusCode::OK, body_json(&subscription)?))
        })
        .await
}

/// `POST /api/v1/subscriptions/{id}/pause` (Idempotency-Key required)
pub async fn pause_subscription(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&req, &state).await?;
    let key = idempotency::extract_key(&req, true)?;
    let subscription_id = path.into_inner();

    let service = state.subscription_service.clone();
    let op_caller = caller.clone();
    state
        .idempotency
        .execute(&caller, key.as_deref(), || async move {
            let subscription = service.pause_subscription(&op_caller, subscription_id).await?;
            Ok((StatusCode::OK, body_json(&subscription)?))
        })
        .await
}

/// `POST /api/v1/subscriptions/{id}/resume` (Idempotency-Key required)
pub async fn resume_subscription(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&req, &state).await?;
    let key = idempotency::extract_key(&req, true)?;
    let subscription_id = path.into_inner();

    let service = state.subscription_service.clone();
    let op_caller = caller.clone();
    state
        .idempotency
        .execute(&caller, key.as_deref(), || async move {
            let subscription = service.resume_subscription(&op_caller, subscription_id).await?;
            Ok((StatusCode::OK, body_json(&subscription)?))
        })
        .await
}

/// `GET /api/v1/subscriptions/{id}/usage`
pub async fn get_usage(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<UsageQuery>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&req, &state).await?;
    let usage = state
        .billing_service
        .get_usage(&caller, path.into_inner(), query.from, query.to)
        .await?;
    Ok(HttpResponse::Ok().json(usage))
}

// =============================================================================
// PAYMENT METHODS
// =============================================================================

/// `POST /api/v1/payment-methods` (Idempotency-Key required)
pub async fn add_payment_method(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<AddPaymentMethodRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let caller = authenticate(&req, &state).await?;
    let key = idempotency::extract_key(&req, true)?;

    let service = state.billing_service.clone();
    let op_caller = caller.clone();
    state
        .idempotency
        .execute(&caller, key.as_deref(), || async move {
            let method = service
                .add_payment_method(
                    &op_caller,
                    &body.card_last_four,
                    body.exp_month,
                    body.exp_year,
                    body.card_brand,
                )
                .await?;
            Ok((StatusCode::CREATED, body_json(&method)?))
        })
        .await
}

/// `DELETE /api/v1/payment-methods/{id}` (Idempotency-Key required)
pub async fn detach_payment_method(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&req, &state).await?;
    let key = idempotency::extract_key(&req, true)?;
    let payment_method_id = path.into_inner();

    let service = state.billing_service.clone();
    let op_caller = caller.clone();
    state
        .idempotency
        .execute(&caller, key.as_deref(), || async move {
            service
                .detach_payment_method(&op_caller, payment_method_id)
                .await?;
            Ok((
                StatusCode::OK,
                body_json(&MessageResponse::new("Payment method detached"))?,
            ))
        })
        .await
}

// =============================================================================
// INVOICES
// =============================================================================

/// `GET /api/v1/invoices`
pub async fn list_invoices(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&req, &state).await?;
    let invoices = state
        .billing_service
        .list_invoices(
            &caller,
            query.limit.unwrap_or(50).clamp(1, 200),
            query.offset.unwrap_or(0).max(0),
        )
        .await?;
    Ok(HttpResponse::Ok().json(invoices))
}
