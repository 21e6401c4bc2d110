//! # Request Handlers
//!
//! Delivery HTTP handlers. Bearer tokens are re-validated on arrival
//! (defense in depth); the email enqueue endpoint is for internal
//! service-to-service use over the mutually authenticated channel.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use shared::errors::ApiError;
use shared::identity::{authenticate_request, Caller};
use shared::validation;
use uuid::Uuid;

use crate::api::AppState;
use crate::domain::NewEmail;

use super::dto::{CreateWebhookRequest, EnqueueEmailRequest, HealthResponse, MessageResponse};

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

// =============================================================================
// HEALTH
// =============================================================================

/// `GET /health`
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: "delivery-service".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

// =============================================================================
// EMAILS
// =============================================================================

/// `POST /api/v1/emails` - internal enqueue. Suppressed recipients are
/// skipped, not failed.
pub async fn enqueue_email(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<EnqueueEmailRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let caller = authenticate(&req, &state).await?;

    let queued = state
        .email_service
        .enqueue(NewEmail {
            tenant_id: Some(caller.tenant_id),
            recipient: body.recipient,
            template_id: body.template_id,
            variables: body.variables,
            priority: body.priority,
            scheduled_at: None,
        })
        .await?;

    match queued {
        Some(message) => Ok(HttpResponse::Created().json(message)),
        None => Ok(HttpResponse::Ok().json(MessageResponse::new("Recipient suppressed; send skipped"))),
    }
}

/// `GET /api/v1/emails/{id}` - queue row status.
pub async fn get_email(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&req, &state).await?;
    let message = state.email_service.get_message(path.into_inner()).await?;

    if let Some(tenant_id) = message.tenant_id {
        caller.ensure_tenant(tenant_id)?;
    }

    Ok(HttpResponse::Ok().json(message))
}

// =============================================================================
// WEBHOOKS
// =============================================================================

/// `POST /api/v1/webhooks` - the signing secret appears only in this
/// response.
pub async fn create_webhook(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreateWebhookRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let caller = authenticate(&req, &state).await?;
    let created = state
        .webhook_service
        .create_endpoint(&caller, &body.url, body.events)
        .await?;

    Ok(HttpResponse::Created().json(created))
}

/// `GET /api/v1/webhooks`
pub async fn list_webhooks(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&req, &state).await?;
    let endpoints = state.webhook_service.list_endpoints(&caller).await?;
    Ok(HttpResponse::Ok().json(endpoints))
}

/// `POST /api/v1/webhooks/{id}/test` - synthetic event through the
/// normal validation + signing path.
pub async fn test_webhook(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&req, &state).await?;
    let delivery = state
        .webhook_service
        .test_endpoint(&caller, path.into_inner())
        .await?;
    Ok(HttpResponse::Accepted().json(delivery))
}

/// `DELETE /api/v1/webhooks/{id}`
pub async fn delete_webhook(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&req, &state).await?;
    state
        .webhook_service
        .delete_endpoint(&caller, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Webhook deleted")))
}
