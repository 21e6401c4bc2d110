//! # Idempotent Mutation Replay
//!
//! Payment and subscription mutations accept an `Idempotency-Key`
//! header scoped to `(tenant_id, user_id)` with a 24-hour window. The
//! first request executes; its response is cached under the composite
//! key; every retry inside the window gets the cached response
//! byte-for-byte, with no side effects re-executed. After the window the
//! key may be reused.
//!
//! The cache lives in the revocation store
//! (`idem:{tenant}:{user}:{key}`), which gives the TTL semantics for
//! free and keeps replies identical across service replicas.

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse};
use shared::errors::ApiError;
use shared::identity::Caller;
use shared::revocation::{CachedResponse, RevocationStore};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Replay window.
const IDEMPOTENCY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Header carrying the client-chosen key.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Extracts the idempotency key. Payment and subscription mutations pass
/// `required = true`; other endpoints may accept the header
/// opportunistically.
pub fn extract_key(req: &HttpRequest, required: bool) -> Result<Option<String>, ApiError> {
    let key = req
        .headers()
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty());

    match key {
        Some(k) if k.len() <= 128 => Ok(Some(k.to_string())),
        Some(_) => Err(ApiError::BadRequest {
            message: "Idempotency key must be at most 128 characters".to_string(),
        }),
        None if required => Err(ApiError::IdempotencyKeyRequired),
        None => Ok(None),
    }
}

/// Idempotency wrapper around one mutation.
#[derive(Clone)]
pub struct IdempotencyLayer {
    store: RevocationStore,
}

impl IdempotencyLayer {
    pub fn new(store: RevocationStore) -> Self {
        Self { store }
    }

    /// Runs `op` at most once per `(tenant, user, key)` within the
    /// window. `op` returns the status and the exact body bytes to send;
    /// replays reproduce both without touching `op` again.
    ///
    /// Only successful (2xx) responses are cached - a failed attempt may
    /// legitimately be retried with the same key.
    pub async fn execute<F, Fut>(
        &self,
        caller: &Caller,
        key: Option<&str>,
        op: F,
    ) -> Result<HttpResponse, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(StatusCode, String), ApiError>>,
    {
        let key = match key {
            Some(key) => key,
            // No key supplied (optional endpoint): execute directly
            None => {
                let (status, body) = op().await?;
                return Ok(json_response(status, body));
            }
        };

        match self
            .store
            .cached_response(&caller.tenant_id, &caller.user_id, key)
            .await
        {
            Ok(Some(cached)) => {
                info!(key = key, "Idempotent replay");
                let status =
                    StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
                return Ok(json_response(status, cached.body));
            }
            Ok(None) => {}
            Err(e) => {
                // Store outage degrades to at-least-once for this
                // request; the mutation itself still runs exactly once
                // here
                warn!(error = %e, "Idempotency cache unavailable; executing without replay guard");
            }
        }

        let (status, body) = op().await?;

        if status.is_success() {
            if let Err(e) = self
                .store
                .cache_response(
                    &caller.tenant_id,
                    &caller.user_id,
                    key,
                    &CachedResponse { status: status.as_u16(), body: body.clone() },
                    IDEMPOTENCY_WINDOW,
                )
                .await
            {
                warn!(error = %e, "Failed to cache idempotent response");
            }
        }

        Ok(json_response(status, body))
    }
}

fn json_response(status: StatusCode, body: String) -> HttpResponse {
    HttpResponse::build(status)
        .content_type("application/json")
        .body(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_24_hours() {
        assert_eq!(IDEMPOTENCY_WINDOW, Duration::from_secs(86_400));
    }

    // Replay round trips require Redis; see tests/billing_flow_tests.rs.
}
