//! # Caller Identity and Tenant Isolation
//!
//! The validated principal behind a request, and the single place where
//! cross-tenant access is refused.
//!
//! ## Identity Comes From the Token, Never From Metadata
//!
//! The edge layer propagates `(user_id, tenant_id, email, roles)` as call
//! metadata headers so backends can log and trace cheaply, but a backend
//! MUST re-validate the bearer token on arrival and construct [`Caller`]
//! only from the validated claims. [`Caller::from_claims`] is the sole
//! constructor for request handling; the propagation headers exist for
//! observability, not authentication.
//!
//! ## Tenant Isolation
//!
//! Every authorization check that resolves a resource verifies the
//! resource's own `tenant_id` against the caller's before returning it.
//! A mismatch is a permission failure, not `NotFound` - this core does not
//! conceal id existence across tenants.

use crate::errors::ApiError;
use crate::token::AccessClaims;
use uuid::Uuid;

// =============================================================================
// Propagation Headers
// =============================================================================
// Observability metadata added by the edge after validating the token.
// Backends never trust these for authentication.

pub const HEADER_USER_ID: &str = "x-aegis-user-id";
pub const HEADER_TENANT_ID: &str = "x-aegis-tenant-id";
pub const HEADER_EMAIL: &str = "x-aegis-email";
pub const HEADER_ROLES: &str = "x-aegis-roles";

// =============================================================================
// Caller
// =============================================================================

/// The authenticated principal for one request.
///
/// Constructed only from validated token claims; inserted into request
/// extensions by the service's auth extraction and read by handlers.
#[derive(Debug, Clone)]
pub struct Caller {
    /// The user's unique identifier (from the `sub` claim)
    pub user_id: Uuid,
    /// Tenant the user belongs to
    pub tenant_id: Uuid,
    /// User email for display and logging
    pub email: String,
    /// Role names for authorization checks
    pub roles: Vec<String>,
}

impl Caller {
    /// Builds a caller from validated access-token claims.
    pub fn from_claims(claims: &AccessClaims) -> Self {
        Self {
            user_id: claims.sub,
            tenant_id: claims.tenant_id,
            email: claims.email.clone(),
            roles: claims.roles.clone(),
        }
    }

    /// Whether the caller holds a role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Enforces tenant isolation on a resolved resource.
    ///
    /// ## Errors
    ///
    /// `ApiError::TenantMismatch` (surfaced as a permission failure, not
    /// `NotFound`) when the resource belongs to a different tenant.
    pub fn ensure_tenant(&self, resource_tenant_id: Uuid) -> Result<(), ApiError> {
        if self.tenant_id == resource_tenant_id {
            Ok(())
        } else {
            tracing::warn!(
                caller_tenant = %self.tenant_id,
                resource_tenant = %resource_tenant_id,
                "Cross-tenant access refused"
            );
            Err(ApiError::TenantMismatch)
        }
    }

    /// The observability headers the edge attaches when forwarding this
    /// caller to a backend service.
    pub fn propagation_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            (HEADER_USER_ID, self.user_id.to_string()),
            (HEADER_TENANT_ID, self.tenant_id.to_string()),
            (HEADER_EMAIL, self.email.clone()),
            (HEADER_ROLES, self.roles.join(",")),
        ]
    }
}

// =============================================================================
// Request Authentication
// =============================================================================

/// Re-validates the bearer token carried by a request and builds the
/// caller identity from its claims.
///
/// This is the defense-in-depth entry point every backend service uses:
/// even behind the mutually authenticated edge, the token is validated
/// again on arrival and identity never comes from the propagation
/// headers.
pub async fn authenticate_request(
    req: &actix_web::HttpRequest,
    engine: &crate::token::TokenEngine,
    store: &crate::revocation::RevocationStore,
    policy: &crate::config::RevocationPolicy,
    metrics: &crate::metrics::SecurityMetrics,
) -> Result<(AccessClaims, Caller), ApiError> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::MissingAuth)?;

    let token = bearer_token(header)?;
    let claims =
        crate::token::validate_with_revocation(engine, store, policy, metrics, token).await?;
    let caller = Caller::from_claims(&claims);

    Ok((claims, caller))
}

// =============================================================================
// Bearer Extraction
// =============================================================================

/// Extracts the token from an `Authorization: Bearer <token>` header value.
///
/// ## Errors
///
/// `ApiError::MissingAuth` if the header doesn't carry a bearer token.
pub fn bearer_token(auth_header: &str) -> Result<&str, ApiError> {
    auth_header
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::MissingAuth)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(tenant_id: Uuid) -> Caller {
        Caller {
            user_id: Uuid::new_v4(),
            tenant_id,
            email: "user@example.com".to_string(),
            roles: vec!["member".to_string()],
        }
    }

    #[test]
    fn test_ensure_tenant_same_tenant_ok() {
        let tenant = Uuid::new_v4();
        assert!(caller(tenant).ensure_tenant(tenant).is_ok());
    }

    #[test]
    fn test_ensure_tenant_mismatch_is_permission_denied() {
        let result = caller(Uuid::new_v4()).ensure_tenant(Uuid::new_v4());
        assert!(matches!(result, Err(ApiError::TenantMismatch)));
    }

    #[test]
    fn test_has_role() {
        let c = caller(Uuid::new_v4());
        assert!(c.has_role("member"));
        assert!(!c.has_role("admin"));
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token("Bearer abc.def.ghi").unwrap(), "abc.def.ghi");
        assert!(matches!(bearer_token("Basic abc"), Err(ApiError::MissingAuth)));
        assert!(matches!(bearer_token("Bearer "), Err(ApiError::MissingAuth)));
        assert!(matches!(bearer_token(""), Err(ApiError::MissingAuth)));
    }

    #[test]
    fn test_propagation_headers_complete() {
        let c = caller(Uuid::new_v4());
        let headers = c.propagation_headers();
        assert_eq!(headers.len(), 4);
        assert!(headers.iter().any(|(name, _)| *name == HEADER_USER_ID));
        assert!(headers.iter().any(|(name, _)| *name == HEADER_TENANT_ID));
    }
}
