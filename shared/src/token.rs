//! # Token Engine
//!
//! Mints and validates the signed access-token envelope and generates the
//! opaque refresh material. Rotation and revocation live in the auth
//! service, which combines this engine with the
//! [revocation store](crate::revocation).
//!
//! ## Token Architecture
//!
//! ```text
//! ┌─────────────────┐                      ┌─────────────────────────┐
//! │  Access Token   │                      │    Refresh Token        │
//! │ (RS256, 15 min) │                      │  (opaque, 30 days)      │
//! └────────┬────────┘                      └───────────┬─────────────┘
//!          │                                           │
//!          │ Verified by signature;                    │ Proven only by
//!          │ revocable via jti blacklist               │ matching the server
//!          ▼                                           ▼  side index
//! ┌─────────────────┐                      ┌─────────────────────────┐
//! │ Stateless       │                      │ Stateful (single-use    │
//! │ verification    │                      │ under rotation)         │
//! └─────────────────┘                      └─────────────────────────┘
//! ```
//!
//! ## Validation Order
//!
//! 1. Parse the header; reject any `alg` outside the allowlist (exactly
//!    `RS256`) - in particular `none` and every symmetric algorithm are
//!    rejected *before* any key is loaded or signature inspected
//! 2. Select the public key by `kid`; during rotation the previous key is
//!    accepted for a 24-hour grace window
//! 3. Verify the signature, then `exp`, `nbf`, `iss`, `aud`
//! 4. (Caller) check the `jti` blacklist in the revocation store
//!
//! ## Claims
//!
//! | Claim | Description |
//! |-------|-------------|
//! | `iss` | Issuing platform |
//! | `sub` | User id (UUID) |
//! | `aud` | Intended consumer |
//! | `exp` / `iat` / `nbf` | Temporal validity |
//! | `jti` | Unique token id, the blacklist handle |
//! | `tenant_id` | Tenant the user belongs to |
//! | `email` | User email for display/logging |
//! | `roles` | Role names for authorization |

use crate::config::TokenConfig;
use crate::crypto::random;
use crate::errors::ApiError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The only accepted signing algorithm, as it appears on the wire.
pub const ALLOWED_ALGORITHM: &str = "RS256";

/// Refresh tokens carry 256 bits of CSPRNG entropy as hex.
const REFRESH_TOKEN_BYTES: usize = 32;

// =============================================================================
// Claims
// =============================================================================

/// Access-token claims. All fields are verified during validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Issuer - must match the configured platform issuer
    pub iss: String,
    /// Subject - the user's unique identifier
    pub sub: Uuid,
    /// Audience - must be one of the configured accepted values
    pub aud: String,
    /// Expiration time as unix seconds
    pub exp: i64,
    /// Issued-at as unix seconds
    pub iat: i64,
    /// Not-before as unix seconds
    pub nbf: i64,
    /// Unique token id; registered on the blacklist only when revoked
    pub jti: Uuid,
    /// Tenant the subject belongs to
    pub tenant_id: Uuid,
    /// Subject email for display and logging
    pub email: String,
    /// Role names for authorization decisions
    pub roles: Vec<String>,
}

impl AccessClaims {
    /// Seconds until this token's natural expiry (zero if already past).
    /// Used as the blacklist TTL so revocation entries self-expire.
    pub fn remaining_lifetime(&self) -> std::time::Duration {
        let remaining = self.exp - Utc::now().timestamp();
        std::time::Duration::from_secs(remaining.max(0) as u64)
    }
}

/// A freshly minted access token with its metadata.
#[derive(Debug, Clone)]
pub struct MintedAccess {
    /// The encoded token
    pub token: String,
    /// The token's unique id
    pub jti: Uuid,
    /// Seconds until expiry (for the `expires_in` response field)
    pub expires_in: i64,
}

// =============================================================================
// Raw Header
// =============================================================================

/// The raw, untrusted token header.
///
/// Parsed by hand so the algorithm allowlist runs on the literal header
/// string. Library parsers reject `"none"` as unknown, which would make it
/// indistinguishable from a corrupt token - we must answer
/// `AlgorithmDisallowed` instead, without loading any key.
#[derive(Debug, Deserialize)]
struct RawHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

fn parse_raw_header(token: &str) -> Result<RawHeader, ApiError> {
    let header_b64 = token.split('.').next().ok_or(ApiError::InvalidSignature)?;
    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| ApiError::InvalidSignature)?;
    serde_json::from_slice(&header_bytes).map_err(|_| ApiError::InvalidSignature)
}

// =============================================================================
// Token Engine
// =============================================================================

/// RS256 token engine.
///
/// Created once at startup from [`TokenConfig`] and shared via `Arc`.
/// Keys are immutable after construction.
pub struct TokenEngine {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    previous_decoding_key: Option<DecodingKey>,
    config: TokenConfig,
}

impl TokenEngine {
    /// Builds the engine, parsing the PEM key material.
    ///
    /// The signing key must be RSA. A modulus below 2048 bits is refused
    /// outright; below 4096 bits (the platform requirement) a warning is
    /// logged so staging configs get flagged without breaking local runs.
    ///
    /// ## Errors
    ///
    /// `ApiError::CryptoError` if any PEM fails to parse.
    pub fn new(config: TokenConfig) -> Result<Self, ApiError> {
        if config.audiences.is_empty() {
            return Err(ApiError::CryptoError {
                message: "Token config needs at least one audience".to_string(),
            });
        }

        let encoding_key = EncodingKey::from_rsa_pem(config.signing_key_pem.as_bytes())
            .map_err(|e| ApiError::CryptoError {
                message: format!("Invalid signing key PEM: {}", e),
            })?;
        let decoding_key = DecodingKey::from_rsa_pem(config.public_key_pem.as_bytes())
            .map_err(|e| ApiError::CryptoError {
                message: format!("Invalid public key PEM: {}", e),
            })?;

        Self::check_key_size(&config.public_key_pem)?;

        let previous_decoding_key = match &config.previous_public_key_pem {
            Some(pem) => Some(DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
                ApiError::CryptoError {
                    message: format!("Invalid previous public key PEM: {}", e),
                }
            })?),
            None => None,
        };

        Ok(Self {
            encoding_key,
            decoding_key,
            previous_decoding_key,
            config,
        })
    }

    /// Rejects RSA keys under 2048 bits, warns under 4096.
    fn check_key_size(public_key_pem: &str) -> Result<(), ApiError> {
        let key = rsa::RsaPublicKey::from_public_key_pem(public_key_pem)
            .or_else(|_| rsa::RsaPublicKey::from_pkcs1_pem(public_key_pem))
            .map_err(|e| ApiError::CryptoError {
                message: format!("Public key is not RSA: {}", e),
            })?;

        let bits = rsa::traits::PublicKeyParts::size(&key) * 8;
        if bits < 2048 {
            return Err(ApiError::CryptoError {
                message: format!("RSA key too small: {} bits", bits),
            });
        }
        if bits < 4096 {
            tracing::warn!(bits, "Signing key below the 4096-bit platform requirement");
        }
        Ok(())
    }

    /// Access to the engine configuration (TTLs, issuer).
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    // =========================================================================
    // Minting
    // =========================================================================

    /// Mints a fresh access token for a validated principal.
    pub fn mint_access(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        email: &str,
        roles: Vec<String>,
    ) -> Result<MintedAccess, ApiError> {
        let now = Utc::now();
        let ttl = ChronoDuration::seconds(self.config.access_token_ttl_seconds as i64);
        let jti = Uuid::new_v4();

        let claims = AccessClaims {
            iss: self.config.issuer.clone(),
            sub: user_id,
            aud: self.config.audiences[0].clone(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti,
            tenant_id,
            email: email.to_string(),
            roles,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.config.kid.clone());

        let token = encode(&header, &claims, &self.encoding_key).map_err(|e| {
            ApiError::CryptoError {
                message: format!("Failed to sign token: {}", e),
            }
        })?;

        Ok(MintedAccess {
            token,
            jti,
            expires_in: self.config.access_token_ttl_seconds as i64,
        })
    }

    /// Generates a fresh opaque refresh token (256 bits, hex).
    ///
    /// Never parsed; its validity is proven solely by matching the
    /// server-side index entry.
    pub fn generate_refresh(&self) -> Result<String, ApiError> {
        random::random_hex(REFRESH_TOKEN_BYTES)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validates signature and claims (steps 1-3 of the validation order).
    ///
    /// The blacklist lookup (step 4) belongs to the caller, which owns the
    /// revocation store and its outage policy.
    ///
    /// ## Errors
    ///
    /// - `AlgorithmDisallowed` - header names anything but `RS256`;
    ///   returned before any key is touched
    /// - `InvalidClaim { "kid" }` - unknown or expired key id
    /// - `InvalidSignature` / `TokenExpired` / `InvalidClaim` for the
    ///   remaining checks, each mapped from the underlying verifier error
    pub fn validate(&self, token: &str) -> Result<AccessClaims, ApiError> {
        // Step 1: algorithm allowlist on the raw header string
        let raw = parse_raw_header(token)?;
        if raw.alg != ALLOWED_ALGORITHM {
            return Err(ApiError::AlgorithmDisallowed);
        }

        // Step 2: key selection by kid (rotation grace for the previous key)
        let decoding_key = self.select_key(raw.kid.as_deref())?;

        // Step 3: signature + temporal/issuer/audience claims
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&self.config.audiences.iter().collect::<Vec<_>>());
        validation.validate_nbf = true;
        validation.leeway = 0;

        let data = decode::<AccessClaims>(token, decoding_key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => ApiError::TokenExpired,
                ErrorKind::ImmatureSignature => ApiError::InvalidClaim { field: "nbf" },
                ErrorKind::InvalidIssuer => ApiError::InvalidClaim { field: "iss" },
                ErrorKind::InvalidAudience => ApiError::InvalidClaim { field: "aud" },
                _ => ApiError::InvalidSignature,
            }
        })?;

        Ok(data.claims)
    }

    /// Picks the verification key for a `kid`, honoring the rotation
    /// grace window for the previous key.
    fn select_key(&self, kid: Option<&str>) -> Result<&DecodingKey, ApiError> {
        let kid = kid.ok_or(ApiError::InvalidClaim { field: "kid" })?;

        if kid == self.config.kid {
            return Ok(&self.decoding_key);
        }

        if let (Some(previous_kid), Some(previous_key)) =
            (&self.config.previous_kid, &self.previous_decoding_key)
        {
            if kid == previous_kid && self.previous_key_in_grace() {
                return Ok(previous_key);
            }
        }

        Err(ApiError::InvalidClaim { field: "kid" })
    }

    /// Whether the previous key is still inside its grace window.
    fn previous_key_in_grace(&self) -> bool {
        match self.config.previous_retired_at {
            Some(retired_at) => {
                let grace = ChronoDuration::hours(self.config.rotation_grace_hours);
                Utc::now() < retired_at + grace
            }
            // No retirement timestamp recorded: treat as outside grace
            None => false,
        }
    }
}

// =============================================================================
// Full Validation (engine + blacklist)
// =============================================================================

/// Runs the complete inbound validation: engine checks (allowlist,
/// signature, claims) followed by the blacklist lookup, applying the
/// configured outage policy.
///
/// Every service that accepts bearer tokens calls this - backends
/// re-validate on arrival even behind the mutually authenticated edge
/// and build identity only from the returned claims.
///
/// On a store outage the blacklist check fails **closed** (the token is
/// rejected and `blacklist_fail_closed_total` counts it) unless
/// `revocation.fail_open_blacklist` was set.
pub async fn validate_with_revocation(
    engine: &TokenEngine,
    store: &crate::revocation::RevocationStore,
    policy: &crate::config::RevocationPolicy,
    metrics: &crate::metrics::SecurityMetrics,
    token: &str,
) -> Result<AccessClaims, ApiError> {
    let claims = engine.validate(token)?;

    match store.is_token_blacklisted(&claims.jti).await {
        Ok(true) => Err(ApiError::TokenRevoked),
        Ok(false) => Ok(claims),
        Err(store_err) => {
            if policy.fail_open_blacklist {
                tracing::warn!(error = %store_err, "Blacklist unavailable; configured to fail open");
                Ok(claims)
            } else {
                crate::metrics::SecurityMetrics::incr(&metrics.blacklist_fail_closed_total);
                tracing::warn!(error = %store_err, "Blacklist unavailable; failing closed");
                // Conservatively surfaced as an authentication failure
                Err(ApiError::TokenRevoked)
            }
        }
    }
}

// Implement Debug manually to avoid exposing keys
impl std::fmt::Debug for TokenEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEngine")
            .field("kid", &self.config.kid)
            .field("issuer", &self.config.issuer)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub mod test_support {
    //! RSA key fixtures for token tests. 2048-bit keys keep the suite
    //! fast; production configs carry 4096-bit keys.

    use super::*;
    use rsa::pkcs1::EncodeRsaPrivateKey;
    use rsa::pkcs8::EncodePublicKey;
    use rsa::RsaPrivateKey;

    pub fn test_token_config() -> TokenConfig {
        let (signing_pem, public_pem) = generate_key_pair();
        TokenConfig {
            signing_key_pem: signing_pem,
            public_key_pem: public_pem,
            kid: "test-key-1".to_string(),
            previous_public_key_pem: None,
            previous_kid: None,
            previous_retired_at: None,
            rotation_grace_hours: 24,
            access_token_ttl_seconds: 900,
            refresh_token_ttl_seconds: 2_592_000,
            issuer: "aegis".to_string(),
            audiences: vec!["aegis-api".to_string()],
        }
    }

    pub fn generate_key_pair() -> (String, String) {
        let key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).expect("keygen");
        let signing_pem = key
            .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
            .expect("pem")
            .to_string();
        let public_pem = key
            .to_public_key()
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .expect("pem");
        (signing_pem, public_pem)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn engine() -> TokenEngine {
        TokenEngine::new(test_token_config()).unwrap()
    }

    #[test]
    fn test_mint_and_validate_round_trip() {
        let engine = engine();
        let user_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();

        let minted = engine
            .mint_access(user_id, tenant_id, "user@example.com", vec!["member".into()])
            .unwrap();
        assert_eq!(minted.expires_in, 900);

        let claims = engine.validate(&minted.token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.tenant_id, tenant_id);
        assert_eq!(claims.email, "user@example.com");
        assert_eq!(claims.roles, vec!["member".to_string()]);
        assert_eq!(claims.jti, minted.jti);
        assert!(claims.nbf <= Utc::now().timestamp());
    }

    #[test]
    fn test_alg_none_rejected_before_signature_check() {
        let engine = engine();

        // Hand-built token claiming alg "none" and an admin subject.
        // Base64url("{"alg":"none"}") + arbitrary claims, no signature.
        let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\",\"kid\":\"test-key-1\"}");
        let claims = URL_SAFE_NO_PAD.encode(b"{\"sub\":\"admin\"}");
        let token = format!("{}.{}.", header, claims);

        let result = engine.validate(&token);
        assert!(matches!(result, Err(ApiError::AlgorithmDisallowed)));
    }

    #[test]
    fn test_symmetric_alg_rejected() {
        let engine = engine();
        let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"HS256\",\"kid\":\"test-key-1\"}");
        let claims = URL_SAFE_NO_PAD.encode(b"{\"sub\":\"admin\"}");
        let token = format!("{}.{}.forged", header, claims);

        assert!(matches!(engine.validate(&token), Err(ApiError::AlgorithmDisallowed)));
    }

    #[test]
    fn test_unknown_kid_rejected() {
        let config = test_token_config();
        let engine = TokenEngine::new(config.clone()).unwrap();

        let mut other_config = test_token_config(); // fresh key pair
        other_config.kid = "rogue-key".to_string();
        let other = TokenEngine::new(other_config).unwrap();

        let minted = other
            .mint_access(Uuid::new_v4(), Uuid::new_v4(), "a@b.c", vec![])
            .unwrap();

        assert!(matches!(
            engine.validate(&minted.token),
            Err(ApiError::InvalidClaim { field: "kid" })
        ));
    }

    #[test]
    fn test_previous_kid_accepted_inside_grace() {
        // Old engine signs; new engine carries the old public key as
        // previous with a retirement 1 hour ago (inside the 24 h window)
        let old_config = test_token_config();
        let old_engine = TokenEngine::new(old_config.clone()).unwrap();
        let minted = old_engine
            .mint_access(Uuid::new_v4(), Uuid::new_v4(), "a@b.c", vec![])
            .unwrap();

        let mut new_config = test_token_config();
        new_config.kid = "test-key-2".to_string();
        new_config.previous_kid = Some(old_config.kid.clone());
        new_config.previous_public_key_pem = Some(old_config.public_key_pem.clone());
        new_config.previous_retired_at = Some(Utc::now() - ChronoDuration::hours(1));
        let new_engine = TokenEngine::new(new_config).unwrap();

        assert!(new_engine.validate(&minted.token).is_ok());
    }

    #[test]
    fn test_previous_kid_rejected_after_grace() {
        let old_config = test_token_config();
        let old_engine = TokenEngine::new(old_config.clone()).unwrap();
        let minted = old_engine
            .mint_access(Uuid::new_v4(), Uuid::new_v4(), "a@b.c", vec![])
            .unwrap();

        let mut new_config = test_token_config();
        new_config.kid = "test-key-2".to_string();
        new_config.previous_kid = Some(old_config.kid.clone());
        new_config.previous_public_key_pem = Some(old_config.public_key_pem.clone());
        new_config.previous_retired_at = Some(Utc::now() - ChronoDuration::hours(25));
        let new_engine = TokenEngine::new(new_config).unwrap();

        assert!(matches!(
            new_engine.validate(&minted.token),
            Err(ApiError::InvalidClaim { field: "kid" })
        ));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let mut config = test_token_config();
        config.issuer = "someone-else".to_string();
        let foreign = TokenEngine::new(config).unwrap();
        // Same key pair is required for the signature to verify, so build
        // the verifying engine from the foreign config with our issuer
        let mut ours = foreign.config.clone();
        ours.issuer = "aegis".to_string();
        let engine = TokenEngine::new(ours).unwrap();

        let minted = foreign
            .mint_access(Uuid::new_v4(), Uuid::new_v4(), "a@b.c", vec![])
            .unwrap();

        assert!(matches!(
            engine.validate(&minted.token),
            Err(ApiError::InvalidClaim { field: "iss" })
        ));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let engine = engine();
        let minted = engine
            .mint_access(Uuid::new_v4(), Uuid::new_v4(), "a@b.c", vec![])
            .unwrap();

        let mut tampered = minted.token.clone();
        tampered.pop();
        tampered.push(if minted.token.ends_with('A') { 'B' } else { 'A' });

        assert!(matches!(engine.validate(&tampered), Err(ApiError::InvalidSignature)));
    }

    #[test]
    fn test_refresh_tokens_are_opaque_and_distinct() {
        let engine = engine();
        let r1 = engine.generate_refresh().unwrap();
        let r2 = engine.generate_refresh().unwrap();

        assert_eq!(r1.len(), 64); // 32 bytes hex
        assert_ne!(r1, r2);
        // Not parseable as a JWT
        assert!(!r1.contains('.'));
    }

    #[test]
    fn test_remaining_lifetime_zero_when_expired() {
        let claims = AccessClaims {
            iss: "aegis".into(),
            sub: Uuid::new_v4(),
            aud: "aegis-api".into(),
            exp: Utc::now().timestamp() - 100,
            iat: 0,
            nbf: 0,
            jti: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            email: "a@b.c".into(),
            roles: vec![],
        };
        assert_eq!(claims.remaining_lifetime(), std::time::Duration::ZERO);
    }
}
