//! # Tracing and Structured Logging Configuration
//!
//! Initializes the logging system with environment-appropriate settings.
//!
//! ## Output Formats
//!
//! | Environment | Format | Purpose |
//! |-------------|--------|---------|
//! | Development | Pretty | Human-readable, colored output |
//! | Production | JSON | Machine-parseable for log aggregation |
//!
//! ## Filter Configuration
//!
//! Control verbosity via `RUST_LOG`:
//!
//! ```bash
//! # Info for most, debug for our code
//! RUST_LOG=info,auth_service=debug
//!
//! # Silence noisy crates
//! RUST_LOG=info,hyper=warn,sqlx=warn
//! ```
//!
//! ## Rules
//!
//! 1. **Use structured fields**: `info!(user_id = %id, "Action")` not
//!    `info!("User {} did action", id)`
//! 2. **Never log sensitive data**: passwords, hashes, tokens, OTP codes,
//!    provider tokens, other users' `jti` values
//! 3. Security events (`RefreshReuseDetected`, `AuthRateLimit`) are logged
//!    at WARN on the same code path that increments their counter

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

// =============================================================================
// Initialization
// =============================================================================

/// Initializes the tracing/logging system.
///
/// Call **once** at the very start of the binary, before any code that
/// might emit logs.
///
/// ## Parameters
///
/// - `service_name`: name of the service (for identification in logs)
/// - `is_production`: if true, outputs JSON; if false, pretty format
///
/// ## Defaults
///
/// If `RUST_LOG` is not set:
/// - Production: `info`
/// - Development: `debug,hyper=info,sqlx=warn`
pub fn init_tracing(service_name: &str, is_production: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if is_production {
            EnvFilter::new("info")
        } else {
            EnvFilter::new("debug,hyper=info,sqlx=warn")
        }
    });

    if is_production {
        // JSON structured output for log aggregation tools
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true)
                    .with_current_span(true),
            )
            .init();
    } else {
        // Pretty, human-readable output for terminals
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
    }

    tracing::info!(
        service = service_name,
        production = is_production,
        "Tracing initialized"
    );
}

// =============================================================================
// Helper Macros
// =============================================================================

/// Creates a span for tracking a request across services.
///
/// The correlation id is minted at the edge and carried through every
/// backend call so one user action can be traced end to end.
///
/// ## Example
///
/// ```rust,ignore
/// use shared::request_span;
///
/// let span = request_span!(correlation_id, "POST", "/api/v1/auth/login");
/// async { /* handle */ }.instrument(span).await
/// ```
#[macro_export]
macro_rules! request_span {
    ($correlation_id:expr, $method:expr, $path:expr) => {
        tracing::info_span!(
            "request",
            correlation_id = %$correlation_id,
            method = %$method,
            path = %$path,
        )
    };
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Logs an error with context in a consistent format.
pub fn log_error<E: std::fmt::Display>(error: &E, context: &str) {
    tracing::error!(
        error = %error,
        context = context,
        "Error occurred"
    );
}
