//! # Security Metrics
//!
//! Process-wide counters for security-relevant events. These back the
//! dedicated metrics the token engine and auth flows are required to keep
//! (most importantly `refresh_reuse_detected_total`) and are readable
//! in-process so the test suite can assert on them.
//!
//! Counters are plain relaxed atomics; incrementing is wait-free and safe
//! from any worker thread. The struct is shared via `Arc` through each
//! service's application state.

use std::sync::atomic::{AtomicU64, Ordering};

/// Security event counters.
///
/// One instance per process, created at startup and shared via `Arc`.
/// Incremented on the same code path that logs the corresponding audit
/// event, so counter and log line can never disagree.
#[derive(Debug, Default)]
pub struct SecurityMetrics {
    /// A refresh token was presented that does not match the current index
    /// entry for its user. Implies theft; the session chain was voided.
    pub refresh_reuse_detected_total: AtomicU64,
    /// Access tokens blacklisted through logout or revocation.
    pub token_revoked_total: AtomicU64,
    /// Account locks triggered by the failed-login rate limiter.
    pub auth_rate_limit_total: AtomicU64,
    /// Blacklist lookups that failed closed because the store was down.
    pub blacklist_fail_closed_total: AtomicU64,
    /// Rate-limit lookups that failed open because the store was down.
    pub rate_limit_fail_open_total: AtomicU64,
    /// Webhook endpoints auto-disabled after consecutive failures.
    pub webhook_auto_disabled_total: AtomicU64,
    /// Subscriptions whose payment retries were exhausted (-> unpaid).
    pub payment_retry_exhausted_total: AtomicU64,
}

impl SecurityMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments a counter. Relaxed ordering is sufficient: counters are
    /// monotonic and never synchronize other memory.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = SecurityMetrics::new();
        assert_eq!(SecurityMetrics::get(&metrics.refresh_reuse_detected_total), 0);
        assert_eq!(SecurityMetrics::get(&metrics.token_revoked_total), 0);
    }

    #[test]
    fn test_incr_is_visible() {
        let metrics = SecurityMetrics::new();
        SecurityMetrics::incr(&metrics.refresh_reuse_detected_total);
        SecurityMetrics::incr(&metrics.refresh_reuse_detected_total);
        assert_eq!(SecurityMetrics::get(&metrics.refresh_reuse_detected_total), 2);
    }
}
