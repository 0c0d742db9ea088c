//! Verification metrics
//!
//! Enable with the `metrics` feature flag. A `metrics` recorder must be
//! installed by the host (e.g. `metrics-exporter-prometheus`); without the
//! feature every function here compiles to a no-op.
//!
//! ## Metrics Provided
//!
//! - `toolgate_auth_verifications_total` - Counter (labels: verifier, outcome)
//! - `toolgate_auth_verification_duration_seconds` - Histogram (labels: verifier)
//! - `toolgate_auth_rate_limited_total` - Counter
//! - `toolgate_auth_key_set_fetches_total` - Counter (labels: status)
//! - `toolgate_auth_system_errors_total` - Counter (labels: verifier)
//!
//! `outcome` is `success` or the failure kind (`invalid_token`,
//! `insufficient_scope`, `rate_limited`, `expired_token`).

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};

#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static INIT: Once = Once::new();

/// Register metric descriptions. Idempotent; call once at startup.
///
/// ```rust
/// toolgate_auth::init_auth_metrics();
/// ```
#[cfg(feature = "metrics")]
pub fn init_auth_metrics() {
    INIT.call_once(|| {
        describe_counter!(
            "toolgate_auth_verifications_total",
            "Bearer token verifications by verifier and outcome"
        );
        describe_histogram!(
            "toolgate_auth_verification_duration_seconds",
            "Bearer token verification duration in seconds"
        );
        describe_counter!(
            "toolgate_auth_rate_limited_total",
            "Verification attempts rejected by the per-token rate limiter"
        );
        describe_counter!(
            "toolgate_auth_key_set_fetches_total",
            "Signing key set fetches by result"
        );
        describe_counter!(
            "toolgate_auth_system_errors_total",
            "Verifications that failed because the verifier was degraded"
        );
    });
}

#[cfg(feature = "metrics")]
pub(crate) fn record_verification(verifier: &'static str, outcome: &'static str, seconds: f64) {
    counter!(
        "toolgate_auth_verifications_total",
        "verifier" => verifier,
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "toolgate_auth_verification_duration_seconds",
        "verifier" => verifier
    )
    .record(seconds);
}

#[cfg(feature = "metrics")]
pub(crate) fn record_rate_limited() {
    counter!("toolgate_auth_rate_limited_total").increment(1);
}

#[cfg(feature = "metrics")]
pub(crate) fn record_key_set_fetch(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("toolgate_auth_key_set_fetches_total", "status" => status).increment(1);
}

#[cfg(feature = "metrics")]
pub(crate) fn record_system_error(verifier: &'static str) {
    counter!("toolgate_auth_system_errors_total", "verifier" => verifier).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn init_auth_metrics() {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_verification(_verifier: &'static str, _outcome: &'static str, _seconds: f64) {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_rate_limited() {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_key_set_fetch(_success: bool) {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_system_error(_verifier: &'static str) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_auth_metrics_is_idempotent() {
        init_auth_metrics();
        init_auth_metrics();
    }

    #[test]
    fn test_recorders_without_installed_recorder() {
        init_auth_metrics();
        record_verification("jwt", "success", 0.002);
        record_verification("introspection", "invalid_token", 0.150);
        record_rate_limited();
        record_key_set_fetch(true);
        record_key_set_fetch(false);
        record_system_error("jwt");
    }
}
