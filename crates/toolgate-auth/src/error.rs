//! Error types for the verification subsystem
//!
//! Two disjoint classes leave this crate:
//!
//! - [`ConfigError`] - raised while building a verifier. Fatal: the server must
//!   not start.
//! - [`SystemError`] - raised while verifying when the verifier itself is
//!   degraded (key set or introspection endpoint unreachable). Maps to 503.
//!
//! Problems with the caller's credential are never errors; they are reported as
//! [`ValidationResult::Failure`](crate::ValidationResult::Failure).
//!
//! Neither error type ever renders a token, a secret, key material or a remote
//! URL in its `Display` output.

use http::StatusCode;
use thiserror::Error;

/// Result alias for configuration-time operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration rejected at construction time
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting is absent
    #[error("missing required setting {0}")]
    MissingSetting(&'static str),

    /// A setting is present but cannot be used
    #[error("invalid setting {setting}: {reason}")]
    InvalidSetting {
        /// Setting name
        setting: &'static str,
        /// Why it was rejected (never contains the value of a secret)
        reason: String,
    },

    /// Algorithm outside the accepted whitelist
    #[error("algorithm {0} is not supported")]
    UnsupportedAlgorithm(String),

    /// Symmetric algorithm paired with public key material, or the reverse
    #[error("algorithm {algorithm} cannot be used with a {key_source} key source")]
    AlgorithmKeyMismatch {
        /// Configured algorithm
        algorithm: String,
        /// Kind of key source that was configured
        key_source: &'static str,
    },

    /// Shared secret shorter than the algorithm's digest size
    #[error("{algorithm} secret must be at least {min_bytes} bytes, got {actual_bytes}")]
    WeakKey {
        /// Configured algorithm
        algorithm: String,
        /// Minimum accepted length
        min_bytes: usize,
        /// Length that was supplied
        actual_bytes: usize,
    },

    /// Key material could not be parsed for the configured algorithm
    #[error("key material rejected: {0}")]
    InvalidKey(String),

    /// Requested clock skew exceeds the hard upper bound
    #[error("clock skew of {requested_secs}s exceeds the maximum of {max_secs}s")]
    ClockSkewTooLarge {
        /// Requested tolerance
        requested_secs: u64,
        /// Upper bound
        max_secs: u64,
    },

    /// Network timeout missing, zero or unbounded
    #[error("{setting} must be between 1 and {max_secs} seconds")]
    InvalidTimeout {
        /// Setting name
        setting: &'static str,
        /// Upper bound
        max_secs: u64,
    },

    /// Endpoint is not HTTPS and no local-development exemption applies
    #[error("{setting} must use https (plain http is only accepted for loopback hosts in local development)")]
    InsecureEndpoint {
        /// Setting name
        setting: &'static str,
    },

    /// Static verifier requested while production signals are present
    #[error("static token verifier refused: production environment detected ({signal})")]
    ProductionContext {
        /// The signal that marked the environment as production
        signal: String,
    },

    /// Static verifier requested without an explicit development declaration
    #[error("static token verifier refused: environment is not declared as development")]
    UndeclaredDevelopment,

    /// HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Why a remote fetch failed
///
/// Carries no URL and no response body, so it is safe to render anywhere.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum FetchFailure {
    /// Request did not complete within the configured timeout
    #[error("request timed out")]
    Timeout,
    /// Connection or transport failure
    #[error("network error")]
    Network,
    /// Endpoint answered with a non-success status
    #[error("unexpected status {0}")]
    Status(u16),
    /// Body could not be decoded
    #[error("malformed response")]
    Decode,
}

impl FetchFailure {
    /// Classify a reqwest error without keeping its message (which embeds the URL)
    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Network
        }
    }
}

/// Verifier degraded: the credential could not be judged at all
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SystemError {
    /// The signing key set could not be fetched
    #[error("signing key set unavailable: {0}")]
    KeySetUnavailable(FetchFailure),

    /// The introspection endpoint could not be reached or answered badly
    #[error("token introspection unavailable: {0}")]
    IntrospectionUnavailable(FetchFailure),

    /// Internal failure not attributable to the caller
    #[error("internal verifier error: {0}")]
    Internal(&'static str),
}

impl SystemError {
    /// HTTP status the host should answer with
    pub fn status(&self) -> StatusCode {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
