//! Structured audit logging for verification events
//!
//! Every verification attempt produces exactly one audit event under the
//! `audit::auth` tracing target. Events carry the token fingerprint, never the
//! token itself.
//!
//! ## Event Types
//!
//! - [`AuthEvent::TokenAccepted`] - credential verified (logged at `debug`)
//! - [`AuthEvent::TokenRejected`] - credential problem (logged at `warn`)
//! - [`AuthEvent::RateLimited`] - attempt over the per-token limit (`warn`)
//! - [`AuthEvent::VerifierUnavailable`] - verifier degraded (`error`)
//! - [`AuthEvent::ScopeDenied`] - server-wide minimum scopes not met (`warn`)
//!
//! ## Usage
//!
//! ```rust
//! use toolgate_auth::audit::{AuditLogger, AuthEvent};
//! use toolgate_auth::FailureKind;
//!
//! let logger = AuditLogger::new("toolgate");
//! logger.log(AuthEvent::TokenRejected {
//!     fingerprint: "ba7816bf8f01cfea".to_string(),
//!     verifier: "jwt".to_string(),
//!     kind: FailureKind::InvalidToken,
//!     reason: "issuer mismatch".to_string(),
//! });
//! ```

use serde::Serialize;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::result::FailureKind;

/// Audit logger attributed to one service
#[derive(Debug, Clone)]
pub struct AuditLogger {
    service_name: String,
    hash_identifiers: bool,
}

impl AuditLogger {
    /// Create a logger for the given service
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            hash_identifiers: false,
        }
    }

    /// Hash principal identities before they are logged
    #[must_use]
    pub fn with_identifier_hashing(mut self, hash: bool) -> Self {
        self.hash_identifiers = hash;
        self
    }

    /// Service name events are attributed to
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Emit an event
    pub fn log(&self, event: AuthEvent) {
        let audit_id = Uuid::now_v7();

        match &event {
            AuthEvent::TokenAccepted {
                fingerprint,
                verifier,
                identity,
            } => {
                debug!(
                    target: "audit::auth",
                    audit_id = %audit_id,
                    event_type = "token_accepted",
                    fingerprint = %fingerprint,
                    verifier = %verifier,
                    identity = %self.maybe_hash(identity),
                    service = %self.service_name,
                    "Bearer token accepted"
                );
            }
            AuthEvent::TokenRejected {
                fingerprint,
                verifier,
                kind,
                reason,
            } => {
                warn!(
                    target: "audit::auth",
                    audit_id = %audit_id,
                    event_type = "token_rejected",
                    fingerprint = %fingerprint,
                    verifier = %verifier,
                    kind = %kind,
                    reason = %reason,
                    service = %self.service_name,
                    "Bearer token rejected"
                );
            }
            AuthEvent::RateLimited {
                fingerprint,
                limit,
                window_secs,
            } => {
                warn!(
                    target: "audit::auth",
                    audit_id = %audit_id,
                    event_type = "rate_limited",
                    fingerprint = %fingerprint,
                    limit = limit,
                    window_secs = window_secs,
                    service = %self.service_name,
                    "Verification attempts over limit"
                );
            }
            AuthEvent::VerifierUnavailable { verifier, error } => {
                error!(
                    target: "audit::auth",
                    audit_id = %audit_id,
                    event_type = "verifier_unavailable",
                    verifier = %verifier,
                    error = %error,
                    service = %self.service_name,
                    "Verifier degraded"
                );
            }
            AuthEvent::ScopeDenied { identity, missing } => {
                warn!(
                    target: "audit::auth",
                    audit_id = %audit_id,
                    event_type = "scope_denied",
                    identity = %self.maybe_hash(identity),
                    missing = ?missing,
                    service = %self.service_name,
                    "Minimum scopes not granted"
                );
            }
        }
    }

    fn maybe_hash(&self, value: &str) -> String {
        if self.hash_identifiers {
            let hash = blake3::hash(value.as_bytes());
            format!("blake3:{}", &hash.to_hex()[..16])
        } else {
            value.to_string()
        }
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new("toolgate")
    }
}

/// Verification event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthEvent {
    /// Credential verified
    TokenAccepted {
        /// Token fingerprint
        fingerprint: String,
        /// Verifier strategy name
        verifier: String,
        /// Principal the token belongs to
        identity: String,
    },
    /// Credential rejected
    TokenRejected {
        /// Token fingerprint
        fingerprint: String,
        /// Verifier strategy name
        verifier: String,
        /// Category returned to the caller
        kind: FailureKind,
        /// Specific reason, server-side only
        reason: String,
    },
    /// Attempt over the per-token limit
    RateLimited {
        /// Token fingerprint
        fingerprint: String,
        /// Attempts admitted per window
        limit: u32,
        /// Window length
        window_secs: u64,
    },
    /// Verifier could not judge the credential
    VerifierUnavailable {
        /// Verifier strategy name
        verifier: String,
        /// Rendered [`SystemError`](crate::SystemError)
        error: String,
    },
    /// Verified principal lacks the server-wide minimum scopes
    ScopeDenied {
        /// Principal
        identity: String,
        /// Scopes that were required but not granted
        missing: Vec<String>,
    },
}
