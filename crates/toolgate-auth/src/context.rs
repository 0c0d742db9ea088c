//! Request-scoped authorization context
//!
//! The [`Authorizer`] turns a [`ValidationResult`] into the [`AuthContext`]
//! the host attaches to the request, applying the server-wide minimum scopes
//! on top of whatever the verifier already required.

use std::time::SystemTime;

use serde::Serialize;

use crate::audit::{AuditLogger, AuthEvent};
use crate::claims::ScopeSet;
use crate::config::AuthSettings;
use crate::result::{AuthFailure, ValidationResult};

/// Identity and capabilities of the caller for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthContext {
    /// Principal (subject, or client id when the token has no subject)
    pub identity: String,
    /// Granted scopes, sorted
    pub scopes: Vec<String>,
    /// Token expiry, if known
    #[serde(skip)]
    pub expires_at: Option<SystemTime>,
}

impl AuthContext {
    /// Whether `scope` was granted
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.binary_search_by(|s| s.as_str().cmp(scope)).is_ok()
    }

    /// Whether every scope in `scopes` was granted
    pub fn has_all_scopes<S: AsRef<str>>(&self, scopes: &[S]) -> bool {
        scopes.iter().all(|scope| self.has_scope(scope.as_ref()))
    }
}

/// Applies server-wide minimum scopes to verification results
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    min_scopes: ScopeSet,
    audit: AuditLogger,
}

impl Authorizer {
    /// Authorizer requiring `min_scopes` from every caller
    pub fn new(min_scopes: ScopeSet) -> Self {
        Self {
            min_scopes,
            audit: AuditLogger::default(),
        }
    }

    /// Authorizer configured from settings
    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self {
            min_scopes: settings.min_scopes.clone(),
            audit: settings.audit_logger(),
        }
    }

    /// Replace the audit logger
    #[must_use]
    pub fn with_audit_logger(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    /// Scopes every caller must hold
    pub fn min_scopes(&self) -> &ScopeSet {
        &self.min_scopes
    }

    /// Build the request context, or the failure to answer with
    ///
    /// A `Failure` passes through unchanged.
    ///
    /// # Errors
    ///
    /// - the verifier's own [`AuthFailure`]
    /// - `invalid_token` when the claims name no identity
    /// - `insufficient_scope` when a minimum scope is missing
    pub fn authorize(&self, result: &ValidationResult) -> Result<AuthContext, AuthFailure> {
        let claims = match result {
            ValidationResult::Success { claims } => claims,
            ValidationResult::Failure(failure) => return Err(failure.clone()),
        };

        let Some(identity) = claims.identity() else {
            return Err(AuthFailure::invalid_token());
        };

        if !claims.satisfies(&self.min_scopes) {
            self.audit.log(AuthEvent::ScopeDenied {
                identity: identity.to_string(),
                missing: claims
                    .missing_scopes(&self.min_scopes)
                    .into_iter()
                    .map(str::to_owned)
                    .collect(),
            });
            return Err(AuthFailure::insufficient_scope());
        }

        Ok(AuthContext {
            identity: identity.to_string(),
            scopes: claims.scopes.iter().cloned().collect(),
            expires_at: claims.expires_at,
        })
    }
}
