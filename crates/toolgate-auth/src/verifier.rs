//! The verification entry point
//!
//! A [`Verifier`] is built once at startup from the validated configuration
//! and shared behind an `Arc` for the life of the process. Each call to
//! [`Verifier::verify`]:
//!
//! 1. strips an optional `Bearer` scheme
//! 2. records the attempt with the per-token rate limiter
//! 3. dispatches to the configured strategy
//! 4. emits one audit event and one metrics sample
//!
//! Credential problems come back as [`ValidationResult::Failure`]; a degraded
//! verifier comes back as `Err(SystemError)`.

use std::time::Instant;

use crate::audit::{AuditLogger, AuthEvent};
use crate::auth_metrics;
use crate::config::{AuthSettings, VerifierConfig, VerifierKind};
use crate::environment::Environment;
use crate::error::{ConfigResult, SystemError};
use crate::introspection::IntrospectionVerifier;
use crate::jwt::SignatureVerifier;
use crate::rate_limit::{RateLimiter, TokenFingerprint};
use crate::result::{AuthFailure, FailureKind, Rejection, ValidationResult};
use crate::static_tokens::StaticVerifier;

const BEARER_SCHEME: &str = "bearer";

/// Strip a leading `Bearer` scheme and surrounding whitespace
///
/// Case-insensitive and idempotent: applying it to its own output is a no-op.
///
/// ```rust
/// use toolgate_auth::strip_bearer;
///
/// assert_eq!(strip_bearer("Bearer abc.def.ghi"), "abc.def.ghi");
/// assert_eq!(strip_bearer("  bearer   abc  "), "abc");
/// assert_eq!(strip_bearer("abc"), "abc");
/// ```
pub fn strip_bearer(raw: &str) -> &str {
    let mut token = raw.trim();
    while let Some(rest) = strip_scheme(token) {
        token = rest.trim_start();
    }
    token
}

fn strip_scheme(value: &str) -> Option<&str> {
    let scheme = value.get(..BEARER_SCHEME.len())?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return None;
    }
    let rest = &value[BEARER_SCHEME.len()..];
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

/// The configured verification strategy
#[derive(Debug)]
pub enum Strategy {
    /// Locally verified signed tokens
    Signature(SignatureVerifier),
    /// RFC 7662 introspection
    Introspection(IntrospectionVerifier),
    /// Fixed development table
    Static(StaticVerifier),
}

impl Strategy {
    /// Build the strategy for a validated configuration
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`](crate::ConfigError) raised by the strategy's
    /// constructor.
    pub fn from_config(config: &VerifierConfig, env: &Environment) -> ConfigResult<Self> {
        Ok(match config {
            VerifierConfig::Signature(config) => {
                Self::Signature(SignatureVerifier::new(config, env)?)
            }
            VerifierConfig::Introspection(config) => {
                Self::Introspection(IntrospectionVerifier::new(config, env)?)
            }
            VerifierConfig::Static(config) => Self::Static(StaticVerifier::new(config, env)?),
        })
    }

    /// Which strategy this is
    pub fn kind(&self) -> VerifierKind {
        match self {
            Self::Signature(_) => VerifierKind::Signature,
            Self::Introspection(_) => VerifierKind::Introspection,
            Self::Static(_) => VerifierKind::Static,
        }
    }
}

/// Bearer-token verifier: one strategy, one rate limiter, one audit logger
#[derive(Debug)]
pub struct Verifier {
    strategy: Strategy,
    rate_limiter: RateLimiter,
    audit: AuditLogger,
}

impl Verifier {
    /// Build a verifier with the default rate limit
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`](crate::ConfigError); the server must not start.
    pub fn from_config(config: &VerifierConfig, env: &Environment) -> ConfigResult<Self> {
        Ok(Self {
            strategy: Strategy::from_config(config, env)?,
            rate_limiter: RateLimiter::default(),
            audit: AuditLogger::default(),
        })
    }

    /// Build a verifier with the rate limit and audit settings from `settings`
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use std::sync::Arc;
    /// use toolgate_auth::{AuthSettings, Environment, Verifier};
    ///
    /// let settings = AuthSettings::from_env()?;
    /// let verifier = Arc::new(Verifier::from_settings(&settings, &Environment::from_env())?);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`](crate::ConfigError); the server must not start.
    pub fn from_settings(settings: &AuthSettings, env: &Environment) -> ConfigResult<Self> {
        settings.validate(env)?;
        Ok(Self {
            strategy: Strategy::from_config(&settings.verifier, env)?,
            rate_limiter: RateLimiter::new(settings.rate_limit.clone()),
            audit: settings.audit_logger(),
        })
    }

    /// Replace the rate limiter
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Replace the audit logger
    #[must_use]
    pub fn with_audit_logger(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    /// Active strategy
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Active strategy kind
    pub fn kind(&self) -> VerifierKind {
        self.strategy.kind()
    }

    /// Per-token attempt limiter
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Verify a bearer token (the `Bearer` prefix is optional)
    ///
    /// # Errors
    ///
    /// [`SystemError`] when the verifier cannot judge the token at all (key
    /// set or introspection endpoint unavailable). Answer with 503.
    pub async fn verify(&self, raw_token: &str) -> Result<ValidationResult, SystemError> {
        let started = Instant::now();
        let token = strip_bearer(raw_token);
        let fingerprint = TokenFingerprint::of(token);

        if let Err(info) = self.rate_limiter.check(&fingerprint) {
            self.audit.log(AuthEvent::RateLimited {
                fingerprint: fingerprint.to_string(),
                limit: info.limit,
                window_secs: info.window.as_secs(),
            });
            self.record(FailureKind::RateLimited.as_str(), started);
            return Ok(ValidationResult::Failure(AuthFailure::rate_limited()));
        }

        if token.is_empty() {
            return Ok(self.reject(&fingerprint, Rejection::invalid("empty token"), started));
        }

        let judgement = match &self.strategy {
            Strategy::Signature(verifier) => verifier.verify(token).await,
            Strategy::Introspection(verifier) => verifier.verify(token).await,
            Strategy::Static(verifier) => Ok(verifier.verify(token)),
        };

        match judgement {
            Ok(Ok(claims)) => {
                self.audit.log(AuthEvent::TokenAccepted {
                    fingerprint: fingerprint.to_string(),
                    verifier: self.kind().to_string(),
                    identity: claims.identity().unwrap_or_default().to_string(),
                });
                self.record("success", started);
                Ok(ValidationResult::success(claims))
            }
            Ok(Err(rejection)) => Ok(self.reject(&fingerprint, rejection, started)),
            Err(error) => {
                self.audit.log(AuthEvent::VerifierUnavailable {
                    verifier: self.kind().to_string(),
                    error: error.to_string(),
                });
                auth_metrics::record_system_error(self.kind().as_str());
                Err(error)
            }
        }
    }

    fn reject(
        &self,
        fingerprint: &TokenFingerprint,
        rejection: Rejection,
        started: Instant,
    ) -> ValidationResult {
        self.audit.log(AuthEvent::TokenRejected {
            fingerprint: fingerprint.to_string(),
            verifier: self.kind().to_string(),
            kind: rejection.failure.kind,
            reason: rejection.reason,
        });
        self.record(rejection.failure.kind.as_str(), started);
        ValidationResult::Failure(rejection.failure)
    }

    fn record(&self, outcome: &'static str, started: Instant) {
        auth_metrics::record_verification(
            self.kind().as_str(),
            outcome,
            started.elapsed().as_secs_f64(),
        );
    }
}
