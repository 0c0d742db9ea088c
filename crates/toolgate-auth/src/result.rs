//! Outcome of a single verification attempt
//!
//! [`ValidationResult`] is the only type handed back to the host for credential
//! problems. Failure descriptions are fixed, generic strings: the precise reason
//! (bad signature vs. wrong issuer vs. wrong audience) is logged server-side and
//! never echoed to the caller.

use std::fmt;

use http::StatusCode;
use serde::Serialize;

use crate::claims::TokenClaims;

const INVALID_TOKEN_DESCRIPTION: &str = "The access token is invalid";
const EXPIRED_TOKEN_DESCRIPTION: &str = "The access token has expired";
const INSUFFICIENT_SCOPE_DESCRIPTION: &str =
    "The access token does not grant the scope required for this request";
const RATE_LIMITED_DESCRIPTION: &str = "Too many authentication attempts";

/// Machine-readable failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed, forged, wrong issuer/audience, unknown or inactive token
    InvalidToken,
    /// Valid token lacking a required scope
    InsufficientScope,
    /// Too many attempts for this token within the window
    RateLimited,
    /// Token reported expired by the authorization server
    ExpiredToken,
}

impl FailureKind {
    /// Wire name used in `error=` parameters
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_token",
            Self::InsufficientScope => "insufficient_scope",
            Self::RateLimited => "rate_limited",
            Self::ExpiredToken => "expired_token",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthFailure {
    /// Failure category
    pub kind: FailureKind,
    /// Generic, non-revealing description
    pub description: &'static str,
    /// HTTP status to answer with
    #[serde(serialize_with = "serialize_status")]
    pub status: StatusCode,
}

impl AuthFailure {
    /// Token rejected for any reason that must not be disclosed
    pub fn invalid_token() -> Self {
        Self {
            kind: FailureKind::InvalidToken,
            description: INVALID_TOKEN_DESCRIPTION,
            status: StatusCode::UNAUTHORIZED,
        }
    }

    /// Token expired according to the authorization server
    pub fn expired_token() -> Self {
        Self {
            kind: FailureKind::ExpiredToken,
            description: EXPIRED_TOKEN_DESCRIPTION,
            status: StatusCode::UNAUTHORIZED,
        }
    }

    /// Token valid but missing required scope
    pub fn insufficient_scope() -> Self {
        Self {
            kind: FailureKind::InsufficientScope,
            description: INSUFFICIENT_SCOPE_DESCRIPTION,
            status: StatusCode::UNAUTHORIZED,
        }
    }

    /// Attempt limit reached
    pub fn rate_limited() -> Self {
        Self {
            kind: FailureKind::RateLimited,
            description: RATE_LIMITED_DESCRIPTION,
            status: StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// `WWW-Authenticate` challenge per RFC 6750 Section 3
    ///
    /// `required_scopes` is advertised only for `insufficient_scope`.
    pub fn www_authenticate(&self, realm: Option<&str>, required_scopes: &[&str]) -> String {
        let mut parts = Vec::new();
        if let Some(realm) = realm {
            parts.push(format!("realm=\"{realm}\""));
        }

        let error = match self.kind {
            // Not a registered RFC 6750 code; clients see a generic invalid_token
            FailureKind::RateLimited => FailureKind::InvalidToken.as_str(),
            kind => kind.as_str(),
        };
        parts.push(format!("error=\"{error}\""));
        parts.push(format!("error_description=\"{}\"", self.description));

        if self.kind == FailureKind::InsufficientScope && !required_scopes.is_empty() {
            parts.push(format!("scope=\"{}\"", required_scopes.join(" ")));
        }

        format!("Bearer {}", parts.join(", "))
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)
    }
}

impl std::error::Error for AuthFailure {}

fn serialize_status<S>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u16(status.as_u16())
}

/// Tagged outcome of [`Verifier::verify`](crate::Verifier::verify)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Credential accepted
    Success {
        /// Claims extracted from the credential
        claims: TokenClaims,
    },
    /// Credential rejected
    Failure(AuthFailure),
}

impl ValidationResult {
    /// Wrap accepted claims
    pub fn success(claims: TokenClaims) -> Self {
        Self::Success { claims }
    }

    /// Whether the credential was accepted
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Failure category, if rejected
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(failure) => Some(failure.kind),
        }
    }

    /// Claims, if accepted
    pub fn claims(&self) -> Option<&TokenClaims> {
        match self {
            Self::Success { claims } => Some(claims),
            Self::Failure(_) => None,
        }
    }

    /// Convert into a standard `Result`
    pub fn into_result(self) -> Result<TokenClaims, AuthFailure> {
        match self {
            Self::Success { claims } => Ok(claims),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl From<AuthFailure> for ValidationResult {
    fn from(failure: AuthFailure) -> Self {
        Self::Failure(failure)
    }
}

/// Credential rejection with the server-side reason
///
/// The reason is for logs only; callers see `failure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rejection {
    pub(crate) failure: AuthFailure,
    pub(crate) reason: String,
}

impl Rejection {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self {
            failure: AuthFailure::invalid_token(),
            reason: reason.into(),
        }
    }

    pub(crate) fn expired(reason: impl Into<String>) -> Self {
        Self {
            failure: AuthFailure::expired_token(),
            reason: reason.into(),
        }
    }

    pub(crate) fn insufficient_scope(missing: &[&str]) -> Self {
        Self {
            failure: AuthFailure::insufficient_scope(),
            reason: format!("missing scopes: {}", missing.join(" ")),
        }
    }
}

/// Per-strategy verdict on a credential
pub(crate) type Judgement = Result<TokenClaims, Rejection>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::ScopeSet;

    #[test]
    fn test_failure_statuses() {
        assert_eq!(AuthFailure::invalid_token().status, StatusCode::UNAUTHORIZED);
        assert_eq!(AuthFailure::expired_token().status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthFailure::insufficient_scope().status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthFailure::rate_limited().status,
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_result_accessors() {
        let ok = ValidationResult::success(TokenClaims::for_subject("alice", ScopeSet::new()));
        assert!(ok.is_success());
        assert_eq!(ok.failure_kind(), None);
        assert_eq!(ok.claims().and_then(TokenClaims::identity), Some("alice"));

        let denied = ValidationResult::from(AuthFailure::rate_limited());
        assert!(!denied.is_success());
        assert_eq!(denied.failure_kind(), Some(FailureKind::RateLimited));
        assert!(denied.into_result().is_err());
    }

    #[test]
    fn test_www_authenticate_invalid_token() {
        let header = AuthFailure::invalid_token().www_authenticate(Some("toolgate"), &[]);
        assert_eq!(
            header,
            "Bearer realm=\"toolgate\", error=\"invalid_token\", error_description=\"The access token is invalid\""
        );
    }

    #[test]
    fn test_www_authenticate_insufficient_scope_lists_scopes() {
        let header =
            AuthFailure::insufficient_scope().www_authenticate(None, &["read:data", "write:data"]);
        assert!(header.starts_with("Bearer error=\"insufficient_scope\""));
        assert!(header.ends_with("scope=\"read:data write:data\""));
    }

    #[test]
    fn test_rejection_keeps_reason_out_of_failure() {
        let rejection = Rejection::insufficient_scope(&["admin", "write:data"]);
        assert_eq!(rejection.failure, AuthFailure::insufficient_scope());
        assert_eq!(rejection.reason, "missing scopes: admin write:data");
        assert!(!rejection.failure.to_string().contains("admin"));
    }

    #[test]
    fn test_failure_serializes_snake_case() {
        let json = serde_json::to_value(AuthFailure::expired_token()).unwrap();
        assert_eq!(json["kind"], "expired_token");
        assert_eq!(json["status"], 401);
    }
}
