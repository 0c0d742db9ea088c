//! # Tower middleware
//!
//! [`BearerAuthLayer`] wraps an `http::Request` service with bearer-token
//! verification. On success the request reaches the inner service with an
//! [`AuthContext`](crate::AuthContext) in its extensions; on failure the
//! layer answers directly:
//!
//! | Outcome | Status | Header |
//! |---------|--------|--------|
//! | no credentials | 401 | `WWW-Authenticate: Bearer realm=...` |
//! | `invalid_token` / `expired_token` / `insufficient_scope` | 401 | RFC 6750 challenge |
//! | `rate_limited` | 429 | RFC 6750 challenge |
//! | key set or introspection endpoint down | 503 | none |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tower::ServiceBuilder;
//! use toolgate_auth::tower::BearerAuthLayer;
//! use toolgate_auth::{Authorizer, AuthSettings, Environment, Verifier};
//!
//! let settings = AuthSettings::from_env()?;
//! let verifier = Verifier::from_settings(&settings, &Environment::from_env())?;
//!
//! let service = ServiceBuilder::new()
//!     .layer(BearerAuthLayer::new(verifier, Authorizer::from_settings(&settings)))
//!     .service(my_inner_service);
//! ```
//!
//! Handlers read the caller from the request:
//!
//! ```rust,ignore
//! if let Some(auth) = req.extensions().get::<AuthContext>() {
//!     tracing::info!(identity = %auth.identity, "tool call");
//! }
//! ```

mod layer;
mod service;

pub use layer::BearerAuthLayer;
pub use service::{BearerAuthService, BearerAuthServiceFuture};

use http::HeaderName;

/// Configuration for the bearer layer
#[derive(Debug, Clone)]
pub struct BearerAuthConfig {
    /// Realm advertised in challenges
    pub realm: Option<String>,
    /// Header carrying the credential (default: `Authorization`)
    pub auth_header: HeaderName,
    /// Paths served without authentication (exact match), e.g. health checks
    pub bypass_paths: Vec<String>,
}

impl Default for BearerAuthConfig {
    fn default() -> Self {
        Self {
            realm: None,
            auth_header: http::header::AUTHORIZATION,
            bypass_paths: Vec::new(),
        }
    }
}

impl BearerAuthConfig {
    /// Set the challenge realm
    #[must_use]
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Set the credential header
    #[must_use]
    pub fn auth_header(mut self, header: HeaderName) -> Self {
        self.auth_header = header;
        self
    }

    /// Serve `path` without authentication
    #[must_use]
    pub fn bypass_path(mut self, path: impl Into<String>) -> Self {
        self.bypass_paths.push(path.into());
        self
    }

    /// Whether `path` bypasses authentication
    #[must_use]
    pub fn should_bypass(&self, path: &str) -> bool {
        self.bypass_paths.iter().any(|p| p == path)
    }
}
