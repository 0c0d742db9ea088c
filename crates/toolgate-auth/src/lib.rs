//! # Toolgate Auth - Bearer-Token Verification
//!
//! Bearer-token verification and scope authorization for the Toolgate tool
//! server. Every protected request carries a token; this crate decides who
//! the caller is, whether the token is genuine and current, and what it may
//! do.
//!
//! ## Design Principles
//!
//! - **Fail closed**: a misconfigured verifier refuses to start
//! - **Say nothing**: callers get a fixed, generic failure; the reason stays in server logs
//! - **Degrade visibly**: an unreachable key set or introspection endpoint is a
//!   [`SystemError`] (503), never a silent accept or a misleading 401
//!
//! ## Strategies
//!
//! Exactly one strategy is active per process, selected by [`VerifierConfig`]:
//!
//! - **`jwt`** - local signature verification against a JWKS endpoint, a
//!   PEM public key, or a shared HMAC secret ([`jwt`])
//! - **`introspection`** - RFC 7662 queries to the authorization server
//!   ([`introspection`])
//! - **`static`** - a fixed token table, refused outside declared local
//!   development ([`static_tokens`])
//!
//! ## Architecture
//!
//! - [`verifier`] - the [`Verifier`] entry point (prefix stripping, rate limit, dispatch, audit)
//! - [`context`] - [`Authorizer`] and the request-scoped [`AuthContext`]
//! - [`config`] - typed configuration, loaded from `TOOLGATE_AUTH_*` variables
//! - [`environment`] - production detection for the static-table guard
//! - [`rate_limit`] - per-token sliding-window attempt limiter
//! - [`audit`] - structured audit events under the `audit::auth` target
//! - [`tower`] - Tower middleware (feature `middleware`)
//!
//! ## Quick Start
//!
//! ```rust
//! use toolgate_auth::{
//!     Authorizer, Environment, StaticConfig, StaticTokenEntry, Verifier, VerifierConfig,
//!     scope_set,
//! };
//!
//! # tokio_test::block_on(async {
//! let config = VerifierConfig::Static(StaticConfig::new().with_token(
//!     "dev-token-alice",
//!     StaticTokenEntry::new("alice", scope_set(["read:data"])),
//! ));
//! let verifier = Verifier::from_config(&config, &Environment::development())?;
//!
//! let result = verifier.verify("Bearer dev-token-alice").await?;
//! let context = Authorizer::new(scope_set(["read:data"])).authorize(&result)?;
//! assert_eq!(context.identity, "alice");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics` - verification counters and latency histograms via `metrics`
//! - `middleware` (alias `tower`) - [`tower::BearerAuthLayer`]
//! - `full` - all of the above
//!
//! ## Standards Compliance
//!
//! - **RFC 6750** - Bearer Token Usage (`WWW-Authenticate` challenges)
//! - **RFC 7517** - JSON Web Key (JWK)
//! - **RFC 7519** - JSON Web Token (JWT)
//! - **RFC 7662** - OAuth 2.0 Token Introspection

pub mod audit;
pub mod auth_metrics;
pub mod claims;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod introspection;
pub mod jwt;
pub mod rate_limit;
pub mod result;
pub mod secret;
pub mod static_tokens;
pub mod verifier;

mod singleflight;

#[cfg(feature = "middleware")]
pub mod tower;

#[doc(inline)]
pub use verifier::{Strategy, Verifier, strip_bearer};

#[doc(inline)]
pub use result::{AuthFailure, FailureKind, ValidationResult};

#[doc(inline)]
pub use claims::{ScopeSet, TokenClaims, parse_scopes, scope_set};

#[doc(inline)]
pub use context::{AuthContext, Authorizer};

#[doc(inline)]
pub use config::{
    AuthSettings, IntrospectionConfig, KeySource, SignatureConfig, StaticConfig, StaticTokenEntry,
    VerifierConfig, VerifierKind,
};

#[doc(inline)]
pub use environment::{Environment, Stage};

#[doc(inline)]
pub use error::{ConfigError, ConfigResult, FetchFailure, SystemError};

#[doc(inline)]
pub use secret::{ClientSecret, SigningSecret};

#[doc(inline)]
pub use rate_limit::{RateLimitConfig, RateLimitInfo, RateLimiter, TokenFingerprint};

#[doc(inline)]
pub use audit::{AuditLogger, AuthEvent};

#[doc(inline)]
pub use introspection::IntrospectionVerifier;
#[doc(inline)]
pub use jwt::{JwksClient, SignatureVerifier};
#[doc(inline)]
pub use static_tokens::StaticVerifier;

pub use auth_metrics::init_auth_metrics;
