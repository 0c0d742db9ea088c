//! Signature-based token verification
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────┐
//! │       SignatureVerifier        │
//! │  - header alg pinning          │
//! │  - exp / nbf / iss / aud       │
//! │  - scope / scp mapping         │
//! └───────────────┬────────────────┘
//!                 │ key lookup
//!        ┌────────┴─────────┐
//!        │                  │
//! ┌──────┴──────┐    ┌──────┴──────┐
//! │ JwksClient  │    │ static key  │
//! │ TTL cache   │    │ PEM/secret  │
//! └─────────────┘    └─────────────┘
//! ```
//!
//! The configured algorithm is the only algorithm ever used to verify a
//! signature. A token's header can reject itself, never choose its key type.

pub mod jwks;
pub mod validator;

pub use jwks::JwksClient;
pub use validator::SignatureVerifier;

use jsonwebtoken::Algorithm;

use crate::error::{ConfigError, ConfigResult};

/// Key material family an algorithm verifies with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    /// HMAC shared secret
    Symmetric,
    /// RSA public key (RS*, PS*)
    Rsa,
    /// NIST curve public key (ES*)
    EllipticCurve,
    /// Ed25519 public key
    Edwards,
}

impl KeyFamily {
    /// Whether this family uses public key material
    pub fn is_asymmetric(self) -> bool {
        self != Self::Symmetric
    }
}

/// Every algorithm accepted in configuration
pub const SUPPORTED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
    Algorithm::HS256,
    Algorithm::HS384,
    Algorithm::HS512,
];

/// Parse an algorithm name against the whitelist
///
/// Matching is case-insensitive. `none` and anything outside
/// [`SUPPORTED_ALGORITHMS`] is refused.
///
/// # Errors
///
/// [`ConfigError::UnsupportedAlgorithm`] for unknown names.
pub fn parse_algorithm(name: &str) -> ConfigResult<Algorithm> {
    let algorithm = match name.trim().to_ascii_uppercase().as_str() {
        "RS256" => Algorithm::RS256,
        "RS384" => Algorithm::RS384,
        "RS512" => Algorithm::RS512,
        "PS256" => Algorithm::PS256,
        "PS384" => Algorithm::PS384,
        "PS512" => Algorithm::PS512,
        "ES256" => Algorithm::ES256,
        "ES384" => Algorithm::ES384,
        "EDDSA" => Algorithm::EdDSA,
        "HS256" => Algorithm::HS256,
        "HS384" => Algorithm::HS384,
        "HS512" => Algorithm::HS512,
        _ => return Err(ConfigError::UnsupportedAlgorithm(name.trim().to_string())),
    };
    Ok(algorithm)
}

/// Canonical name of an algorithm
pub fn algorithm_name(algorithm: Algorithm) -> &'static str {
    match algorithm {
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        Algorithm::PS256 => "PS256",
        Algorithm::PS384 => "PS384",
        Algorithm::PS512 => "PS512",
        Algorithm::ES256 => "ES256",
        Algorithm::ES384 => "ES384",
        Algorithm::EdDSA => "EdDSA",
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
    }
}

/// Key family for an algorithm
pub fn key_family(algorithm: Algorithm) -> KeyFamily {
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => KeyFamily::Symmetric,
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => KeyFamily::Rsa,
        Algorithm::ES256 | Algorithm::ES384 => KeyFamily::EllipticCurve,
        Algorithm::EdDSA => KeyFamily::Edwards,
    }
}

/// Minimum shared-secret length for an HMAC algorithm: its digest size
pub fn min_secret_len(algorithm: Algorithm) -> Option<usize> {
    match algorithm {
        Algorithm::HS256 => Some(32),
        Algorithm::HS384 => Some(48),
        Algorithm::HS512 => Some(64),
        _ => None,
    }
}
