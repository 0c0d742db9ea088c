//! Write-only wrappers for credential material
//!
//! Neither type implements `Display` or `Serialize`, and both render as
//! `[REDACTED]` under `Debug`. The only way to use the value is the
//! crate-internal operation that consumes it for an authenticated call or a
//! signature check.

use std::fmt;

use jsonwebtoken::DecodingKey;
use secrecy::{ExposeSecret, SecretString, SecretVec};
use serde::{Deserialize, Deserializer};

/// Client secret for authenticating to the introspection endpoint
#[derive(Clone)]
pub struct ClientSecret(SecretString);

impl ClientSecret {
    /// Wrap a secret value
    pub fn new(secret: impl Into<String>) -> Self {
        Self(SecretString::new(secret.into()))
    }

    /// Attach HTTP Basic client credentials (RFC 6749 Section 2.3.1)
    pub(crate) fn authenticate(
        &self,
        client_id: &str,
        request: reqwest::RequestBuilder,
    ) -> reqwest::RequestBuilder {
        request.basic_auth(client_id, Some(self.0.expose_secret()))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientSecret([REDACTED])")
    }
}

impl<'de> Deserialize<'de> for ClientSecret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Shared secret for HMAC-signed tokens
pub struct SigningSecret(SecretVec<u8>);

impl Clone for SigningSecret {
    fn clone(&self) -> Self {
        Self::new(self.0.expose_secret().clone())
    }
}

impl SigningSecret {
    /// Wrap raw secret bytes
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(SecretVec::new(secret.into()))
    }

    /// Secret length in bytes (used for weak-key checks)
    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    /// Whether the secret is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.0.expose_secret())
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret([REDACTED])")
    }
}

impl<'de> Deserialize<'de> for SigningSecret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(|s| Self::new(s.into_bytes()))
    }
}
