//! OAuth 2.0 Token Introspection (RFC 7662)
//!
//! Opaque tokens are judged by the authorization server. Each verification
//! POSTs the token to the introspection endpoint, authenticating with HTTP
//! Basic client credentials; the token and the secret never appear in a URL.
//!
//! Checks on the response, in order:
//!
//! 1. `active` must be `true` (else `invalid_token`)
//! 2. `exp`, when present, must not be in the past (else `expired_token`)
//! 3. `nbf`, when present, must not be in the future (else `invalid_token`)
//! 4. optional `iss` / `aud` expectations (else `invalid_token`)
//! 5. `sub` or `client_id` must name the principal (else `invalid_token`)
//! 6. required scopes must be granted (else `insufficient_scope`)
//!
//! Concurrent introspection of the same token shares one HTTP call. Responses
//! are never cached: revocation takes effect on the next request.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use http::header::ACCEPT;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error};
use url::Url;

use crate::claims::{ScopeSet, TokenClaims, from_unix_seconds, parse_scopes};
use crate::config::IntrospectionConfig;
use crate::environment::Environment;
use crate::error::{ConfigError, ConfigResult, FetchFailure, SystemError};
use crate::result::{Judgement, Rejection};
use crate::secret::ClientSecret;
use crate::singleflight::SingleFlight;

/// Introspection request form per RFC 7662 Section 2.1
#[derive(Clone, Serialize)]
pub struct IntrospectionRequest<'a> {
    /// The token to introspect
    pub token: &'a str,
    /// Hint about the token type
    pub token_type_hint: &'a str,
}

impl fmt::Debug for IntrospectionRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrospectionRequest")
            .field("token", &"[REDACTED]")
            .field("token_type_hint", &self.token_type_hint)
            .finish()
    }
}

/// `aud` as a single string or an array
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// Single audience
    One(String),
    /// Several audiences
    Many(Vec<String>),
}

impl Audience {
    /// Whether `audience` is among the values
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::One(value) => value == audience,
            Self::Many(values) => values.iter().any(|v| v == audience),
        }
    }
}

/// `scope` as the RFC 7662 delimited string or an array of labels
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ScopeField {
    /// Space-delimited scopes
    Delimited(String),
    /// One scope per element
    List(Vec<String>),
}

impl ScopeField {
    /// Scopes as a set, empty labels dropped
    pub fn to_scope_set(&self) -> ScopeSet {
        match self {
            Self::Delimited(raw) => parse_scopes(raw),
            Self::List(list) => list.iter().filter(|s| !s.is_empty()).cloned().collect(),
        }
    }
}

/// Introspection response per RFC 7662 Section 2.2
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently active
    pub active: bool,
    /// Scopes, space-delimited or as an array
    #[serde(default)]
    pub scope: Option<ScopeField>,
    /// Client the token was issued to
    #[serde(default)]
    pub client_id: Option<String>,
    /// Human-readable resource owner
    #[serde(default)]
    pub username: Option<String>,
    /// Token type
    #[serde(default)]
    pub token_type: Option<String>,
    /// Expiry, seconds since epoch
    #[serde(default)]
    pub exp: Option<u64>,
    /// Issue time, seconds since epoch
    #[serde(default)]
    pub iat: Option<u64>,
    /// Not-before, seconds since epoch
    #[serde(default)]
    pub nbf: Option<u64>,
    /// Subject
    #[serde(default)]
    pub sub: Option<String>,
    /// Audience
    #[serde(default)]
    pub aud: Option<Audience>,
    /// Issuer
    #[serde(default)]
    pub iss: Option<String>,
    /// Token id
    #[serde(default)]
    pub jti: Option<String>,
}

/// Endpoint and credentials shared with in-flight requests
struct Endpoint {
    url: Url,
    client_id: String,
    client_secret: ClientSecret,
    token_type_hint: String,
    http_client: reqwest::Client,
}

impl Endpoint {
    async fn introspect(&self, token: &str) -> Result<IntrospectionResponse, FetchFailure> {
        let request = self
            .http_client
            .post(self.url.clone())
            .header(ACCEPT, "application/json")
            .form(&IntrospectionRequest {
                token,
                token_type_hint: &self.token_type_hint,
            });
        let request = self.client_secret.authenticate(&self.client_id, request);

        let response = request.send().await.map_err(|e| {
            let failure = FetchFailure::from_reqwest(&e);
            error!(endpoint = %self.url, failure = %failure, "Introspection request failed");
            failure
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(endpoint = %self.url, status = %status, "Introspection endpoint returned error status");
            return Err(FetchFailure::Status(status.as_u16()));
        }

        response.json().await.map_err(|e| {
            let failure = match FetchFailure::from_reqwest(&e) {
                FetchFailure::Timeout => FetchFailure::Timeout,
                _ => FetchFailure::Decode,
            };
            error!(endpoint = %self.url, failure = %failure, "Malformed introspection response");
            failure
        })
    }
}

/// Verifies tokens through an RFC 7662 introspection endpoint
pub struct IntrospectionVerifier {
    endpoint: Arc<Endpoint>,
    required_scopes: ScopeSet,
    expected_issuer: Option<String>,
    expected_audience: Option<String>,
    in_flight: SingleFlight<[u8; 32], IntrospectionResponse>,
}

impl fmt::Debug for IntrospectionVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrospectionVerifier")
            .field("endpoint", &self.endpoint.url.as_str())
            .field("client_id", &self.endpoint.client_id)
            .field("client_secret", &self.endpoint.client_secret)
            .field("required_scopes", &self.required_scopes)
            .field("expected_issuer", &self.expected_issuer)
            .field("expected_audience", &self.expected_audience)
            .finish()
    }
}

impl IntrospectionVerifier {
    /// Validate `config` and build the verifier
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] from [`IntrospectionConfig::validate`], or
    /// [`ConfigError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(config: &IntrospectionConfig, env: &Environment) -> ConfigResult<Self> {
        config.validate(env)?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            endpoint: Arc::new(Endpoint {
                url: config.endpoint.clone(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                token_type_hint: config.token_type_hint.clone(),
                http_client,
            }),
            required_scopes: config.required_scopes.clone(),
            expected_issuer: config.expected_issuer.clone(),
            expected_audience: config.expected_audience.clone(),
            in_flight: SingleFlight::new(),
        })
    }

    pub(crate) async fn verify(&self, token: &str) -> Result<Judgement, SystemError> {
        let key: [u8; 32] = Sha256::digest(token.as_bytes()).into();
        let endpoint = Arc::clone(&self.endpoint);
        let token = token.to_owned();

        let response = self
            .in_flight
            .run(key, move || async move {
                endpoint
                    .introspect(&token)
                    .await
                    .map_err(SystemError::IntrospectionUnavailable)
            })
            .await?;

        debug!(active = response.active, "Introspection response received");
        Ok(self.judge(response, SystemTime::now()))
    }

    fn judge(&self, response: IntrospectionResponse, now: SystemTime) -> Judgement {
        if !response.active {
            return Err(Rejection::invalid("token is not active"));
        }

        let expires_at = timestamp(response.exp, "exp")?;
        if expires_at.is_some_and(|exp| exp <= now) {
            return Err(Rejection::expired("token expired"));
        }
        if timestamp(response.nbf, "nbf")?.is_some_and(|nbf| nbf > now) {
            return Err(Rejection::invalid("token not yet valid"));
        }
        let issued_at = timestamp(response.iat, "iat")?;

        if let Some(expected) = &self.expected_issuer
            && response.iss.as_deref() != Some(expected.as_str())
        {
            return Err(Rejection::invalid("issuer mismatch"));
        }
        if let Some(expected) = &self.expected_audience
            && !response.aud.as_ref().is_some_and(|aud| aud.contains(expected))
        {
            return Err(Rejection::invalid("audience mismatch"));
        }

        let claims = TokenClaims {
            subject: response.sub.filter(|s| !s.is_empty()),
            client_id: response.client_id.filter(|s| !s.is_empty()),
            scopes: response
                .scope
                .as_ref()
                .map(ScopeField::to_scope_set)
                .unwrap_or_default(),
            expires_at,
            issued_at,
        };
        if claims.identity().is_none() {
            return Err(Rejection::invalid("response names neither sub nor client_id"));
        }

        if !claims.satisfies(&self.required_scopes) {
            return Err(Rejection::insufficient_scope(
                &claims.missing_scopes(&self.required_scopes),
            ));
        }
        Ok(claims)
    }
}

fn timestamp(secs: Option<u64>, field: &str) -> Result<Option<SystemTime>, Rejection> {
    secs.map(|secs| {
        from_unix_seconds(secs)
            .ok_or_else(|| Rejection::invalid(format!("{field} is out of range")))
    })
    .transpose()
}
