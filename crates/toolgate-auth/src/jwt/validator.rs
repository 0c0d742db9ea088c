//! JWT signature verification
//!
//! Steps, each short-circuiting:
//!
//! 0. header `alg` must equal the configured algorithm
//! 1. resolve the key (JWKS by `kid`, or the configured static key)
//! 2. verify the signature with the configured algorithm only
//! 3. `exp` required and in the future (with clock skew); `nbf` honored
//! 4. `iss` equals the configured issuer
//! 5. `aud` contains the configured audience
//! 6. map `sub`, `scope` / `scp`, `exp`, `iat` into [`TokenClaims`]
//! 7. required scopes are a subset of the token scopes
//!
//! Steps 0-6 reject as `invalid_token`; step 7 as `insufficient_scope`.

use std::fmt;
use std::time::SystemTime;

use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tracing::debug;

use super::{JwksClient, KeyFamily, algorithm_name, key_family};
use crate::claims::{ScopeSet, TokenClaims, from_unix_seconds, parse_scopes};
use crate::config::{KeySource, SignatureConfig};
use crate::environment::Environment;
use crate::error::{ConfigError, ConfigResult, SystemError};
use crate::result::{Judgement, Rejection};

enum KeyResolver {
    Jwks(JwksClient),
    Fixed(DecodingKey),
}

/// Verifies signed tokens against one configured algorithm and key source
///
/// # Example
///
/// ```rust,no_run
/// use jsonwebtoken::Algorithm;
/// use toolgate_auth::{Environment, KeySource, SignatureConfig};
/// use toolgate_auth::jwt::SignatureVerifier;
///
/// let config = SignatureConfig::new(
///     KeySource::jwks(url::Url::parse("https://auth.example.com/jwks")?),
///     Algorithm::RS256,
///     "https://auth.example.com",
///     "https://tools.example.com",
/// );
/// let verifier = SignatureVerifier::new(&config, &Environment::from_env())?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct SignatureVerifier {
    algorithm: Algorithm,
    family: KeyFamily,
    keys: KeyResolver,
    validation: Validation,
    issuer: String,
    audience: String,
    required_scopes: ScopeSet,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = match &self.keys {
            KeyResolver::Jwks(client) => format!("{client:?}"),
            KeyResolver::Fixed(_) => "<fixed key>".to_string(),
        };
        f.debug_struct("SignatureVerifier")
            .field("algorithm", &algorithm_name(self.algorithm))
            .field("keys", &keys)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("leeway_secs", &self.validation.leeway)
            .field("required_scopes", &self.required_scopes)
            .finish()
    }
}

impl SignatureVerifier {
    /// Validate `config` and build the verifier
    ///
    /// No network call is made; a JWKS source is fetched on first use.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] from [`SignatureConfig::validate`], or
    /// [`ConfigError::InvalidKey`] if PEM key material cannot be parsed for the
    /// configured algorithm.
    pub fn new(config: &SignatureConfig, env: &Environment) -> ConfigResult<Self> {
        config.validate(env)?;

        let family = key_family(config.algorithm);
        let keys = match &config.key_source {
            KeySource::Jwks {
                url,
                cache_ttl,
                fetch_timeout,
            } => KeyResolver::Jwks(JwksClient::new(url.clone(), *cache_ttl, *fetch_timeout)?),
            KeySource::PublicKeyPem(pem) => KeyResolver::Fixed(decoding_key_from_pem(pem, family)?),
            KeySource::SharedSecret(secret) => KeyResolver::Fixed(secret.decoding_key()),
        };

        let mut validation = Validation::new(config.algorithm);
        validation.leeway = config.clock_skew.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);

        Ok(Self {
            algorithm: config.algorithm,
            family,
            keys,
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            required_scopes: config.required_scopes.clone(),
        })
    }

    /// Configured algorithm
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The JWKS client, when keys come from a key set
    pub fn jwks_client(&self) -> Option<&JwksClient> {
        match &self.keys {
            KeyResolver::Jwks(client) => Some(client),
            KeyResolver::Fixed(_) => None,
        }
    }

    pub(crate) async fn verify(&self, token: &str) -> Result<Judgement, SystemError> {
        let Ok(header) = decode_header(token) else {
            return Ok(Err(Rejection::invalid("malformed token header")));
        };

        if header.alg != self.algorithm {
            return Ok(Err(Rejection::invalid(format!(
                "header algorithm {} differs from configured {}",
                algorithm_name(header.alg),
                algorithm_name(self.algorithm)
            ))));
        }

        let resolved;
        let key = match &self.keys {
            KeyResolver::Fixed(key) => key,
            KeyResolver::Jwks(client) => {
                let kid = header.kid.as_deref();
                let Some(jwk) = client.resolve(kid, self.family).await? else {
                    let reason = match kid {
                        Some(_) => "no key in the key set matches the token kid",
                        None => "token has no kid and the key set does not hold exactly one signing key",
                    };
                    return Ok(Err(Rejection::invalid(reason)));
                };
                let Ok(key) = DecodingKey::from_jwk(&jwk) else {
                    return Ok(Err(Rejection::invalid("matching key set entry is unusable")));
                };
                resolved = key;
                &resolved
            }
        };

        let data = match decode::<RawClaims>(token, key, &self.validation) {
            Ok(data) => data,
            Err(err) => return Ok(Err(Rejection::invalid(describe(&err)))),
        };

        let claims = match data.claims.into_token_claims() {
            Ok(claims) => claims,
            Err(rejection) => return Ok(Err(rejection)),
        };

        if !claims.satisfies(&self.required_scopes) {
            return Ok(Err(Rejection::insufficient_scope(
                &claims.missing_scopes(&self.required_scopes),
            )));
        }

        debug!(
            algorithm = algorithm_name(self.algorithm),
            kid = ?header.kid,
            "JWT verified"
        );
        Ok(Ok(claims))
    }
}

fn decoding_key_from_pem(pem: &[u8], family: KeyFamily) -> ConfigResult<DecodingKey> {
    let key = match family {
        KeyFamily::Rsa => DecodingKey::from_rsa_pem(pem),
        KeyFamily::EllipticCurve => DecodingKey::from_ec_pem(pem),
        KeyFamily::Edwards => DecodingKey::from_ed_pem(pem),
        KeyFamily::Symmetric => {
            return Err(ConfigError::AlgorithmKeyMismatch {
                algorithm: "HMAC".to_string(),
                key_source: "public key",
            });
        }
    };
    key.map_err(|e| ConfigError::InvalidKey(format!("public key does not parse: {e}")))
}

fn describe(err: &JwtError) -> String {
    match err.kind() {
        ErrorKind::InvalidSignature => "signature verification failed".to_string(),
        ErrorKind::ExpiredSignature => "token expired".to_string(),
        ErrorKind::ImmatureSignature => "token not yet valid".to_string(),
        ErrorKind::InvalidIssuer => "issuer mismatch".to_string(),
        ErrorKind::InvalidAudience => "audience mismatch".to_string(),
        ErrorKind::InvalidAlgorithm => "algorithm not accepted for this key".to_string(),
        ErrorKind::MissingRequiredClaim(claim) => format!("missing required claim {claim}"),
        ErrorKind::Json(_) => "claims could not be decoded".to_string(),
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => {
            "malformed token".to_string()
        }
        _ => "token rejected".to_string(),
    }
}

/// `scope` is a delimited string; `scp` is usually an array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScopeClaim {
    Delimited(String),
    List(Vec<String>),
}

impl ScopeClaim {
    fn extend_into(self, scopes: &mut ScopeSet) {
        match self {
            Self::Delimited(raw) => scopes.extend(parse_scopes(&raw)),
            Self::List(list) => scopes.extend(list.into_iter().filter(|s| !s.is_empty())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    scope: Option<ScopeClaim>,
    #[serde(default)]
    scp: Option<ScopeClaim>,
    #[serde(default)]
    exp: Option<u64>,
    #[serde(default)]
    iat: Option<u64>,
}

impl RawClaims {
    fn into_token_claims(self) -> Result<TokenClaims, Rejection> {
        let Some(subject) = self.sub.filter(|s| !s.trim().is_empty()) else {
            return Err(Rejection::invalid("subject is empty"));
        };

        let mut scopes = ScopeSet::new();
        if let Some(scope) = self.scope {
            scope.extend_into(&mut scopes);
        }
        if let Some(scp) = self.scp {
            scp.extend_into(&mut scopes);
        }

        Ok(TokenClaims {
            subject: Some(subject),
            client_id: self.client_id,
            scopes,
            expires_at: timestamp(self.exp, "exp")?,
            issued_at: timestamp(self.iat, "iat")?,
        })
    }
}

fn timestamp(secs: Option<u64>, claim: &str) -> Result<Option<SystemTime>, Rejection> {
    secs.map(|secs| {
        from_unix_seconds(secs)
            .ok_or_else(|| Rejection::invalid(format!("{claim} claim is out of range")))
    })
    .transpose()
}
