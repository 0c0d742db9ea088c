//! Verifier configuration
//!
//! Exactly one [`VerifierConfig`] variant is active per server instance. Every
//! variant is validated once, before the verifier exists; a rejected
//! configuration is fatal and no request is ever served with it.
//!
//! Settings come from code (builder methods), from `serde` (any format the host
//! already parses), or from the process environment through
//! [`AuthSettings::from_env`]:
//!
//! ```text
//! TOOLGATE_AUTH_VERIFIER=jwt
//! TOOLGATE_AUTH_JWKS_URL=https://auth.example.com/.well-known/jwks.json
//! TOOLGATE_AUTH_JWT_ALGORITHM=ES256
//! TOOLGATE_AUTH_ISSUER=https://auth.example.com
//! TOOLGATE_AUTH_AUDIENCE=https://tools.example.com
//! TOOLGATE_AUTH_REQUIRED_SCOPES=tools:invoke
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Deserializer};
use url::Url;

use crate::claims::{ScopeSet, parse_scopes};
use crate::audit::AuditLogger;
use crate::environment::Environment;
use crate::error::{ConfigError, ConfigResult};
use crate::jwt::{self, KeyFamily};
use crate::rate_limit::RateLimitConfig;
use crate::secret::{ClientSecret, SigningSecret};

/// Verifier strategy selector
pub const VERIFIER_VAR: &str = "TOOLGATE_AUTH_VERIFIER";
/// Key set URL (jwt)
pub const JWKS_URL_VAR: &str = "TOOLGATE_AUTH_JWKS_URL";
/// PEM public key (jwt)
pub const PUBLIC_KEY_VAR: &str = "TOOLGATE_AUTH_JWT_PUBLIC_KEY";
/// Shared secret (jwt, HS*)
pub const SHARED_SECRET_VAR: &str = "TOOLGATE_AUTH_JWT_SECRET";
/// Signature algorithm (jwt)
pub const ALGORITHM_VAR: &str = "TOOLGATE_AUTH_JWT_ALGORITHM";
/// Expected issuer
pub const ISSUER_VAR: &str = "TOOLGATE_AUTH_ISSUER";
/// Expected audience
pub const AUDIENCE_VAR: &str = "TOOLGATE_AUTH_AUDIENCE";
/// Clock-skew tolerance in seconds
pub const CLOCK_SKEW_VAR: &str = "TOOLGATE_AUTH_CLOCK_SKEW_SECS";
/// Key set cache lifetime in seconds
pub const JWKS_CACHE_TTL_VAR: &str = "TOOLGATE_AUTH_JWKS_CACHE_TTL_SECS";
/// Network timeout in seconds (key set fetch and introspection)
pub const FETCH_TIMEOUT_VAR: &str = "TOOLGATE_AUTH_FETCH_TIMEOUT_SECS";
/// Introspection endpoint
pub const INTROSPECTION_URL_VAR: &str = "TOOLGATE_AUTH_INTROSPECTION_URL";
/// Introspection client id
pub const CLIENT_ID_VAR: &str = "TOOLGATE_AUTH_CLIENT_ID";
/// Introspection client secret
pub const CLIENT_SECRET_VAR: &str = "TOOLGATE_AUTH_CLIENT_SECRET";
/// Static token table as JSON
pub const STATIC_TOKENS_VAR: &str = "TOOLGATE_AUTH_STATIC_TOKENS";
/// Scopes every token must carry for this verifier
pub const REQUIRED_SCOPES_VAR: &str = "TOOLGATE_AUTH_REQUIRED_SCOPES";
/// Server-wide minimum scopes applied by the authorizer
pub const MIN_SCOPES_VAR: &str = "TOOLGATE_AUTH_MIN_SCOPES";
/// Attempts per window (0 disables limiting)
pub const RATE_LIMIT_VAR: &str = "TOOLGATE_AUTH_RATE_LIMIT";
/// Rate limit window in seconds
pub const RATE_WINDOW_VAR: &str = "TOOLGATE_AUTH_RATE_WINDOW_SECS";
/// Service name attached to audit events
pub const SERVICE_NAME_VAR: &str = "TOOLGATE_AUTH_SERVICE_NAME";
/// Log principal identities as BLAKE3 digests in audit events
pub const AUDIT_HASH_IDENTITIES_VAR: &str = "TOOLGATE_AUTH_AUDIT_HASH_IDENTITIES";

/// Default clock-skew tolerance
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);
/// Hard upper bound on clock-skew tolerance
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(120);
/// Default network timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound on any network timeout
pub const MAX_FETCH_TIMEOUT: Duration = Duration::from_secs(60);
/// Default `token_type_hint` sent to the introspection endpoint
pub const DEFAULT_TOKEN_TYPE_HINT: &str = "access_token";

const MIN_FETCH_TIMEOUT: Duration = Duration::from_secs(1);

/// Verifier strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerifierKind {
    /// Locally verified signed tokens
    Signature,
    /// Remote RFC 7662 introspection
    Introspection,
    /// Fixed development table
    Static,
}

impl VerifierKind {
    /// Name used in configuration, logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signature => "jwt",
            Self::Introspection => "introspection",
            Self::Static => "static",
        }
    }
}

impl fmt::Display for VerifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerifierKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jwt" | "signature" => Ok(Self::Signature),
            "introspection" => Ok(Self::Introspection),
            "static" => Ok(Self::Static),
            other => Err(ConfigError::InvalidSetting {
                setting: VERIFIER_VAR,
                reason: format!("unknown verifier {other:?} (expected jwt, introspection or static)"),
            }),
        }
    }
}

/// Where signature verification keys come from
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// Remote key set, cached
    Jwks {
        /// Key set URL
        url: Url,
        /// Cache lifetime
        #[serde(default = "default_jwks_cache_ttl", with = "duration_secs")]
        cache_ttl: Duration,
        /// Fetch timeout
        #[serde(default = "default_fetch_timeout", with = "duration_secs")]
        fetch_timeout: Duration,
    },
    /// A single PEM-encoded public key
    #[serde(deserialize_with = "pem_bytes")]
    PublicKeyPem(Vec<u8>),
    /// HMAC shared secret
    SharedSecret(SigningSecret),
}

impl KeySource {
    /// JWKS source with default cache lifetime and timeout
    pub fn jwks(url: Url) -> Self {
        Self::Jwks {
            url,
            cache_ttl: jwt::jwks::DEFAULT_CACHE_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Jwks { .. } => "JWKS",
            Self::PublicKeyPem(_) => "public key",
            Self::SharedSecret(_) => "shared secret",
        }
    }
}

/// Signature-based (JWT) verifier configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureConfig {
    /// Verification key material
    pub key_source: KeySource,
    /// The one algorithm tokens must be signed with
    #[serde(deserialize_with = "algorithm_from_name")]
    pub algorithm: Algorithm,
    /// Expected `iss`
    pub issuer: String,
    /// Expected member of `aud`
    pub audience: String,
    /// Scopes every token must carry
    #[serde(default, deserialize_with = "scope_list")]
    pub required_scopes: ScopeSet,
    /// Tolerance applied to `exp` and `nbf`
    #[serde(default = "default_clock_skew", with = "duration_secs")]
    pub clock_skew: Duration,
}

impl SignatureConfig {
    /// Configuration with default skew and no required scopes
    pub fn new(
        key_source: KeySource,
        algorithm: Algorithm,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            key_source,
            algorithm,
            issuer: issuer.into(),
            audience: audience.into(),
            required_scopes: ScopeSet::new(),
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }

    /// Require scopes on every token
    #[must_use]
    pub fn with_required_scopes(mut self, scopes: ScopeSet) -> Self {
        self.required_scopes = scopes;
        self
    }

    /// Set the clock-skew tolerance
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Check the configuration against the deployment environment
    ///
    /// # Errors
    ///
    /// - [`ConfigError::AlgorithmKeyMismatch`] when the algorithm's key family
    ///   does not match the key source
    /// - [`ConfigError::WeakKey`] for a shared secret shorter than the digest
    /// - [`ConfigError::ClockSkewTooLarge`] above [`MAX_CLOCK_SKEW`]
    /// - [`ConfigError::InsecureEndpoint`] / [`ConfigError::InvalidTimeout`]
    ///   for a JWKS source
    pub fn validate(&self, env: &Environment) -> ConfigResult<()> {
        let family = jwt::key_family(self.algorithm);
        let algorithm = jwt::algorithm_name(self.algorithm);

        let compatible = match &self.key_source {
            KeySource::Jwks { .. } | KeySource::PublicKeyPem(_) => family.is_asymmetric(),
            KeySource::SharedSecret(_) => family == KeyFamily::Symmetric,
        };
        if !compatible {
            return Err(ConfigError::AlgorithmKeyMismatch {
                algorithm: algorithm.to_string(),
                key_source: self.key_source.describe(),
            });
        }

        match &self.key_source {
            KeySource::Jwks {
                url,
                cache_ttl,
                fetch_timeout,
            } => {
                check_endpoint(url, JWKS_URL_VAR, env)?;
                check_timeout(*fetch_timeout, FETCH_TIMEOUT_VAR)?;
                if cache_ttl.is_zero() {
                    return Err(ConfigError::InvalidSetting {
                        setting: JWKS_CACHE_TTL_VAR,
                        reason: "must be greater than zero".to_string(),
                    });
                }
            }
            KeySource::PublicKeyPem(pem) => {
                if pem.iter().all(u8::is_ascii_whitespace) {
                    return Err(ConfigError::InvalidKey("public key is empty".to_string()));
                }
            }
            KeySource::SharedSecret(secret) => {
                let min_bytes = jwt::min_secret_len(self.algorithm).unwrap_or(0);
                if secret.len() < min_bytes {
                    return Err(ConfigError::WeakKey {
                        algorithm: algorithm.to_string(),
                        min_bytes,
                        actual_bytes: secret.len(),
                    });
                }
            }
        }

        if self.issuer.trim().is_empty() {
            return Err(ConfigError::MissingSetting(ISSUER_VAR));
        }
        if self.audience.trim().is_empty() {
            return Err(ConfigError::MissingSetting(AUDIENCE_VAR));
        }
        if self.clock_skew > MAX_CLOCK_SKEW {
            return Err(ConfigError::ClockSkewTooLarge {
                requested_secs: self.clock_skew.as_secs(),
                max_secs: MAX_CLOCK_SKEW.as_secs(),
            });
        }
        Ok(())
    }
}

/// Introspection (RFC 7662) verifier configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectionConfig {
    /// Introspection endpoint
    pub endpoint: Url,
    /// Client id for HTTP Basic authentication
    pub client_id: String,
    /// Client secret for HTTP Basic authentication
    pub client_secret: ClientSecret,
    /// Request timeout
    #[serde(default = "default_fetch_timeout", with = "duration_secs")]
    pub timeout: Duration,
    /// Scopes every token must carry
    #[serde(default, deserialize_with = "scope_list")]
    pub required_scopes: ScopeSet,
    /// When set, the response `iss` must equal it
    #[serde(default)]
    pub expected_issuer: Option<String>,
    /// When set, the response `aud` must contain it
    #[serde(default)]
    pub expected_audience: Option<String>,
    /// `token_type_hint` form parameter
    #[serde(default = "default_token_type_hint")]
    pub token_type_hint: String,
}

impl IntrospectionConfig {
    /// Configuration with the default timeout and no extra checks
    pub fn new(endpoint: Url, client_id: impl Into<String>, client_secret: ClientSecret) -> Self {
        Self {
            endpoint,
            client_id: client_id.into(),
            client_secret,
            timeout: DEFAULT_FETCH_TIMEOUT,
            required_scopes: ScopeSet::new(),
            expected_issuer: None,
            expected_audience: None,
            token_type_hint: DEFAULT_TOKEN_TYPE_HINT.to_string(),
        }
    }

    /// Set the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Require scopes on every token
    #[must_use]
    pub fn with_required_scopes(mut self, scopes: ScopeSet) -> Self {
        self.required_scopes = scopes;
        self
    }

    /// Require the response to name this issuer
    #[must_use]
    pub fn with_expected_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    /// Require the response audience to contain this value
    #[must_use]
    pub fn with_expected_audience(mut self, audience: impl Into<String>) -> Self {
        self.expected_audience = Some(audience.into());
        self
    }

    /// Check the configuration against the deployment environment
    ///
    /// # Errors
    ///
    /// [`ConfigError::InsecureEndpoint`], [`ConfigError::InvalidTimeout`] or
    /// [`ConfigError::MissingSetting`] for absent client credentials.
    pub fn validate(&self, env: &Environment) -> ConfigResult<()> {
        check_endpoint(&self.endpoint, INTROSPECTION_URL_VAR, env)?;
        check_timeout(self.timeout, FETCH_TIMEOUT_VAR)?;
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::MissingSetting(CLIENT_ID_VAR));
        }
        if self.client_secret.is_empty() {
            return Err(ConfigError::MissingSetting(CLIENT_SECRET_VAR));
        }
        if self.token_type_hint.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                setting: "token_type_hint",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// One entry of the static token table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StaticTokenEntry {
    /// Principal the token stands for
    pub identity: String,
    /// Scopes granted to the token
    #[serde(default, deserialize_with = "scope_list")]
    pub scopes: ScopeSet,
}

impl StaticTokenEntry {
    /// Entry for `identity` with `scopes`
    pub fn new(identity: impl Into<String>, scopes: ScopeSet) -> Self {
        Self {
            identity: identity.into(),
            scopes,
        }
    }
}

/// Static table verifier configuration (development only)
#[derive(Clone, Default, Deserialize)]
pub struct StaticConfig {
    /// Raw token to entry
    pub tokens: HashMap<String, StaticTokenEntry>,
    /// Scopes every token must carry
    #[serde(default, deserialize_with = "scope_list")]
    pub required_scopes: ScopeSet,
}

impl fmt::Debug for StaticConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticConfig")
            .field("tokens", &format_args!("[{} REDACTED]", self.tokens.len()))
            .field("required_scopes", &self.required_scopes)
            .finish()
    }
}

impl StaticConfig {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a token
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, entry: StaticTokenEntry) -> Self {
        self.tokens.insert(token.into(), entry);
        self
    }

    /// Require scopes on every token
    #[must_use]
    pub fn with_required_scopes(mut self, scopes: ScopeSet) -> Self {
        self.required_scopes = scopes;
        self
    }

    /// Check the table and the deployment environment
    ///
    /// # Errors
    ///
    /// [`ConfigError::ProductionContext`] or
    /// [`ConfigError::UndeclaredDevelopment`] outside declared development;
    /// [`ConfigError::MissingSetting`] / [`ConfigError::InvalidSetting`] for an
    /// empty or malformed table.
    pub fn validate(&self, env: &Environment) -> ConfigResult<()> {
        env.ensure_non_production()?;

        if self.tokens.is_empty() {
            return Err(ConfigError::MissingSetting(STATIC_TOKENS_VAR));
        }
        for (token, entry) in &self.tokens {
            if token.trim().is_empty() {
                return Err(ConfigError::InvalidSetting {
                    setting: STATIC_TOKENS_VAR,
                    reason: "tokens must not be empty".to_string(),
                });
            }
            if entry.identity.trim().is_empty() {
                return Err(ConfigError::InvalidSetting {
                    setting: STATIC_TOKENS_VAR,
                    reason: "every token needs a non-empty identity".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// The active verification strategy
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "verifier", rename_all = "snake_case")]
pub enum VerifierConfig {
    /// Locally verified signed tokens
    #[serde(rename = "jwt")]
    Signature(SignatureConfig),
    /// Remote introspection
    Introspection(IntrospectionConfig),
    /// Fixed development table
    Static(StaticConfig),
}

impl VerifierConfig {
    /// Strategy of this configuration
    pub fn kind(&self) -> VerifierKind {
        match self {
            Self::Signature(_) => VerifierKind::Signature,
            Self::Introspection(_) => VerifierKind::Introspection,
            Self::Static(_) => VerifierKind::Static,
        }
    }

    /// Scopes every token must carry for this strategy
    pub fn required_scopes(&self) -> &ScopeSet {
        match self {
            Self::Signature(config) => &config.required_scopes,
            Self::Introspection(config) => &config.required_scopes,
            Self::Static(config) => &config.required_scopes,
        }
    }

    /// Validate the active variant
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] raised by the variant's own validation.
    pub fn validate(&self, env: &Environment) -> ConfigResult<()> {
        match self {
            Self::Signature(config) => config.validate(env),
            Self::Introspection(config) => config.validate(env),
            Self::Static(config) => config.validate(env),
        }
    }
}

/// Everything the host needs to build its verifier and authorizer
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// Active strategy
    #[serde(flatten)]
    pub verifier: VerifierConfig,
    /// Server-wide minimum scopes, applied after verification
    #[serde(default, deserialize_with = "scope_list")]
    pub min_scopes: ScopeSet,
    /// Per-token attempt limit
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Service name for audit events
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Hash identities before they reach audit events
    #[serde(default)]
    pub hash_identities: bool,
}

impl AuthSettings {
    /// Settings around a verifier configuration, with default limits
    pub fn new(verifier: VerifierConfig) -> Self {
        Self {
            verifier,
            min_scopes: ScopeSet::new(),
            rate_limit: RateLimitConfig::default(),
            service_name: default_service_name(),
            hash_identities: false,
        }
    }

    /// Hash identities in audit events
    #[must_use]
    pub fn with_hashed_identities(mut self, hash: bool) -> Self {
        self.hash_identities = hash;
        self
    }

    /// Audit logger for the verifier and authorizer built from these settings
    pub fn audit_logger(&self) -> AuditLogger {
        AuditLogger::new(self.service_name.clone()).with_identifier_hashing(self.hash_identities)
    }

    /// Set the server-wide minimum scopes
    #[must_use]
    pub fn with_min_scopes(mut self, scopes: ScopeSet) -> Self {
        self.min_scopes = scopes;
        self
    }

    /// Set the rate limit policy
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Load and validate settings from the process environment
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use toolgate_auth::AuthSettings;
    ///
    /// let settings = AuthSettings::from_env().expect("invalid auth configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`]; the server must not start.
    pub fn from_env() -> ConfigResult<Self> {
        let settings = Self::from_lookup(|name| std::env::var(name).ok())?;
        settings.validate(&Environment::from_env())?;
        Ok(settings)
    }

    /// Parse settings through an arbitrary variable lookup
    ///
    /// Only parses; call [`AuthSettings::validate`] before use.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] for missing or unparseable settings.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };
        let kind: VerifierKind = vars.require(VERIFIER_VAR)?.parse()?;
        let required_scopes = vars.scopes(REQUIRED_SCOPES_VAR);
        let fetch_timeout = vars.secs(FETCH_TIMEOUT_VAR, DEFAULT_FETCH_TIMEOUT)?;

        let verifier = match kind {
            VerifierKind::Signature => {
                let key_source = signature_key_source(&vars, fetch_timeout)?;
                let algorithm = match vars.get(ALGORITHM_VAR) {
                    Some(name) => jwt::parse_algorithm(&name)?,
                    None => Algorithm::RS256,
                };
                let config = SignatureConfig::new(
                    key_source,
                    algorithm,
                    vars.require(ISSUER_VAR)?,
                    vars.require(AUDIENCE_VAR)?,
                )
                .with_required_scopes(required_scopes)
                .with_clock_skew(vars.secs(CLOCK_SKEW_VAR, DEFAULT_CLOCK_SKEW)?);
                VerifierConfig::Signature(config)
            }
            VerifierKind::Introspection => {
                let secret = vars
                    .get_raw(CLIENT_SECRET_VAR)
                    .ok_or(ConfigError::MissingSetting(CLIENT_SECRET_VAR))?;
                let mut config = IntrospectionConfig::new(
                    vars.url(INTROSPECTION_URL_VAR)?,
                    vars.require(CLIENT_ID_VAR)?,
                    ClientSecret::new(secret),
                )
                .with_timeout(fetch_timeout)
                .with_required_scopes(required_scopes);
                config.expected_issuer = vars.get(ISSUER_VAR);
                config.expected_audience = vars.get(AUDIENCE_VAR);
                VerifierConfig::Introspection(config)
            }
            VerifierKind::Static => {
                let raw = vars
                    .get_raw(STATIC_TOKENS_VAR)
                    .ok_or(ConfigError::MissingSetting(STATIC_TOKENS_VAR))?;
                // serde_json errors can quote input; keep only the position
                let tokens: HashMap<String, StaticTokenEntry> = serde_json::from_str(&raw)
                    .map_err(|e| ConfigError::InvalidSetting {
                        setting: STATIC_TOKENS_VAR,
                        reason: format!(
                            "expected a JSON object of {{token: {{identity, scopes}}}} (line {}, column {})",
                            e.line(),
                            e.column()
                        ),
                    })?;
                VerifierConfig::Static(StaticConfig {
                    tokens,
                    required_scopes,
                })
            }
        };

        let rate_limit = match vars.parse::<u32>(RATE_LIMIT_VAR)? {
            Some(0) => RateLimitConfig::disabled(),
            Some(max_attempts) => RateLimitConfig::new(
                max_attempts,
                vars.secs(RATE_WINDOW_VAR, crate::rate_limit::DEFAULT_WINDOW)?,
            ),
            None => RateLimitConfig {
                window: vars.secs(RATE_WINDOW_VAR, crate::rate_limit::DEFAULT_WINDOW)?,
                ..RateLimitConfig::default()
            },
        };

        Ok(Self {
            verifier,
            min_scopes: vars.scopes(MIN_SCOPES_VAR),
            rate_limit,
            service_name: vars.get(SERVICE_NAME_VAR).unwrap_or_else(default_service_name),
            hash_identities: vars.flag(AUDIT_HASH_IDENTITIES_VAR)?,
        })
    }

    /// Validate the verifier configuration and limits
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] from the active verifier, or a zero rate window.
    pub fn validate(&self, env: &Environment) -> ConfigResult<()> {
        self.verifier.validate(env)?;
        if self.rate_limit.enabled && self.rate_limit.window.is_zero() {
            return Err(ConfigError::InvalidSetting {
                setting: RATE_WINDOW_VAR,
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn signature_key_source<F>(vars: &Vars<F>, fetch_timeout: Duration) -> ConfigResult<KeySource>
where
    F: Fn(&str) -> Option<String>,
{
    let jwks_url = vars.get(JWKS_URL_VAR);
    let public_key = vars.get_raw(PUBLIC_KEY_VAR);
    let secret = vars.get_raw(SHARED_SECRET_VAR);

    let configured = [jwks_url.is_some(), public_key.is_some(), secret.is_some()]
        .iter()
        .filter(|set| **set)
        .count();
    if configured > 1 {
        return Err(ConfigError::InvalidSetting {
            setting: JWKS_URL_VAR,
            reason: format!(
                "set exactly one of {JWKS_URL_VAR}, {PUBLIC_KEY_VAR} or {SHARED_SECRET_VAR}"
            ),
        });
    }

    if jwks_url.is_some() {
        return Ok(KeySource::Jwks {
            url: vars.url(JWKS_URL_VAR)?,
            cache_ttl: vars.secs(JWKS_CACHE_TTL_VAR, jwt::jwks::DEFAULT_CACHE_TTL)?,
            fetch_timeout,
        });
    }
    if let Some(pem) = public_key {
        // Single-line env values often carry escaped newlines
        return Ok(KeySource::PublicKeyPem(pem.replace("\\n", "\n").into_bytes()));
    }
    if let Some(secret) = secret {
        return Ok(KeySource::SharedSecret(SigningSecret::new(secret.into_bytes())));
    }
    Err(ConfigError::MissingSetting(JWKS_URL_VAR))
}

fn check_endpoint(url: &Url, setting: &'static str, env: &Environment) -> ConfigResult<()> {
    if !url.username().is_empty() || url.password().is_some() {
        return Err(ConfigError::InvalidSetting {
            setting,
            reason: "URL must not embed credentials".to_string(),
        });
    }
    match url.scheme() {
        "https" => Ok(()),
        "http" if env.permits_plain_http(url) => Ok(()),
        _ => Err(ConfigError::InsecureEndpoint { setting }),
    }
}

fn check_timeout(timeout: Duration, setting: &'static str) -> ConfigResult<()> {
    if timeout < MIN_FETCH_TIMEOUT || timeout > MAX_FETCH_TIMEOUT {
        return Err(ConfigError::InvalidTimeout {
            setting,
            max_secs: MAX_FETCH_TIMEOUT.as_secs(),
        });
    }
    Ok(())
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed, non-empty value
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Untrimmed value for secrets and key material
    fn get_raw(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn require(&self, name: &'static str) -> ConfigResult<String> {
        self.get(name).ok_or(ConfigError::MissingSetting(name))
    }

    fn parse<T>(&self, name: &'static str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
    {
        self.get(name)
            .map(|raw| {
                raw.parse().map_err(|_| ConfigError::InvalidSetting {
                    setting: name,
                    reason: format!("{raw:?} is not a valid number"),
                })
            })
            .transpose()
    }

    fn flag(&self, name: &'static str) -> ConfigResult<bool> {
        match self.get(name).map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("0" | "false" | "no" | "off") => Ok(false),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some(other) => Err(ConfigError::InvalidSetting {
                setting: name,
                reason: format!("{other:?} is not a boolean"),
            }),
        }
    }

    fn secs(&self, name: &'static str, default: Duration) -> ConfigResult<Duration> {
        Ok(self
            .parse::<u64>(name)?
            .map_or(default, Duration::from_secs))
    }

    fn url(&self, name: &'static str) -> ConfigResult<Url> {
        let raw = self.require(name)?;
        Url::parse(&raw).map_err(|e| ConfigError::InvalidSetting {
            setting: name,
            reason: format!("not a valid URL: {e}"),
        })
    }

    fn scopes(&self, name: &str) -> ScopeSet {
        self.get(name).map(|raw| parse_scopes(&raw)).unwrap_or_default()
    }
}

fn default_clock_skew() -> Duration {
    DEFAULT_CLOCK_SKEW
}

fn default_fetch_timeout() -> Duration {
    DEFAULT_FETCH_TIMEOUT
}

fn default_jwks_cache_ttl() -> Duration {
    jwt::jwks::DEFAULT_CACHE_TTL
}

fn default_token_type_hint() -> String {
    DEFAULT_TOKEN_TYPE_HINT.to_string()
}

fn default_service_name() -> String {
    "toolgate".to_string()
}

fn algorithm_from_name<'de, D>(deserializer: D) -> Result<Algorithm, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    jwt::parse_algorithm(&name).map_err(serde::de::Error::custom)
}

fn pem_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(String::into_bytes)
}

/// Scope list given either as an array or as one delimited string
fn scope_list<'de, D>(deserializer: D) -> Result<ScopeSet, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scopes {
        Delimited(String),
        List(Vec<String>),
    }

    Ok(match Scopes::deserialize(deserializer)? {
        Scopes::Delimited(raw) => parse_scopes(&raw),
        Scopes::List(list) => list.into_iter().filter(|s| !s.is_empty()).collect(),
    })
}

/// Durations as integer seconds
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
