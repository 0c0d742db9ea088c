//! JWKS (JSON Web Key Set) fetching and caching
//!
//! - **TTL-bounded cache**: default 10 minutes
//! - **Rotation**: an unknown `kid` on a fresh cache forces one refetch, at most
//!   once per minimum refresh interval (5 seconds)
//! - **Coalescing**: concurrent misses share one in-flight fetch, which runs on
//!   a spawned task and survives cancellation of any single caller
//! - **Bounded**: every fetch has a mandatory timeout
//!
//! Fetch failures surface as [`SystemError::KeySetUnavailable`], whose `Display`
//! never contains the endpoint URL or key material.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, PublicKeyUse};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

use super::KeyFamily;
use crate::auth_metrics;
use crate::error::{ConfigError, ConfigResult, FetchFailure, SystemError};
use crate::singleflight::SingleFlight;

/// Default cache lifetime
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Minimum time between two forced refetches
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct CachedJwks {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

/// JWKS client with a TTL cache and coalesced fetches
///
/// # Example
///
/// ```rust,no_run
/// # use toolgate_auth::jwt::JwksClient;
/// # use std::time::Duration;
/// # tokio_test::block_on(async {
/// let url = url::Url::parse("https://auth.example.com/.well-known/jwks.json")?;
/// let client = JwksClient::new(url, Duration::from_secs(600), Duration::from_secs(10))?;
///
/// if let Some(jwk) = client.resolve(Some("key-2024-06"), toolgate_auth::jwt::KeyFamily::Rsa).await? {
///     println!("found key {:?}", jwk.common.key_id);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
pub struct JwksClient {
    url: Url,
    http_client: reqwest::Client,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
    cache: Arc<RwLock<Option<CachedJwks>>>,
    fetches: SingleFlight<(), Arc<JwkSet>>,
}

impl fmt::Debug for JwksClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksClient")
            .field("url", &self.url.as_str())
            .field("cache_ttl", &self.cache_ttl)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .finish_non_exhaustive()
    }
}

impl JwksClient {
    /// Create a client for `url`
    ///
    /// Endpoint scheme checks happen in configuration validation; this only
    /// builds the HTTP client.
    ///
    /// # Errors
    ///
    /// [`ConfigError::HttpClient`] if the TLS backend cannot be initialized.
    pub fn new(url: Url, cache_ttl: Duration, fetch_timeout: Duration) -> ConfigResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .connect_timeout(fetch_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            url,
            http_client,
            cache_ttl,
            min_refresh_interval: MIN_REFRESH_INTERVAL,
            cache: Arc::new(RwLock::new(None)),
            fetches: SingleFlight::new(),
        })
    }

    /// Override the minimum interval between forced refetches
    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Key set endpoint
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Current key set, from cache when fresh
    ///
    /// # Errors
    ///
    /// [`SystemError::KeySetUnavailable`] if a fetch was needed and failed.
    pub async fn key_set(&self) -> Result<Arc<JwkSet>, SystemError> {
        if let Some(cached) = self.fresh_cache().await {
            debug!("Using cached JWKS");
            return Ok(cached.keys);
        }
        self.fetch().await
    }

    /// Find the verification key for a token
    ///
    /// With a `kid`, looks the key up by id, forcing one refetch if it is
    /// absent from a cache old enough to refresh. Without a `kid`, the set must
    /// hold exactly one signing key of `family`.
    ///
    /// Returns `Ok(None)` when no key qualifies.
    ///
    /// # Errors
    ///
    /// [`SystemError::KeySetUnavailable`] if the key set could not be fetched.
    pub async fn resolve(
        &self,
        kid: Option<&str>,
        family: KeyFamily,
    ) -> Result<Option<Jwk>, SystemError> {
        let keys = self.key_set().await?;

        let Some(kid) = kid else {
            return Ok(sole_signing_key(&keys, family));
        };

        if let Some(jwk) = keys.find(kid) {
            return Ok(Some(jwk.clone()));
        }

        if !self.refresh_allowed().await {
            debug!(kid = kid, "Key id not in JWKS, refresh throttled");
            return Ok(None);
        }

        warn!(kid = kid, "Key id not in JWKS, refetching for rotation");
        let keys = self.fetch().await?;
        Ok(keys.find(kid).cloned())
    }

    /// Drop the cached key set
    pub async fn clear_cache(&self) {
        *self.cache.write().await = None;
        debug!("JWKS cache cleared");
    }

    async fn fresh_cache(&self) -> Option<CachedJwks> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.cache_ttl)
            .cloned()
    }

    async fn refresh_allowed(&self) -> bool {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .is_none_or(|cached| cached.fetched_at.elapsed() >= self.min_refresh_interval)
    }

    async fn fetch(&self) -> Result<Arc<JwkSet>, SystemError> {
        let http_client = self.http_client.clone();
        let url = self.url.clone();
        let cache = Arc::clone(&self.cache);

        self.fetches
            .run((), move || async move {
                let outcome = fetch_key_set(&http_client, &url).await;
                auth_metrics::record_key_set_fetch(outcome.is_ok());

                let keys = Arc::new(outcome.map_err(SystemError::KeySetUnavailable)?);
                *cache.write().await = Some(CachedJwks {
                    keys: Arc::clone(&keys),
                    fetched_at: Instant::now(),
                });
                Ok(keys)
            })
            .await
    }
}

async fn fetch_key_set(http_client: &reqwest::Client, url: &Url) -> Result<JwkSet, FetchFailure> {
    info!(jwks_url = %url, "Fetching JWKS from endpoint");

    let response = http_client.get(url.clone()).send().await.map_err(|e| {
        let failure = FetchFailure::from_reqwest(&e);
        error!(jwks_url = %url, failure = %failure, "Failed to fetch JWKS");
        failure
    })?;

    let status = response.status();
    if !status.is_success() {
        error!(jwks_url = %url, status = %status, "JWKS endpoint returned error status");
        return Err(FetchFailure::Status(status.as_u16()));
    }

    let keys: JwkSet = response.json().await.map_err(|e| {
        let failure = match FetchFailure::from_reqwest(&e) {
            FetchFailure::Timeout => FetchFailure::Timeout,
            _ => FetchFailure::Decode,
        };
        error!(jwks_url = %url, failure = %failure, "Failed to parse JWKS");
        failure
    })?;

    info!(jwks_url = %url, key_count = keys.keys.len(), "Fetched JWKS");
    Ok(keys)
}

fn sole_signing_key(keys: &JwkSet, family: KeyFamily) -> Option<Jwk> {
    let mut usable = keys
        .keys
        .iter()
        .filter(|jwk| is_signing_key(jwk) && matches_family(jwk, family));
    match (usable.next(), usable.next()) {
        (Some(only), None) => Some(only.clone()),
        _ => None,
    }
}

fn is_signing_key(jwk: &Jwk) -> bool {
    matches!(
        jwk.common.public_key_use,
        None | Some(PublicKeyUse::Signature)
    )
}

fn matches_family(jwk: &Jwk, family: KeyFamily) -> bool {
    match (&jwk.algorithm, family) {
        (AlgorithmParameters::RSA(_), KeyFamily::Rsa) => true,
        (AlgorithmParameters::EllipticCurve(_), KeyFamily::EllipticCurve) => true,
        (AlgorithmParameters::OctetKeyPair(_), KeyFamily::Edwards) => true,
        (AlgorithmParameters::OctetKey(_), KeyFamily::Symmetric) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ec_key(kid: Option<&str>, key_use: Option<&str>) -> serde_json::Value {
        let mut key = serde_json::json!({
            "kty": "EC",
            "crv": "P-256",
            "x": "cGuep5a1uhWHO-ON9huEkcgMfzemLd7Stj42u6CXbYI",
            "y": "KM9qu9wgOHgPwyLo3NlyEpH1_HMOsOnRfr1TXZJvd8Q",
        });
        if let Some(kid) = kid {
            key["kid"] = kid.into();
        }
        if let Some(key_use) = key_use {
            key["use"] = key_use.into();
        }
        key
    }

    fn key_set(keys: Vec<serde_json::Value>) -> JwkSet {
        serde_json::from_value(serde_json::json!({ "keys": keys })).unwrap()
    }

    #[test]
    fn test_sole_signing_key_requires_exactly_one() {
        let one = key_set(vec![ec_key(Some("a"), Some("sig"))]);
        assert!(sole_signing_key(&one, KeyFamily::EllipticCurve).is_some());
        assert!(sole_signing_key(&one, KeyFamily::Rsa).is_none());

        let two = key_set(vec![ec_key(Some("a"), None), ec_key(Some("b"), None)]);
        assert!(sole_signing_key(&two, KeyFamily::EllipticCurve).is_none());
    }

    #[test]
    fn test_encryption_keys_are_not_signing_keys() {
        let keys = key_set(vec![
            ec_key(Some("enc"), Some("enc")),
            ec_key(Some("sig"), Some("sig")),
        ]);
        let only = sole_signing_key(&keys, KeyFamily::EllipticCurve).unwrap();
        assert_eq!(only.common.key_id.as_deref(), Some("sig"));
    }

    #[tokio::test]
    async fn test_client_debug_omits_cache() {
        let client = JwksClient::new(
            Url::parse("https://auth.example.com/jwks").unwrap(),
            DEFAULT_CACHE_TTL,
            Duration::from_secs(5),
        )
        .unwrap();
        let rendered = format!("{client:?}");
        assert!(rendered.contains("JwksClient"));
        assert!(rendered.contains("cache_ttl"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_system_error() {
        // Port 9 on loopback: nothing listens, connection is refused
        let client = JwksClient::new(
            Url::parse("http://127.0.0.1:9/jwks").unwrap(),
            DEFAULT_CACHE_TTL,
            Duration::from_secs(2),
        )
        .unwrap();

        let err = client.key_set().await.unwrap_err();
        assert!(matches!(err, SystemError::KeySetUnavailable(_)));
        assert!(!err.to_string().contains("127.0.0.1"));
    }
}
