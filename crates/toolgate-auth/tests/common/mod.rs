//! Common test utilities for integration tests
//!
//! A wiremock authorization server (JWKS and introspection endpoints), the
//! P-256 fixture keys, a token builder, and a log capture for asserting
//! what does and does not reach the logs.

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use tracing_subscriber::fmt::MakeWriter;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const ISSUER: &str = "https://auth.example.com";
pub const AUDIENCE: &str = "https://tools.example.com";
pub const KID: &str = "key-2026-10";

/// Public half of `ec_private.pem` as JWK coordinates
pub const EC_X: &str = "cGuep5a1uhWHO-ON9huEkcgMfzemLd7Stj42u6CXbYI";
pub const EC_Y: &str = "KM9qu9wgOHgPwyLo3NlyEpH1_HMOsOnRfr1TXZJvd8Q";

pub const EC_PRIVATE_PEM: &[u8] = include_bytes!("../fixtures/ec_private.pem");
pub const EC_PUBLIC_PEM: &[u8] = include_bytes!("../fixtures/ec_public.pem");
pub const ROGUE_PRIVATE_PEM: &[u8] = include_bytes!("../fixtures/rogue_private.pem");

/// Mock authorization server
pub struct MockAuthServer {
    pub server: MockServer,
}

impl MockAuthServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn jwks_url(&self) -> Url {
        Url::parse(&format!("{}/jwks", self.server.uri())).unwrap()
    }

    pub fn introspection_url(&self) -> Url {
        Url::parse(&format!("{}/introspect", self.server.uri())).unwrap()
    }

    /// Serve `keys` from `/jwks`, asserting the number of fetches on drop
    pub async fn mock_jwks(&self, keys: Vec<Value>, expected_fetches: u64) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .expect(expected_fetches)
            .mount(&self.server)
            .await;
    }

    /// Serve `keys` for the next `times` fetches only
    pub async fn mock_jwks_times(&self, keys: Vec<Value>, times: u64) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .up_to_n_times(times)
            .expect(times)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_jwks_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answer every introspection request with `body`
    pub async fn mock_introspection(&self, body: Value, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/introspect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }
}

/// JWK for the fixture signing key
pub fn ec_jwk(kid: &str) -> Value {
    json!({
        "kty": "EC",
        "crv": "P-256",
        "x": EC_X,
        "y": EC_Y,
        "kid": kid,
        "use": "sig",
        "alg": "ES256",
    })
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Claims that pass every check, expiring in an hour
pub fn valid_claims() -> Value {
    let now = now_secs();
    json!({
        "sub": "alice",
        "iss": ISSUER,
        "aud": AUDIENCE,
        "exp": now + 3600,
        "iat": now,
        "scope": "read:data write:data",
    })
}

/// Sign `claims` with ES256 and the fixture key
pub fn es256_token(kid: Option<&str>, claims: &Value) -> String {
    sign_ec(EC_PRIVATE_PEM, kid, claims)
}

/// Sign `claims` with ES256 and a key nobody trusts
pub fn rogue_token(kid: Option<&str>, claims: &Value) -> String {
    sign_ec(ROGUE_PRIVATE_PEM, kid, claims)
}

fn sign_ec(pem: &[u8], kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::ES256);
    header.kid = kid.map(str::to_owned);
    encode(&header, claims, &EncodingKey::from_ec_pem(pem).unwrap()).unwrap()
}

/// Sign `claims` with HMAC using `secret` as the key
pub fn hmac_token(algorithm: Algorithm, secret: &[u8], claims: &Value) -> String {
    encode(&Header::new(algorithm), claims, &EncodingKey::from_secret(secret)).unwrap()
}

/// In-memory log sink
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Capture every event on this thread until the guard drops
///
/// Use with the current-thread test runtime so spawned tasks log here too.
pub fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}
