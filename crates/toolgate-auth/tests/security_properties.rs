//! Security properties that span modules
//!
//! - raw tokens and client secrets never reach the logs
//! - the static table refuses production-like environments
//! - misconfiguration stops startup instead of weakening verification
//! - repeated attempts with one token are throttled

mod common;

use std::collections::HashMap;
use std::time::Duration;

use common::*;
use serde_json::json;
use toolgate_auth::rate_limit::RateLimitConfig;
use toolgate_auth::{
    AuthSettings, Authorizer, ClientSecret, ConfigError, Environment, FailureKind,
    IntrospectionConfig, RateLimiter, StaticConfig, StaticTokenEntry, TokenFingerprint, Verifier,
    VerifierConfig, scope_set,
};

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

fn static_config() -> VerifierConfig {
    VerifierConfig::Static(StaticConfig::new().with_token(
        "dev-token-alice",
        StaticTokenEntry::new("alice", scope_set(["read:data"])),
    ))
}

fn filtered_capture() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            "toolgate_auth=trace,audit=trace",
        ))
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}

#[tokio::test]
async fn test_tokens_and_secrets_never_logged() {
    // GIVEN: logs captured at trace level and an introspection verifier
    let (logs, _guard) = filtered_capture();

    let server = MockAuthServer::start().await;
    wiremock::Mock::given(wiremock::matchers::body_string_contains("accepted-opaque-token"))
        .respond_with(
            wiremock::ResponseTemplate::new(200)
                .set_body_json(json!({ "active": true, "sub": "alice" })),
        )
        .mount(&server.server)
        .await;
    wiremock::Mock::given(wiremock::matchers::body_string_contains("rejected-opaque-token"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({ "active": false })))
        .mount(&server.server)
        .await;
    wiremock::Mock::given(wiremock::matchers::body_string_contains("failing-opaque-token"))
        .respond_with(wiremock::ResponseTemplate::new(500))
        .mount(&server.server)
        .await;

    let config = IntrospectionConfig::new(
        server.introspection_url(),
        "toolgate",
        ClientSecret::new("client-secret-do-not-log"),
    );
    let verifier =
        Verifier::from_config(&VerifierConfig::Introspection(config), &Environment::development())
            .unwrap();

    // WHEN: tokens are accepted, rejected and hit an outage
    assert!(verifier.verify("accepted-opaque-token").await.unwrap().is_success());
    assert_eq!(
        verifier
            .verify("rejected-opaque-token")
            .await
            .unwrap()
            .failure_kind(),
        Some(FailureKind::InvalidToken)
    );
    assert!(verifier.verify("failing-opaque-token").await.is_err());

    // THEN: the logs carry fingerprints and reasons, never credentials
    let output = logs.contents();
    for secret in [
        "accepted-opaque-token",
        "rejected-opaque-token",
        "failing-opaque-token",
        "client-secret-do-not-log",
    ] {
        assert!(!output.contains(secret), "{secret} leaked into logs");
    }
    assert!(output.contains(TokenFingerprint::of("rejected-opaque-token").as_str()));
    assert!(output.contains("token is not active"));
}

#[tokio::test]
async fn test_signed_token_never_logged() {
    let (logs, _guard) = filtered_capture();

    let config = toolgate_auth::SignatureConfig::new(
        toolgate_auth::KeySource::PublicKeyPem(EC_PUBLIC_PEM.to_vec()),
        jsonwebtoken::Algorithm::ES256,
        ISSUER,
        AUDIENCE,
    );
    let verifier =
        Verifier::from_config(&VerifierConfig::Signature(config), &Environment::production())
            .unwrap();

    let good = es256_token(None, &valid_claims());
    let forged = rogue_token(None, &valid_claims());
    verifier.verify(&good).await.unwrap();
    verifier.verify(&forged).await.unwrap();

    let output = logs.contents();
    assert!(!output.contains(&good));
    assert!(!output.contains(&forged));
    // The signature segment alone must not appear either
    let signature = forged.rsplit('.').next().unwrap();
    assert!(!output.contains(signature));
    assert!(output.contains("signature verification failed"));
}

#[test]
fn test_static_table_refuses_production_signals() {
    let cases = [
        Environment::production(),
        Environment::default(),
        Environment::from_lookup(lookup(&[("TOOLGATE_ENV", "staging")])),
        Environment::from_lookup(lookup(&[
            ("TOOLGATE_ENV", "development"),
            ("KUBERNETES_SERVICE_HOST", "10.0.0.1"),
        ])),
        Environment::from_lookup(lookup(&[
            ("TOOLGATE_ENV", "development"),
            ("AWS_LAMBDA_FUNCTION_NAME", "toolgate"),
        ])),
    ];

    for env in cases {
        let err = Verifier::from_config(&static_config(), &env).unwrap_err();
        assert!(
            matches!(
                err,
                ConfigError::ProductionContext { .. } | ConfigError::UndeclaredDevelopment
            ),
            "{env:?} gave {err:?}"
        );
    }

    let dev = Environment::from_lookup(lookup(&[("TOOLGATE_ENV", "development")]));
    assert!(Verifier::from_config(&static_config(), &dev).is_ok());
}

#[test]
fn test_startup_rejects_weakening_configuration() {
    let base = [
        ("TOOLGATE_AUTH_VERIFIER", "jwt"),
        ("TOOLGATE_AUTH_ISSUER", ISSUER),
        ("TOOLGATE_AUTH_AUDIENCE", AUDIENCE),
    ];
    let production = Environment::production();

    let with = |extra: &[(&'static str, &'static str)]| {
        let mut pairs = base.to_vec();
        pairs.extend_from_slice(extra);
        AuthSettings::from_lookup(lookup(&pairs)).and_then(|s| Verifier::from_settings(&s, &production))
    };

    // Plain-http key set in production
    assert!(matches!(
        with(&[("TOOLGATE_AUTH_JWKS_URL", "http://auth.example.com/jwks")]),
        Err(ConfigError::InsecureEndpoint { .. })
    ));

    // `none` and unknown algorithms
    for alg in ["none", "HS1"] {
        assert!(matches!(
            with(&[
                ("TOOLGATE_AUTH_JWKS_URL", "https://auth.example.com/jwks"),
                ("TOOLGATE_AUTH_JWT_ALGORITHM", alg),
            ]),
            Err(ConfigError::UnsupportedAlgorithm(_))
        ));
    }

    // Symmetric algorithm against a key set
    assert!(matches!(
        with(&[
            ("TOOLGATE_AUTH_JWKS_URL", "https://auth.example.com/jwks"),
            ("TOOLGATE_AUTH_JWT_ALGORITHM", "HS256"),
        ]),
        Err(ConfigError::AlgorithmKeyMismatch { .. })
    ));

    // Short shared secret
    assert!(matches!(
        with(&[
            ("TOOLGATE_AUTH_JWT_SECRET", "too-short"),
            ("TOOLGATE_AUTH_JWT_ALGORITHM", "HS256"),
        ]),
        Err(ConfigError::WeakKey { .. })
    ));

    // Excessive clock skew
    assert!(matches!(
        with(&[
            ("TOOLGATE_AUTH_JWKS_URL", "https://auth.example.com/jwks"),
            ("TOOLGATE_AUTH_CLOCK_SKEW_SECS", "600"),
        ]),
        Err(ConfigError::ClockSkewTooLarge { .. })
    ));

    // A sound configuration starts
    assert!(with(&[("TOOLGATE_AUTH_JWKS_URL", "https://auth.example.com/jwks")]).is_ok());
}

#[test]
fn test_config_errors_do_not_echo_secrets() {
    let err = AuthSettings::from_lookup(lookup(&[
        ("TOOLGATE_AUTH_VERIFIER", "jwt"),
        ("TOOLGATE_AUTH_ISSUER", ISSUER),
        ("TOOLGATE_AUTH_AUDIENCE", AUDIENCE),
        ("TOOLGATE_AUTH_JWT_SECRET", "short-secret-value"),
        ("TOOLGATE_AUTH_JWT_ALGORITHM", "HS512"),
    ]))
    .and_then(|s| Verifier::from_settings(&s, &Environment::production()))
    .unwrap_err();

    assert!(matches!(err, ConfigError::WeakKey { min_bytes: 64, .. }));
    assert!(!err.to_string().contains("short-secret-value"));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_attempts_are_throttled_per_token() {
    // GIVEN: the default policy of 10 attempts per minute
    let verifier = Verifier::from_config(&static_config(), &Environment::development())
        .unwrap()
        .with_rate_limiter(RateLimiter::default());

    // WHEN: one token is tried 11 times
    for attempt in 1..=10 {
        let result = verifier.verify("guessed-token").await.unwrap();
        assert_eq!(
            result.failure_kind(),
            Some(FailureKind::InvalidToken),
            "attempt {attempt}"
        );
    }
    let result = verifier.verify("guessed-token").await.unwrap();

    // THEN: the 11th is throttled with 429
    assert_eq!(result.failure_kind(), Some(FailureKind::RateLimited));
    let failure = result.into_result().unwrap_err();
    assert_eq!(failure.status, http::StatusCode::TOO_MANY_REQUESTS);

    // AND: a legitimate token is unaffected
    assert!(verifier.verify("dev-token-alice").await.unwrap().is_success());

    // AND: the window slides
    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(
        verifier.verify("guessed-token").await.unwrap().failure_kind(),
        Some(FailureKind::InvalidToken)
    );
}

#[tokio::test]
async fn test_disabled_rate_limit_never_throttles() {
    let verifier = Verifier::from_config(&static_config(), &Environment::development())
        .unwrap()
        .with_rate_limiter(RateLimiter::new(RateLimitConfig::disabled()));

    for _ in 0..50 {
        assert!(verifier.verify("dev-token-alice").await.unwrap().is_success());
    }
}

#[tokio::test]
async fn test_settings_wire_minimum_scopes_and_limits() {
    let settings = AuthSettings::from_lookup(lookup(&[
        ("TOOLGATE_AUTH_VERIFIER", "static"),
        (
            "TOOLGATE_AUTH_STATIC_TOKENS",
            r#"{"dev-token-alice": {"identity": "alice", "scopes": ["read:data"]}}"#,
        ),
        ("TOOLGATE_AUTH_MIN_SCOPES", "read:data admin"),
        ("TOOLGATE_AUTH_RATE_LIMIT", "2"),
    ]))
    .unwrap();
    let dev = Environment::development();
    let verifier = Verifier::from_settings(&settings, &dev).unwrap();
    let authorizer = Authorizer::from_settings(&settings);

    // Verified, but short of the server-wide minimum
    let result = verifier.verify("dev-token-alice").await.unwrap();
    assert!(result.is_success());
    assert_eq!(
        authorizer.authorize(&result).unwrap_err().kind,
        FailureKind::InsufficientScope
    );

    // Limit of two applies
    verifier.verify("dev-token-alice").await.unwrap();
    assert_eq!(
        verifier
            .verify("dev-token-alice")
            .await
            .unwrap()
            .failure_kind(),
        Some(FailureKind::RateLimited)
    );
}

#[tokio::test]
async fn test_hashed_identities_stay_out_of_audit_logs() {
    // GIVEN: settings that ask for hashed identities and a minimum scope alice lacks
    let (logs, _guard) = filtered_capture();
    let settings = AuthSettings::from_lookup(lookup(&[
        ("TOOLGATE_AUTH_VERIFIER", "static"),
        (
            "TOOLGATE_AUTH_STATIC_TOKENS",
            r#"{"dev-token-alice": {"identity": "alice-the-principal", "scopes": ["read:data"]}}"#,
        ),
        ("TOOLGATE_AUTH_MIN_SCOPES", "admin"),
        ("TOOLGATE_AUTH_AUDIT_HASH_IDENTITIES", "true"),
    ]))
    .unwrap();
    let dev = Environment::development();
    let verifier = Verifier::from_settings(&settings, &dev).unwrap();
    let authorizer = Authorizer::from_settings(&settings);

    // WHEN: the token is accepted and then denied by the authorizer
    let result = verifier.verify("dev-token-alice").await.unwrap();
    assert!(result.is_success());
    assert!(authorizer.authorize(&result).is_err());

    // THEN: both audit events carry the digest, never the identity
    let output = logs.contents();
    assert!(output.contains("token_accepted"));
    assert!(output.contains("scope_denied"));
    assert!(output.contains("blake3:"));
    assert!(!output.contains("alice-the-principal"));
}
