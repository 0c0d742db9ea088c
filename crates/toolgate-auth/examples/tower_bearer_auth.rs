//! Example: Bearer authentication as Tower middleware
//!
//! Wraps a handler with `BearerAuthLayer` using the static development
//! verifier, then sends a handful of requests through it.
//!
//! Run with:
//! ```sh
//! TOOLGATE_ENV=development cargo run --example tower_bearer_auth --features middleware
//! ```

use std::convert::Infallible;

use tower::{ServiceBuilder, ServiceExt};
use toolgate_auth::tower::BearerAuthLayer;
use toolgate_auth::{
    AuthContext, AuthSettings, Authorizer, Environment, RateLimitConfig, StaticConfig,
    StaticTokenEntry, Verifier, VerifierConfig, scope_set,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("toolgate_auth=debug,audit=info")
        .init();

    println!("Tower Bearer Authentication Example\n");

    // 1. Settings: two development tokens, read:data required everywhere
    let settings = AuthSettings::new(VerifierConfig::Static(
        StaticConfig::new()
            .with_token(
                "dev-token-alice",
                StaticTokenEntry::new("alice", scope_set(["read:data", "write:data"])),
            )
            .with_token(
                "dev-token-guest",
                StaticTokenEntry::new("guest", scope_set(["profile"])),
            ),
    ))
    .with_min_scopes(scope_set(["read:data"]))
    .with_rate_limit(RateLimitConfig::new(3, std::time::Duration::from_secs(60)));

    // 2. Build the verifier; outside development this refuses to start
    let verifier = Verifier::from_settings(&settings, &Environment::from_env())?;

    // 3. Handler that reads the caller from the request extensions
    let handler = tower::service_fn(|req: http::Request<()>| async move {
        let identity = req
            .extensions()
            .get::<AuthContext>()
            .map(|ctx| ctx.identity.clone())
            .unwrap_or_else(|| "anonymous".to_string());
        Ok::<_, Infallible>(http::Response::new(format!("hello, {identity}")))
    });

    let service = ServiceBuilder::new()
        .layer(
            BearerAuthLayer::new(verifier, Authorizer::from_settings(&settings))
                .realm("toolgate")
                .bypass_path("/health"),
        )
        .service(handler);

    let requests = [
        ("/health", None),
        ("/tools/call", None),
        ("/tools/call", Some("Bearer dev-token-alice")),
        ("/tools/call", Some("Bearer dev-token-guest")),
        ("/tools/call", Some("Bearer not-a-token")),
        ("/tools/call", Some("Bearer not-a-token")),
        ("/tools/call", Some("Bearer not-a-token")),
        ("/tools/call", Some("Bearer not-a-token")),
    ];

    for (i, (path, authorization)) in requests.into_iter().enumerate() {
        let mut builder = http::Request::builder().uri(path);
        if let Some(value) = authorization {
            builder = builder.header(http::header::AUTHORIZATION, value);
        }

        let response = service.clone().oneshot(builder.body(())?).await?;
        let challenge = response
            .headers()
            .get(http::header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();

        println!(
            "[Request {}] {path} {:?} -> {} {:?} (WWW-Authenticate: {challenge})",
            i + 1,
            authorization.unwrap_or("<none>"),
            response.status(),
            response.body(),
        );
    }

    Ok(())
}
