//! Tower Service for bearer authentication
//!
//! Rejections are answered by the middleware itself with an empty
//! `ResBody::default()` body; the inner service is never called for them.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::{HeaderValue, Request, Response, StatusCode};
use tower_service::Service;
use tracing::warn;

use crate::context::Authorizer;
use crate::result::AuthFailure;
use crate::verifier::Verifier;

use super::BearerAuthConfig;

/// Future returned by [`BearerAuthService`]
pub type BearerAuthServiceFuture<T, E> = BoxFuture<'static, Result<T, E>>;

/// Tower Service that verifies the bearer token before forwarding
#[derive(Debug, Clone)]
pub struct BearerAuthService<S> {
    inner: S,
    verifier: Arc<Verifier>,
    authorizer: Arc<Authorizer>,
    config: BearerAuthConfig,
}

impl<S> BearerAuthService<S> {
    /// Create a new service
    pub fn new(
        inner: S,
        verifier: Arc<Verifier>,
        authorizer: Arc<Authorizer>,
        config: BearerAuthConfig,
    ) -> Self {
        Self {
            inner,
            verifier,
            authorizer,
            config,
        }
    }

    /// Get a reference to the inner service
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the inner service
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

fn challenge<B: Default>(realm: Option<&str>) -> Response<B> {
    let header = match realm {
        Some(realm) => format!("Bearer realm=\"{realm}\""),
        None => "Bearer".to_string(),
    };
    respond(StatusCode::UNAUTHORIZED, Some(header))
}

fn reject<B: Default>(failure: &AuthFailure, realm: Option<&str>, scopes: &[&str]) -> Response<B> {
    respond(failure.status, Some(failure.www_authenticate(realm, scopes)))
}

fn respond<B: Default>(status: StatusCode, www_authenticate: Option<String>) -> Response<B> {
    let mut response = Response::new(B::default());
    *response.status_mut() = status;
    if let Some(value) = www_authenticate.and_then(|v| HeaderValue::from_str(&v).ok()) {
        response
            .headers_mut()
            .insert(http::header::WWW_AUTHENTICATE, value);
    }
    response
}

impl<S, B, ResBody> Service<Request<B>> for BearerAuthService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send + 'static,
    B: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BearerAuthServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // The ready service goes into the future; a fresh clone stays behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if self.config.should_bypass(req.uri().path()) {
            return Box::pin(async move { inner.call(req).await });
        }

        let realm = self.config.realm.clone();
        let Some(raw) = req
            .headers()
            .get(&self.config.auth_header)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
        else {
            return Box::pin(async move { Ok(challenge(realm.as_deref())) });
        };

        let verifier = Arc::clone(&self.verifier);
        let authorizer = Arc::clone(&self.authorizer);

        Box::pin(async move {
            let result = match verifier.verify(&raw).await {
                Ok(result) => result,
                Err(error) => {
                    warn!(error = %error, "Rejecting request; verifier unavailable");
                    return Ok(respond(error.status(), None));
                }
            };

            match authorizer.authorize(&result) {
                Ok(context) => {
                    req.extensions_mut().insert(context);
                    inner.call(req).await
                }
                Err(failure) => {
                    let scopes = authorizer
                        .min_scopes()
                        .iter()
                        .map(String::as_str)
                        .collect::<Vec<_>>();
                    Ok(reject(&failure, realm.as_deref(), &scopes))
                }
            }
        })
    }
}
