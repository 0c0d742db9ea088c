//! Tower Layer for bearer authentication

use std::sync::Arc;
use tower::Layer;

use crate::context::Authorizer;
use crate::verifier::Verifier;

use super::BearerAuthConfig;
use super::service::BearerAuthService;

/// Tower Layer that adds bearer authentication to services
///
/// Cloning the layer shares the verifier, so the key-set cache and the
/// rate-limit table are common to every wrapped service.
#[derive(Debug, Clone)]
pub struct BearerAuthLayer {
    verifier: Arc<Verifier>,
    authorizer: Arc<Authorizer>,
    config: BearerAuthConfig,
}

impl BearerAuthLayer {
    /// Create a layer with the default configuration
    pub fn new(verifier: Verifier, authorizer: Authorizer) -> Self {
        Self::from_arc(Arc::new(verifier), authorizer)
    }

    /// Create a layer around an already shared verifier
    pub fn from_arc(verifier: Arc<Verifier>, authorizer: Authorizer) -> Self {
        Self {
            verifier,
            authorizer: Arc::new(authorizer),
            config: BearerAuthConfig::default(),
        }
    }

    /// Replace the configuration
    #[must_use]
    pub fn config(mut self, config: BearerAuthConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the challenge realm
    #[must_use]
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.config.realm = Some(realm.into());
        self
    }

    /// Serve `path` without authentication
    #[must_use]
    pub fn bypass_path(mut self, path: impl Into<String>) -> Self {
        self.config.bypass_paths.push(path.into());
        self
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService::new(
            inner,
            Arc::clone(&self.verifier),
            Arc::clone(&self.authorizer),
            self.config.clone(),
        )
    }
}
