//! Deployment context detection
//!
//! Two decisions depend on where the process runs:
//!
//! - plain-HTTP loopback endpoints are tolerated only in declared local
//!   development (no managed-runtime indicator present)
//! - the static token verifier is built only when the environment is declared
//!   as development and nothing looks like production
//!
//! The environment is captured once into an [`Environment`] value so tests can
//! build one from a map instead of mutating process state.

use std::net::IpAddr;

use url::{Host, Url};

use crate::error::{ConfigError, ConfigResult};

/// Variable declaring the deployment stage
pub const STAGE_VAR: &str = "TOOLGATE_ENV";

/// Variables set by managed clusters and serverless platforms
pub const MANAGED_RUNTIME_VARS: &[&str] = &[
    "KUBERNETES_SERVICE_HOST",
    "AWS_LAMBDA_FUNCTION_NAME",
    "AWS_EXECUTION_ENV",
    "ECS_CONTAINER_METADATA_URI_V4",
    "K_SERVICE",
    "FUNCTION_TARGET",
    "FUNCTIONS_WORKER_RUNTIME",
    "WEBSITE_SITE_NAME",
    "FLY_APP_NAME",
    "DYNO",
];

/// Deployment stage declared through [`STAGE_VAR`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// `development`, `dev` or `local`
    Development,
    /// `production` or `prod`
    Production,
    /// Any other value (e.g. `staging`)
    Other(String),
}

impl Stage {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Self::Development,
            "production" | "prod" => Self::Production,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Snapshot of the deployment signals relevant to verifier construction
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Environment {
    stage: Option<Stage>,
    managed_runtime: Option<&'static str>,
}

impl Environment {
    /// Capture signals from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Capture signals through an arbitrary lookup (tests, config files)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let stage = lookup(STAGE_VAR)
            .filter(|v| !v.trim().is_empty())
            .map(|v| Stage::parse(&v));
        let managed_runtime = MANAGED_RUNTIME_VARS
            .iter()
            .copied()
            .find(|name| lookup(name).is_some_and(|v| !v.is_empty()));

        Self {
            stage,
            managed_runtime,
        }
    }

    /// Declared local development with no managed-runtime indicator
    pub fn development() -> Self {
        Self {
            stage: Some(Stage::Development),
            managed_runtime: None,
        }
    }

    /// Declared production
    pub fn production() -> Self {
        Self {
            stage: Some(Stage::Production),
            managed_runtime: None,
        }
    }

    /// Declared stage, if any
    pub fn stage(&self) -> Option<&Stage> {
        self.stage.as_ref()
    }

    /// First production signal found, described for operators
    pub fn production_signal(&self) -> Option<String> {
        if self.stage == Some(Stage::Production) {
            return Some(format!("{STAGE_VAR}=production"));
        }
        self.managed_runtime
            .map(|name| format!("managed runtime indicator {name}"))
    }

    /// Declared development with no production signal
    pub fn is_local_development(&self) -> bool {
        self.stage == Some(Stage::Development) && self.production_signal().is_none()
    }

    /// Whether a plain-HTTP endpoint may be used
    ///
    /// Only loopback hosts qualify, and only in declared local development.
    pub fn permits_plain_http(&self, url: &Url) -> bool {
        url.scheme() == "http" && is_loopback(url) && self.is_local_development()
    }

    /// Guard for the static verifier: declared development and no production signal
    pub fn ensure_non_production(&self) -> ConfigResult<()> {
        if let Some(signal) = self.production_signal() {
            return Err(ConfigError::ProductionContext { signal });
        }
        if !self.is_local_development() {
            return Err(ConfigError::UndeclaredDevelopment);
        }
        Ok(())
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    }
}
