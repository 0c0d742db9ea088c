//! Fixed token table for local development
//!
//! Tokens are held only as BLAKE3 digests. A presented token is hashed and
//! compared against every entry with `subtle::ConstantTimeEq`, without early
//! exit, so timing reveals neither which entry matched nor where a mismatch
//! occurred.
//!
//! The verifier refuses to exist outside a declared development environment;
//! see [`Environment::ensure_non_production`].

use std::fmt;

use subtle::ConstantTimeEq;
use tracing::debug;

use crate::claims::{ScopeSet, TokenClaims};
use crate::config::{StaticConfig, StaticTokenEntry};
use crate::environment::Environment;
use crate::error::ConfigResult;
use crate::result::{Judgement, Rejection};

#[inline]
fn token_digest(token: &str) -> [u8; 32] {
    blake3::hash(token.as_bytes()).into()
}

/// Development-only verifier over a fixed table
pub struct StaticVerifier {
    entries: Vec<([u8; 32], StaticTokenEntry)>,
    required_scopes: ScopeSet,
}

impl fmt::Debug for StaticVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticVerifier")
            .field("entries", &self.entries.len())
            .field("required_scopes", &self.required_scopes)
            .finish()
    }
}

impl StaticVerifier {
    /// Validate `config` against the environment and hash the table
    ///
    /// # Errors
    ///
    /// [`ConfigError::ProductionContext`](crate::ConfigError::ProductionContext)
    /// or [`ConfigError::UndeclaredDevelopment`](crate::ConfigError::UndeclaredDevelopment)
    /// outside development, or any table error from [`StaticConfig::validate`].
    pub fn new(config: &StaticConfig, env: &Environment) -> ConfigResult<Self> {
        config.validate(env)?;

        let entries = config
            .tokens
            .iter()
            .map(|(token, entry)| (token_digest(token), entry.clone()))
            .collect::<Vec<_>>();

        tracing::warn!(
            entries = entries.len(),
            "Static token verifier enabled; never use it outside local development"
        );

        Ok(Self {
            entries,
            required_scopes: config.required_scopes.clone(),
        })
    }

    /// Number of configured tokens
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty (never true for a constructed verifier)
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn verify(&self, token: &str) -> Judgement {
        let provided = token_digest(token);

        let mut matched = None;
        for (digest, entry) in &self.entries {
            let equal: bool = provided.ct_eq(digest).into();
            if equal && matched.is_none() {
                matched = Some(entry);
            }
        }

        let Some(entry) = matched else {
            return Err(Rejection::invalid("token not in static table"));
        };

        let claims = TokenClaims::for_subject(entry.identity.clone(), entry.scopes.clone());
        if !claims.satisfies(&self.required_scopes) {
            return Err(Rejection::insufficient_scope(
                &claims.missing_scopes(&self.required_scopes),
            ));
        }

        debug!(identity = %entry.identity, "Static token matched");
        Ok(claims)
    }
}
