//! Decoded identity facts for one verified credential
//!
//! [`TokenClaims`] is produced fresh for every request and dropped when the
//! request completes. It is never cached: expiry, revocation and key rotation
//! can change between two requests carrying the same token.

use std::collections::BTreeSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A set of scope labels. Ordering is irrelevant; `BTreeSet` keeps output stable.
pub type ScopeSet = BTreeSet<String>;

/// Identity and capabilities extracted from a valid credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Principal identifier (`sub`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Calling application's identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Granted scopes; empty means no capabilities
    #[serde(default)]
    pub scopes: ScopeSet,

    /// Expiry instant
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "unix_seconds_opt"
    )]
    pub expires_at: Option<SystemTime>,

    /// Issue instant
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "unix_seconds_opt"
    )]
    pub issued_at: Option<SystemTime>,
}

impl TokenClaims {
    /// Claims for a subject with the given scopes and no timestamps
    pub fn for_subject(subject: impl Into<String>, scopes: ScopeSet) -> Self {
        Self {
            subject: Some(subject.into()),
            client_id: None,
            scopes,
            expires_at: None,
            issued_at: None,
        }
    }

    /// The identity to attribute the request to: subject, else client id
    pub fn identity(&self) -> Option<&str> {
        self.subject
            .as_deref()
            .or(self.client_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// Whether a single scope was granted
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Whether every scope in `required` was granted
    pub fn satisfies(&self, required: &ScopeSet) -> bool {
        required.is_subset(&self.scopes)
    }

    /// Required scopes that were not granted
    pub fn missing_scopes<'a>(&'a self, required: &'a ScopeSet) -> Vec<&'a str> {
        required
            .difference(&self.scopes)
            .map(String::as_str)
            .collect()
    }

    /// Whether the credential has expired, tolerating `leeway` of clock skew
    pub fn is_expired(&self, now: SystemTime, leeway: Duration) -> bool {
        match self.expires_at {
            Some(exp) => exp.checked_add(leeway).is_none_or(|exp| exp <= now),
            None => false,
        }
    }
}

/// Parse a scope list separated by whitespace and/or commas
///
/// Accepts both the OAuth wire form (`"read write"`) and the environment form
/// (`"read,write"`). Empty segments are dropped.
pub fn parse_scopes(raw: &str) -> ScopeSet {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Build a scope set from any iterable of string-likes
pub fn scope_set<I, S>(scopes: I) -> ScopeSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    scopes.into_iter().map(Into::into).collect()
}

/// `None` when `secs` lies beyond what `SystemTime` can represent
pub(crate) fn from_unix_seconds(secs: u64) -> Option<SystemTime> {
    UNIX_EPOCH.checked_add(Duration::from_secs(secs))
}

mod unix_seconds_opt {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(time: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(t) => {
                let since_epoch = t
                    .duration_since(UNIX_EPOCH)
                    .map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&since_epoch.as_secs())
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SystemTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<u64> = Option::deserialize(deserializer)?;
        opt.map(|secs| {
            from_unix_seconds(secs)
                .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identity_prefers_subject() {
        let mut claims = TokenClaims::for_subject("user-1", ScopeSet::new());
        claims.client_id = Some("app-7".to_string());
        assert_eq!(claims.identity(), Some("user-1"));

        claims.subject = None;
        assert_eq!(claims.identity(), Some("app-7"));

        claims.client_id = Some(String::new());
        assert_eq!(claims.identity(), None);
    }

    #[test]
    fn test_scope_subset() {
        let claims = TokenClaims::for_subject("u", scope_set(["read:data", "write:data"]));
        assert!(claims.satisfies(&scope_set(["read:data"])));
        assert!(claims.satisfies(&ScopeSet::new()));
        assert!(!claims.satisfies(&scope_set(["admin"])));
        assert_eq!(
            claims.missing_scopes(&scope_set(["admin", "read:data"])),
            vec!["admin"]
        );
    }

    #[test]
    fn test_parse_scopes_mixed_separators() {
        let scopes = parse_scopes(" read:data,write:data  admin ,");
        assert_eq!(scopes, scope_set(["admin", "read:data", "write:data"]));
        assert!(parse_scopes("").is_empty());
    }

    #[test]
    fn test_expiry_with_leeway() {
        let now = SystemTime::now();
        let mut claims = TokenClaims::for_subject("u", ScopeSet::new());
        assert!(!claims.is_expired(now, Duration::ZERO));

        claims.expires_at = Some(now - Duration::from_secs(30));
        assert!(claims.is_expired(now, Duration::ZERO));
        assert!(!claims.is_expired(now, Duration::from_secs(60)));
    }

    #[test]
    fn test_serde_uses_unix_seconds() {
        let mut claims = TokenClaims::for_subject("u", scope_set(["a"]));
        claims.expires_at = from_unix_seconds(1_700_000_000);
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["expires_at"], 1_700_000_000);
        assert!(json.get("issued_at").is_none());

        let back: TokenClaims = serde_json::from_value(json).unwrap();
        assert_eq!(back, claims);
    }

    #[test]
    fn test_out_of_range_timestamps() {
        assert!(from_unix_seconds(u64::MAX).is_none());
        assert!(from_unix_seconds(0).is_some());

        let json = serde_json::json!({ "subject": "u", "expires_at": u64::MAX });
        assert!(serde_json::from_value::<TokenClaims>(json).is_err());
    }

    proptest! {
        #[test]
        fn prop_parse_scopes_never_yields_separators(raw in "[a-z:, \t]{0,64}") {
            for scope in parse_scopes(&raw) {
                prop_assert!(!scope.is_empty());
                prop_assert!(!scope.contains(','));
                prop_assert!(!scope.chars().any(char::is_whitespace));
            }
        }
    }
}
