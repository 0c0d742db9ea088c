//! Per-token attempt limiting
//!
//! Every verification attempt is counted against a sliding window keyed by a
//! [`TokenFingerprint`], a truncated SHA-256 digest of the raw token. The raw
//! token is never stored.
//!
//! ## Policy
//!
//! - Default: 10 admitted attempts per 60 seconds; the 11th is rejected
//! - Successful and failed verifications count alike
//! - Rejected attempts do not extend the window
//! - State lives in memory and is scoped to one process
//!
//! Admission is atomic per key: the `DashMap` entry lock is held across the
//! prune, count and push, so two concurrent attempts at the boundary cannot
//! both be admitted.
//!
//! ## Usage
//!
//! ```rust
//! use toolgate_auth::rate_limit::{RateLimiter, RateLimitConfig, TokenFingerprint};
//! use std::time::Duration;
//!
//! let limiter = RateLimiter::new(RateLimitConfig::new(3, Duration::from_secs(60)));
//! let key = TokenFingerprint::of("some-bearer-token");
//!
//! for _ in 0..3 {
//!     assert!(limiter.check(&key).is_ok());
//! }
//! let info = limiter.check(&key).unwrap_err();
//! assert_eq!(info.limit, 3);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

/// Hex characters of the SHA-256 digest kept in a fingerprint
pub const FINGERPRINT_HEX_LEN: usize = 16;

/// Default number of attempts admitted per window
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default window length
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// One-way identifier for a raw token, safe to log and to use as a map key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenFingerprint(String);

impl TokenFingerprint {
    /// Fingerprint a raw token: first [`FINGERPRINT_HEX_LEN`] hex chars of SHA-256
    pub fn of(token: &str) -> Self {
        let digest = Sha256::digest(token.as_bytes());
        let mut hex = String::with_capacity(FINGERPRINT_HEX_LEN);
        for byte in digest.iter().take(FINGERPRINT_HEX_LEN / 2) {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    /// The hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Attempts admitted per window
    pub max_attempts: u32,
    /// Window length
    #[serde(with = "crate::config::duration_secs")]
    pub window: Duration,
    /// Whether limiting is enforced
    pub enabled: bool,
    /// How often idle keys are purged
    #[serde(with = "crate::config::duration_secs")]
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: DEFAULT_WINDOW,
            enabled: true,
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

impl RateLimitConfig {
    /// Enabled limiter with a custom policy
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            ..Self::default()
        }
    }

    /// Limiter that admits everything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set the cleanup interval
    #[must_use]
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

/// Information about a rejected attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Time until the oldest counted attempt leaves the window
    pub retry_after: Duration,
    /// Attempts counted in the window
    pub current_count: u32,
    /// Maximum admitted attempts
    pub limit: u32,
    /// Window length
    pub window: Duration,
}

impl fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rate limited: {}/{} attempts in {:?}, retry after {:?}",
            self.current_count, self.limit, self.window, self.retry_after
        )
    }
}

impl std::error::Error for RateLimitInfo {}

/// Admitted attempt timestamps for one key, oldest first
#[derive(Debug, Default)]
struct AttemptWindow {
    timestamps: VecDeque<Instant>,
}

impl AttemptWindow {
    fn prune(&mut self, now: Instant, window: Duration) {
        let Some(window_start) = now.checked_sub(window) else {
            return;
        };
        while self
            .timestamps
            .front()
            .is_some_and(|&t| t <= window_start)
        {
            self.timestamps.pop_front();
        }
    }
}

/// Sliding-window limiter owned by one verifier instance
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: DashMap<TokenFingerprint, AttemptWindow>,
    last_cleanup: Mutex<Instant>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    /// Create a limiter with the given policy
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            last_cleanup: Mutex::new(Instant::now()),
        }
    }

    /// Limiter that admits everything
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::disabled())
    }

    /// Active policy
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Record an attempt for `key`, admitting it if the window has room
    ///
    /// Returns `Err(RateLimitInfo)` when the attempt is over the limit.
    pub fn check(&self, key: &TokenFingerprint) -> Result<(), RateLimitInfo> {
        if !self.config.enabled {
            return Ok(());
        }

        let now = Instant::now();
        // Must run before the entry lock below is taken
        self.maybe_cleanup(now);

        let mut entry = self.entries.entry(key.clone()).or_default();
        entry.prune(now, self.config.window);

        let current_count = entry.timestamps.len() as u32;
        if current_count >= self.config.max_attempts {
            let oldest = entry.timestamps.front().copied().unwrap_or(now);
            let retry_after = self.config.window.saturating_sub(now - oldest);

            crate::auth_metrics::record_rate_limited();

            return Err(RateLimitInfo {
                retry_after,
                current_count,
                limit: self.config.max_attempts,
                window: self.config.window,
            });
        }

        entry.timestamps.push_back(now);
        Ok(())
    }

    /// Attempts currently counted for `key`, with the limit
    pub fn usage(&self, key: &TokenFingerprint) -> Option<(u32, u32)> {
        let now = Instant::now();
        self.entries.get(key).map(|entry| {
            let window_start = now.checked_sub(self.config.window);
            let current = entry
                .timestamps
                .iter()
                .filter(|&&t| window_start.is_none_or(|start| t > start))
                .count() as u32;
            (current, self.config.max_attempts)
        })
    }

    /// Forget all attempts for `key`
    pub fn reset(&self, key: &TokenFingerprint) {
        self.entries.remove(key);
    }

    /// Forget all attempts
    pub fn reset_all(&self) {
        self.entries.clear();
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    fn maybe_cleanup(&self, now: Instant) {
        // Another thread is already cleaning up
        let Some(mut last_cleanup) = self.last_cleanup.try_lock() else {
            return;
        };
        if now.duration_since(*last_cleanup) < self.config.cleanup_interval {
            return;
        }

        let window = self.config.window;
        self.entries.retain(|_, attempts| {
            attempts.prune(now, window);
            !attempts.timestamps.is_empty()
        });
        *last_cleanup = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_rate_limiter_allows_under_limit() {
        let limiter = RateLimiter::new(RateLimitConfig::new(5, Duration::from_secs(60)));
        let key = TokenFingerprint::of("token-a");

        for _ in 0..5 {
            assert!(limiter.check(&key).is_ok());
        }
    }

    #[tokio::test]
    async fn test_default_policy_rejects_eleventh_attempt() {
        let limiter = RateLimiter::default();
        let key = TokenFingerprint::of("token-a");

        for i in 0..10 {
            assert!(limiter.check(&key).is_ok(), "attempt {} should pass", i + 1);
        }

        let info = limiter.check(&key).unwrap_err();
        assert_eq!(info.current_count, 10);
        assert_eq!(info.limit, 10);
        assert_eq!(info.window, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(RateLimitConfig::new(2, Duration::from_secs(60)));
        let key = TokenFingerprint::of("token-a");

        assert!(limiter.check(&key).is_ok());
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.check(&key).is_ok());
        assert!(limiter.check(&key).is_err());

        // First attempt leaves the window
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(limiter.check(&key).is_ok());
        assert!(limiter.check(&key).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_attempts_do_not_extend_window() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(60)));
        let key = TokenFingerprint::of("token-a");

        assert!(limiter.check(&key).is_ok());
        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(10)).await;
            assert!(limiter.check(&key).is_err());
        }
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(limiter.check(&key).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(60)));
        let key = TokenFingerprint::of("token-a");

        assert!(limiter.check(&key).is_ok());
        tokio::time::advance(Duration::from_secs(20)).await;
        let info = limiter.check(&key).unwrap_err();
        assert_eq!(info.retry_after, Duration::from_secs(40));
    }

    #[tokio::test]
    async fn test_rate_limiter_disabled() {
        let limiter = RateLimiter::disabled();
        let key = TokenFingerprint::of("token-a");

        for _ in 0..1000 {
            assert!(limiter.check(&key).is_ok());
        }
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_rate_limiter_different_keys() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(60)));
        let key1 = TokenFingerprint::of("token-a");
        let key2 = TokenFingerprint::of("token-b");

        assert!(limiter.check(&key1).is_ok());
        assert!(limiter.check(&key2).is_ok());

        assert!(limiter.check(&key1).is_err());
        assert!(limiter.check(&key2).is_err());
    }

    #[tokio::test]
    async fn test_rate_limiter_reset() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(60)));
        let key = TokenFingerprint::of("token-a");

        assert!(limiter.check(&key).is_ok());
        assert!(limiter.check(&key).is_err());

        limiter.reset(&key);
        assert!(limiter.check(&key).is_ok());
    }

    #[tokio::test]
    async fn test_usage() {
        let limiter = RateLimiter::new(RateLimitConfig::new(10, Duration::from_secs(60)));
        let key = TokenFingerprint::of("token-a");

        assert!(limiter.usage(&key).is_none());

        limiter.check(&key).ok();
        limiter.check(&key).ok();
        limiter.check(&key).ok();

        assert_eq!(limiter.usage(&key), Some((3, 10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_purges_idle_keys() {
        let limiter = RateLimiter::new(
            RateLimitConfig::new(5, Duration::from_secs(60))
                .with_cleanup_interval(Duration::from_secs(120)),
        );
        limiter.check(&TokenFingerprint::of("idle")).ok();
        assert_eq!(limiter.tracked_keys(), 1);

        tokio::time::advance(Duration::from_secs(121)).await;
        limiter.check(&TokenFingerprint::of("fresh")).ok();
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_attempts_admit_exactly_limit() {
        let limiter = Arc::new(RateLimiter::default());
        let key = TokenFingerprint::of("shared-token");

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let key = key.clone();
                tokio::spawn(async move { limiter.check(&key).is_ok() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = TokenFingerprint::of("abc");
        assert_eq!(a, TokenFingerprint::of("abc"));
        assert_eq!(a.as_str(), "ba7816bf8f01cfea");
        assert_ne!(a, TokenFingerprint::of("abd"));
    }

    proptest! {
        #[test]
        fn prop_fingerprint_never_contains_token(token in "[A-Za-z0-9._-]{20,80}") {
            let fp = TokenFingerprint::of(&token);
            prop_assert_eq!(fp.as_str().len(), FINGERPRINT_HEX_LEN);
            prop_assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
            prop_assert!(!token.contains(fp.as_str()) || token.len() < FINGERPRINT_HEX_LEN);
        }
    }
}
