//! Cache configuration.
//!
//! [`CacheOptions`] is the construction-time surface: plain millisecond
//! fields that deserialize from config files or the environment.
//! [`CachePolicy`] is the normalized, immutable form the engines run on.
//! Misconfiguration is normalized to safe defaults, never rejected.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::{millis, positive_millis};
use crate::constants::*;
use crate::error::{CacheError, Result};

/// Construction-time cache options, all in milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Refresh interval after a successful load
    pub expiration_ms: i64,
    /// Refresh interval after a failed load (<= 0: failures are not cached)
    pub expiration_on_err_ms: i64,
    /// Minimum spacing between refresh attempts (<= 0: one second)
    pub retry_interval_ms: i64,
    /// Longest a reader waits for the very first value (<= 0: no wait)
    pub wait_timeout_ms: i64,
    /// Idle time before a keyed entry is evicted (<= expiration: 2 x expiration)
    pub evict_timeout_ms: i64,
}

impl CacheOptions {
    /// Creates options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the refresh interval after a successful load.
    pub fn expiration_ms(mut self, ms: i64) -> Self {
        self.expiration_ms = ms;
        self
    }

    /// Sets the refresh interval after a failed load.
    pub fn expiration_on_err_ms(mut self, ms: i64) -> Self {
        self.expiration_on_err_ms = ms;
        self
    }

    /// Sets the minimum spacing between refresh attempts.
    pub fn retry_interval_ms(mut self, ms: i64) -> Self {
        self.retry_interval_ms = ms;
        self
    }

    /// Sets the first-load wait bound.
    pub fn wait_timeout_ms(mut self, ms: i64) -> Self {
        self.wait_timeout_ms = ms;
        self
    }

    /// Sets the idle eviction timeout (keyed caches only).
    pub fn evict_timeout_ms(mut self, ms: i64) -> Self {
        self.evict_timeout_ms = ms;
        self
    }

    /// Loads options from `<PREFIX>_EXPIRATION_MS`, `<PREFIX>_RETRY_INTERVAL_MS`, ...
    ///
    /// A `.env` file is honored if present. Missing variables keep their
    /// default; present but unparsable ones are an error.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            expiration_ms: env_millis(prefix, ENV_EXPIRATION_MS)?,
            expiration_on_err_ms: env_millis(prefix, ENV_EXPIRATION_ON_ERR_MS)?,
            retry_interval_ms: env_millis(prefix, ENV_RETRY_INTERVAL_MS)?,
            wait_timeout_ms: env_millis(prefix, ENV_WAIT_TIMEOUT_MS)?,
            evict_timeout_ms: env_millis(prefix, ENV_EVICT_TIMEOUT_MS)?,
        })
    }
}

fn env_millis(prefix: &str, suffix: &str) -> Result<i64> {
    let key = if prefix.is_empty() {
        suffix.to_string()
    } else {
        format!("{}_{}", prefix.trim_end_matches('_'), suffix)
    };

    match std::env::var(&key) {
        Ok(raw) => raw.trim().parse::<i64>().map_err(|e| CacheError::Config {
            key,
            reason: e.to_string(),
        }),
        Err(_) => Ok(0),
    }
}

/// Normalized refresh policy. Immutable once a cache is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    /// Refresh interval after a successful load.
    pub expiration: Duration,
    /// Refresh interval after a failed load; `None` leaves the entry due again
    /// after `retry_interval` without touching its value.
    pub expiration_on_err: Option<Duration>,
    /// Minimum spacing between refresh attempts, failed ones included.
    pub retry_interval: Duration,
    /// Longest a reader waits for an entry that has never produced a value.
    pub wait_timeout: Duration,
    /// Idle time after which a keyed entry is removed by the sweep.
    pub evict_timeout: Duration,
}

impl CachePolicy {
    /// Converts millisecond options once and applies the defaults.
    pub fn from_options(options: &CacheOptions) -> Self {
        Self {
            expiration: millis(options.expiration_ms),
            expiration_on_err: positive_millis(options.expiration_on_err_ms),
            retry_interval: millis(options.retry_interval_ms),
            wait_timeout: millis(options.wait_timeout_ms),
            evict_timeout: millis(options.evict_timeout_ms),
        }
        .normalized()
    }

    /// Applies the defaults to a hand-built policy.
    ///
    /// Caches run every policy through this, so a zero retry interval or
    /// evict timeout never reaches the refresh gate or the sweep.
    pub fn normalized(self) -> Self {
        let retry_interval = if self.retry_interval.is_zero() {
            DEFAULT_RETRY_INTERVAL
        } else {
            self.retry_interval
        };

        let mut evict_timeout = self.evict_timeout;
        if evict_timeout <= self.expiration {
            evict_timeout = self.expiration * DEFAULT_EVICT_MULTIPLIER;
        }
        // A zero sweep period cannot be scheduled.
        if evict_timeout.is_zero() {
            evict_timeout = retry_interval * DEFAULT_EVICT_MULTIPLIER;
        }

        Self {
            expiration_on_err: self.expiration_on_err.filter(|d| !d.is_zero()),
            retry_interval,
            evict_timeout,
            ..self
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from_options(&CacheOptions::default())
    }
}

impl From<CacheOptions> for CachePolicy {
    fn from(options: CacheOptions) -> Self {
        Self::from_options(&options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(0, 1000 ; "zero falls back to default")]
    #[test_case(-20, 1000 ; "negative falls back to default")]
    #[test_case(10, 10 ; "positive is kept")]
    fn test_retry_interval(ms: i64, expected_ms: u64) {
        let policy = CachePolicy::from_options(&CacheOptions::new().retry_interval_ms(ms));
        assert_eq!(policy.retry_interval, Duration::from_millis(expected_ms));
    }

    #[test_case(20, 30, 30 ; "longer than expiration is kept")]
    #[test_case(20, 0, 40 ; "unset doubles expiration")]
    #[test_case(20, 20, 40 ; "equal to expiration doubles expiration")]
    #[test_case(20, 5, 40 ; "shorter than expiration doubles expiration")]
    #[test_case(0, 0, 2000 ; "all zero falls back to retry interval")]
    fn test_evict_timeout(expiration: i64, evict: i64, expected_ms: u64) {
        let options = CacheOptions::new()
            .expiration_ms(expiration)
            .evict_timeout_ms(evict);
        let policy = CachePolicy::from_options(&options);
        assert_eq!(policy.evict_timeout, Duration::from_millis(expected_ms));
    }

    #[test]
    fn test_error_expiration_disabled_when_not_positive() {
        assert_eq!(CachePolicy::default().expiration_on_err, None);
        let policy = CachePolicy::from_options(&CacheOptions::new().expiration_on_err_ms(-1));
        assert_eq!(policy.expiration_on_err, None);
        let policy = CachePolicy::from_options(&CacheOptions::new().expiration_on_err_ms(40));
        assert_eq!(policy.expiration_on_err, Some(Duration::from_millis(40)));
    }

    #[test]
    fn test_hand_built_zero_policy_is_normalized() {
        let policy = CachePolicy {
            expiration: Duration::ZERO,
            expiration_on_err: Some(Duration::ZERO),
            retry_interval: Duration::ZERO,
            wait_timeout: Duration::ZERO,
            evict_timeout: Duration::ZERO,
        }
        .normalized();

        assert_eq!(policy.retry_interval, DEFAULT_RETRY_INTERVAL);
        assert_eq!(policy.evict_timeout, DEFAULT_RETRY_INTERVAL * 2);
        assert_eq!(policy.expiration_on_err, None);
    }

    #[test]
    fn test_normalized_keeps_valid_policy() {
        let policy = CachePolicy::from_options(
            &CacheOptions::new()
                .expiration_ms(20)
                .expiration_on_err_ms(5)
                .retry_interval_ms(10)
                .wait_timeout_ms(3)
                .evict_timeout_ms(30),
        );
        assert_eq!(policy.normalized(), policy);
    }

    #[test]
    fn test_negative_wait_timeout_is_no_wait() {
        let policy = CachePolicy::from_options(&CacheOptions::new().wait_timeout_ms(-3));
        assert_eq!(policy.wait_timeout, Duration::ZERO);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: CacheOptions =
            serde_json::from_str(r#"{"expiration_ms": 50, "wait_timeout_ms": 5}"#).unwrap();
        assert_eq!(options.expiration_ms, 50);
        assert_eq!(options.wait_timeout_ms, 5);
        assert_eq!(options.retry_interval_ms, 0);
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("WARMCACHE_TEST_ENV_EXPIRATION_MS", "250");
        std::env::set_var("WARMCACHE_TEST_ENV_WAIT_TIMEOUT_MS", " 7 ");
        let options = CacheOptions::from_env("WARMCACHE_TEST_ENV").unwrap();
        assert_eq!(options.expiration_ms, 250);
        assert_eq!(options.wait_timeout_ms, 7);
        assert_eq!(options.evict_timeout_ms, 0);
    }

    #[test]
    fn test_from_env_rejects_garbage() {
        std::env::set_var("WARMCACHE_TEST_BAD_RETRY_INTERVAL_MS", "soon");
        let err = CacheOptions::from_env("WARMCACHE_TEST_BAD_").unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("WARMCACHE_TEST_BAD_RETRY_INTERVAL_MS"));
    }

    proptest! {
        #[test]
        fn prop_policy_is_always_schedulable(
            expiration in -1_000i64..100_000,
            evict in -1_000i64..100_000,
            retry in -1_000i64..100_000,
        ) {
            let policy = CachePolicy::from_options(
                &CacheOptions::new()
                    .expiration_ms(expiration)
                    .evict_timeout_ms(evict)
                    .retry_interval_ms(retry),
            );
            prop_assert!(!policy.retry_interval.is_zero());
            prop_assert!(!policy.evict_timeout.is_zero());
            prop_assert!(policy.evict_timeout > policy.expiration);
        }
    }
}
