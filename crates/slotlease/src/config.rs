//! Lease protocol configuration.
//!
//! Supports serde deserialization (every field has a default) and loading
//! from `SLOTLEASE_*` environment variables, with validation.
//!
//! All participants coordinating on the same target must agree on
//! `key_prefix` and `concurrency_limit`. Nothing in the protocol detects a
//! mismatch; it is a deployment invariant.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_CONCURRENCY_LIMIT;
use crate::constants::DEFAULT_KEY_PREFIX;
use crate::constants::DEFAULT_LEASE_TTL_MS;
use crate::constants::DEFAULT_RETRY_BACKOFF_MS;
use crate::constants::MAX_CONCURRENCY_LIMIT;
use crate::constants::MIN_LEASE_TTL_MS;

/// Default values for configuration
mod defaults {
    pub fn key_prefix() -> String {
        super::DEFAULT_KEY_PREFIX.to_string()
    }
    pub fn concurrency_limit() -> u32 {
        super::DEFAULT_CONCURRENCY_LIMIT
    }
    pub fn lease_ttl_ms() -> u64 {
        super::DEFAULT_LEASE_TTL_MS
    }
    pub fn retry_backoff_ms() -> u64 {
        super::DEFAULT_RETRY_BACKOFF_MS
    }
}

/// Environment variable names.
pub mod env {
    pub const KEY_PREFIX: &str = "SLOTLEASE_KEY_PREFIX";
    pub const CONCURRENCY_LIMIT: &str = "SLOTLEASE_CONCURRENCY_LIMIT";
    pub const LEASE_TTL_MS: &str = "SLOTLEASE_LEASE_TTL_MS";
    pub const RETRY_BACKOFF_MS: &str = "SLOTLEASE_RETRY_BACKOFF_MS";
    pub const OVERALL_DEADLINE_MS: &str = "SLOTLEASE_OVERALL_DEADLINE_MS";
}

/// Configuration for a [`LeaseManager`](crate::LeaseManager) and the
/// sessions built on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Namespace for slot keys in the store.
    #[serde(default = "defaults::key_prefix")]
    pub key_prefix: String,
    /// Slots per target (C). Must be identical across all participants.
    #[serde(default = "defaults::concurrency_limit")]
    pub concurrency_limit: u32,
    /// Lease lifetime granted by each acquire and renewal.
    #[serde(default = "defaults::lease_ttl_ms")]
    pub lease_ttl_ms: u64,
    /// Sleep between acquire attempts in a managed session.
    #[serde(default = "defaults::retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// How long a managed session keeps retrying. `None` retries forever.
    #[serde(default)]
    pub overall_deadline_ms: Option<u64>,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            key_prefix: defaults::key_prefix(),
            concurrency_limit: defaults::concurrency_limit(),
            lease_ttl_ms: defaults::lease_ttl_ms(),
            retry_backoff_ms: defaults::retry_backoff_ms(),
            overall_deadline_ms: None,
        }
    }
}

impl LeaseConfig {
    /// Load configuration from `SLOTLEASE_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Missing variables fall back to defaults. The result is validated.
    pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = Self {
            key_prefix: lookup(env::KEY_PREFIX).unwrap_or_else(defaults::key_prefix),
            concurrency_limit: parse_var(&lookup, env::CONCURRENCY_LIMIT, defaults::concurrency_limit())?,
            lease_ttl_ms: parse_var(&lookup, env::LEASE_TTL_MS, defaults::lease_ttl_ms())?,
            retry_backoff_ms: parse_var(&lookup, env::RETRY_BACKOFF_MS, defaults::retry_backoff_ms())?,
            overall_deadline_ms: parse_deadline(&lookup)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every field against its bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_prefix.is_empty()
            || !self.key_prefix.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        {
            return Err(invalid(env::KEY_PREFIX, &self.key_prefix, "must be non-empty [A-Za-z0-9_-]"));
        }
        if self.concurrency_limit == 0 || self.concurrency_limit > MAX_CONCURRENCY_LIMIT {
            return Err(invalid(
                env::CONCURRENCY_LIMIT,
                self.concurrency_limit,
                format!("must be between 1 and {MAX_CONCURRENCY_LIMIT}"),
            ));
        }
        if self.lease_ttl_ms < MIN_LEASE_TTL_MS {
            return Err(invalid(env::LEASE_TTL_MS, self.lease_ttl_ms, format!("must be at least {MIN_LEASE_TTL_MS}ms")));
        }
        Ok(())
    }

    /// Set the concurrency limit.
    pub fn with_concurrency_limit(mut self, limit: u32) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Set the lease time-to-live.
    pub fn with_lease_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.lease_ttl_ms = ttl_ms;
        self
    }

    /// Set the backoff between session acquire attempts.
    pub fn with_retry_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.retry_backoff_ms = backoff_ms;
        self
    }

    /// Set the overall session deadline (`None` = unbounded).
    pub fn with_overall_deadline_ms(mut self, deadline_ms: Option<u64>) -> Self {
        self.overall_deadline_ms = deadline_ms;
        self
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Overall session deadline as a duration.
    pub fn overall_deadline(&self) -> Option<Duration> {
        self.overall_deadline_ms.map(Duration::from_millis)
    }
}

fn parse_var<V>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: V) -> Result<V, ConfigError>
where
    V: std::str::FromStr,
    V::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<V>().map_err(|e| invalid(key, &raw, e.to_string())),
    }
}

/// `none`, `inf` and `infinite` mean no deadline.
fn parse_deadline(lookup: &impl Fn(&str) -> Option<String>) -> Result<Option<u64>, ConfigError> {
    match lookup(env::OVERALL_DEADLINE_MS) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "inf" | "infinite" => Ok(None),
            value => value
                .parse::<u64>()
                .map(Some)
                .map_err(|e| invalid(env::OVERALL_DEADLINE_MS, &raw, e.to_string())),
        },
    }
}

fn invalid(key: &str, value: impl fmt::Display, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Configuration error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A configuration value is invalid
    InvalidValue { key: String, value: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue { key, value, reason } => {
                write!(f, "Invalid configuration for {}: '{}' ({})", key, value, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = LeaseConfig::default();
        config.validate().unwrap();
        assert_eq!(config.key_prefix, "slotlease");
        assert_eq!(config.concurrency_limit, 1);
        assert_eq!(config.overall_deadline(), None);
    }

    #[test]
    fn test_load_from_empty_env_uses_defaults() {
        let config = LeaseConfig::load_from(lookup_in(&[])).unwrap();
        assert_eq!(config, LeaseConfig::default());
    }

    #[test]
    fn test_load_from_env() {
        let config = LeaseConfig::load_from(lookup_in(&[
            (env::KEY_PREFIX, "jobs"),
            (env::CONCURRENCY_LIMIT, "4"),
            (env::LEASE_TTL_MS, "10000"),
            (env::RETRY_BACKOFF_MS, "250"),
            (env::OVERALL_DEADLINE_MS, "5000"),
        ]))
        .unwrap();

        assert_eq!(config.key_prefix, "jobs");
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.lease_ttl_ms, 10_000);
        assert_eq!(config.retry_backoff_ms, 250);
        assert_eq!(config.overall_deadline(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_infinite_deadline_spellings() {
        for raw in ["none", "INF", "infinite", ""] {
            let config = LeaseConfig::load_from(lookup_in(&[(env::OVERALL_DEADLINE_MS, raw)])).unwrap();
            assert_eq!(config.overall_deadline_ms, None, "{raw:?} should mean no deadline");
        }
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = LeaseConfig::load_from(lookup_in(&[(env::CONCURRENCY_LIMIT, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == env::CONCURRENCY_LIMIT));

        let err = LeaseConfig::load_from(lookup_in(&[(env::CONCURRENCY_LIMIT, "two")])).unwrap_err();
        assert!(err.to_string().contains("SLOTLEASE_CONCURRENCY_LIMIT"));

        assert!(LeaseConfig::load_from(lookup_in(&[(env::LEASE_TTL_MS, "1")])).is_err());
        assert!(LeaseConfig::load_from(lookup_in(&[(env::KEY_PREFIX, "a:b")])).is_err());
        assert!(LeaseConfig::load_from(lookup_in(&[(env::OVERALL_DEADLINE_MS, "soon")])).is_err());
        assert!(LeaseConfig::default().with_concurrency_limit(MAX_CONCURRENCY_LIMIT + 1).validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: LeaseConfig =
            serde_json::from_str(r#"{"concurrency_limit": 3, "overall_deadline_ms": 2000}"#).unwrap();
        assert_eq!(config.concurrency_limit, 3);
        assert_eq!(config.lease_ttl_ms, DEFAULT_LEASE_TTL_MS);
        assert_eq!(config.overall_deadline_ms, Some(2000));
    }
}
