//! Cache configuration.
//!
//! Settings apply to every read unless a [`FetchOptions`](crate::FetchOptions)
//! overrides them. Three ways to build one:
//!
//! ```
//! use revalidate_kit::config::CacheConfig;
//! use revalidate_kit::policy::CachePolicy;
//! use std::time::Duration;
//!
//! // In code
//! let config = CacheConfig::default()
//!     .with_default_policy(CachePolicy::Revalidate { seconds: 60.0 })
//!     .with_default_expire(Duration::from_secs(3600))
//!     .with_retry(2);
//!
//! // From JSON
//! let config = CacheConfig::from_json(r#"{
//!     "default_policy": { "kind": "revalidate", "seconds": 60 },
//!     "default_expire_secs": 3600,
//!     "retry_count": 2
//! }"#).unwrap();
//! assert_eq!(config.retry_count, 2);
//! ```
//!
//! or from `REVALIDATE_KIT_*` environment variables with
//! [`CacheConfig::from_env`].

use crate::error::{Error, Result};
use crate::policy::CachePolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default base delay between fetch retries.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;

const ENV_DEFAULT_POLICY: &str = "REVALIDATE_KIT_DEFAULT_POLICY";
const ENV_DEFAULT_EXPIRE_SECS: &str = "REVALIDATE_KIT_DEFAULT_EXPIRE_SECS";
const ENV_RETRY_COUNT: &str = "REVALIDATE_KIT_RETRY_COUNT";
const ENV_RETRY_BACKOFF_MS: &str = "REVALIDATE_KIT_RETRY_BACKOFF_MS";

/// Cache-wide defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Policy for reads that don't name one.
    pub default_policy: CachePolicy,

    /// Hard TTL for new entries, in seconds. `None` = entries never expire.
    pub default_expire_secs: Option<u64>,

    /// Extra fetch attempts after a failure (0 = no retry).
    pub retry_count: u32,

    /// Base delay for exponential backoff between attempts.
    pub retry_backoff_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            default_policy: CachePolicy::ForceCache,
            default_expire_secs: None,
            retry_count: 0,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl CacheConfig {
    /// Parse and validate a JSON config.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` for malformed JSON, or `Error::PolicyError`
    /// if the default policy is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: CacheConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read overrides from the environment on top of the defaults.
    ///
    /// - `REVALIDATE_KIT_DEFAULT_POLICY`: `no-store`, `force-cache` or `revalidate=<secs>`
    /// - `REVALIDATE_KIT_DEFAULT_EXPIRE_SECS`
    /// - `REVALIDATE_KIT_RETRY_COUNT`
    /// - `REVALIDATE_KIT_RETRY_BACKOFF_MS`
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if a variable is set but unparseable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = CacheConfig::default();

        if let Some(raw) = lookup(ENV_DEFAULT_POLICY) {
            config.default_policy = raw
                .parse()
                .map_err(|e| Error::ConfigError(format!("{}: {}", ENV_DEFAULT_POLICY, e)))?;
        }
        if let Some(raw) = lookup(ENV_DEFAULT_EXPIRE_SECS) {
            config.default_expire_secs = Some(parse_env(ENV_DEFAULT_EXPIRE_SECS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_RETRY_COUNT) {
            config.retry_count = parse_env(ENV_RETRY_COUNT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RETRY_BACKOFF_MS) {
            config.retry_backoff_ms = parse_env(ENV_RETRY_BACKOFF_MS, &raw)?;
        }

        config.validate()?;
        debug!("Loaded cache config from environment: {:?}", config);
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `Error::PolicyError` if the default policy or expiry is invalid.
    pub fn validate(&self) -> Result<()> {
        self.default_policy.validate()?;
        crate::policy::validate_expire(&self.default_policy, self.default_expire())
    }

    pub fn with_default_policy(mut self, policy: CachePolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn with_default_expire(mut self, expire: Duration) -> Self {
        self.default_expire_secs = Some(expire.as_secs());
        self
    }

    pub fn with_retry(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn default_expire(&self) -> Option<Duration> {
        self.default_expire_secs.map(Duration::from_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::ConfigError(format!("{}: {}", name, e)))
}
