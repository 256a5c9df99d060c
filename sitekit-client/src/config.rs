//! Client configuration.
//!
//! [`RequestConfig`] is fixed for the lifetime of an [`ApiClient`](crate::ApiClient).
//! Build it in code with [`RequestConfig::builder`] or load it from YAML:
//!
//! ```
//! use sitekit_client::{CachePolicy, RequestConfig};
//! use std::time::Duration;
//!
//! let config = RequestConfig::from_yaml(
//!     r#"
//! base_url: https://api.example.com
//! timeout: 10s
//! retries: 2
//! retry_delay: 250ms
//! cache:
//!   Enabled:
//!     ttl: 1m
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.timeout, Duration::from_secs(10));
//! assert_eq!(config.cache.ttl(), Some(Duration::from_secs(60)));
//! # let _ = CachePolicy::Disabled;
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Errors raised while loading or validating a [`RequestConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The YAML document could not be parsed.
    #[error("failed to parse client configuration: {0}")]
    Parse(#[from] serde_saphyr::Error),

    /// The base URL is empty or is not an absolute http(s) URL.
    #[error("invalid base url `{0}`: expected an absolute http(s) url")]
    InvalidBaseUrl(String),

    /// A default header has an invalid name or value.
    #[error("invalid default header `{0}`")]
    InvalidHeader(String),
}

/// Settings of the response cache when it is turned on.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct EnabledCacheConfig {
    /// How long a cached response stays valid (e.g. "30s", "5m").
    /// `None` keeps entries until they are invalidated.
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub ttl: Option<Duration>,
    /// Upper bound on the number of cached responses.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

impl Default for EnabledCacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
            max_entries: None,
        }
    }
}

/// Whether GET responses are cached, and how.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub enum CachePolicy {
    /// Cache successful GET responses.
    Enabled(EnabledCacheConfig),
    /// Never cache.
    Disabled,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::Enabled(EnabledCacheConfig::default())
    }
}

impl CachePolicy {
    /// Returns `true` if the cache is turned on.
    pub fn is_enabled(&self) -> bool {
        matches!(self, CachePolicy::Enabled(_))
    }

    /// Time-to-live of cached entries, if caching is enabled and bounded.
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            CachePolicy::Enabled(config) => config.ttl,
            CachePolicy::Disabled => None,
        }
    }

    /// Capacity bound of the cache, if any.
    pub fn max_entries(&self) -> Option<usize> {
        match self {
            CachePolicy::Enabled(config) => config.max_entries,
            CachePolicy::Disabled => None,
        }
    }
}

/// Immutable configuration of an [`ApiClient`](crate::ApiClient).
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RequestConfig {
    /// Prefix prepended to every endpoint, e.g. `https://api.example.com/v1`.
    pub base_url: String,
    /// Headers sent with every request. Per-call headers override these.
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,
    /// Per-attempt timeout.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Number of extra attempts after a 5xx response or a transport failure.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Fixed pause between attempts.
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Response cache policy for GET requests.
    #[serde(default)]
    pub cache: CachePolicy,
}

fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([("Content-Type".to_owned(), "application/json".to_owned())])
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

fn default_cache_ttl() -> Option<Duration> {
    Some(DEFAULT_CACHE_TTL)
}

impl RequestConfig {
    /// Creates a configuration with default settings for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: default_headers(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            cache: CachePolicy::default(),
        }
    }

    /// Starts a [`RequestConfigBuilder`].
    pub fn builder(base_url: impl Into<String>) -> RequestConfigBuilder {
        RequestConfigBuilder {
            config: Self::new(base_url),
        }
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_saphyr::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the base URL and converts the default headers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.header_map().map(|_| ())?;
        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://"))
            || base.parse::<http::Uri>().is_err()
        {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        Ok(())
    }

    pub(crate) fn header_map(&self) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ConfigError::InvalidHeader(name.clone()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| ConfigError::InvalidHeader(name.clone()))?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }
}

/// Builder for [`RequestConfig`].
#[derive(Debug, Clone)]
pub struct RequestConfigBuilder {
    config: RequestConfig,
}

impl RequestConfigBuilder {
    /// Adds or replaces a default header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the number of extra attempts.
    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    /// Sets the pause between attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Sets the cache policy.
    pub fn cache(mut self, cache: CachePolicy) -> Self {
        self.config.cache = cache;
        self
    }

    /// Enables the cache with the given TTL.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        let max_entries = self.config.cache.max_entries();
        self.config.cache = CachePolicy::Enabled(EnabledCacheConfig {
            ttl: Some(ttl),
            max_entries,
        });
        self
    }

    /// Turns caching off.
    pub fn no_cache(mut self) -> Self {
        self.config.cache = CachePolicy::Disabled;
        self
    }

    /// Finishes the builder.
    pub fn build(self) -> RequestConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_minimal_yaml() {
        let config = RequestConfig::from_yaml("base_url: https://example.com").unwrap();
        assert_eq!(config, RequestConfig::new("https://example.com"));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retries, 3);
        assert_eq!(config.cache.ttl(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_disabled_cache_from_yaml() {
        let yaml = r#"
        base_url: http://localhost:8080
        cache: Disabled
        "#;
        let config = RequestConfig::from_yaml(yaml).unwrap();
        assert!(!config.cache.is_enabled());
        assert_eq!(config.cache.ttl(), None);
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let err = RequestConfig::from_yaml("base_url: not a url").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl(_)));
    }

    #[test]
    fn test_invalid_header_rejected() {
        let config = RequestConfig::builder("https://example.com")
            .header("bad header", "x")
            .build();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHeader(name)) if name == "bad header"
        ));
    }

    #[test]
    fn test_builder_keeps_capacity_when_setting_ttl() {
        let config = RequestConfig::builder("https://example.com")
            .cache(CachePolicy::Enabled(EnabledCacheConfig {
                ttl: None,
                max_entries: Some(16),
            }))
            .cache_ttl(Duration::from_secs(5))
            .build();
        assert_eq!(config.cache.max_entries(), Some(16));
        assert_eq!(config.cache.ttl(), Some(Duration::from_secs(5)));
    }
}
