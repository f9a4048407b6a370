//! Service configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::time::Duration;

use crate::error::QueryError;
use crate::retry::RetryPolicy;

/// Default conversation scope when the caller omits one.
const DEFAULT_CONVERSATION_ID: &str = "default";
/// Default maximum concurrent in-flight transport calls.
const DEFAULT_MAX_CONCURRENCY: usize = 5;
/// Default cache TTL in milliseconds.
const DEFAULT_CACHE_TTL_MS: u64 = 300_000;
/// Default cache capacity.
const DEFAULT_MAX_CACHE_SIZE: usize = 100;
/// Default recursion depth bound. Matches the generator's ceiling so a
/// single configured value governs both.
const DEFAULT_MAX_QUERY_DEPTH: usize = 4;
/// Default pending follow-up queue bound.
const DEFAULT_MAX_QUEUE_SIZE: usize = 10;
/// Default per-call timeout in milliseconds.
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 30_000;
/// Lowest accepted per-call timeout.
const MIN_QUERY_TIMEOUT_MS: u64 = 100;

/// Configuration for the agent communication service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Agent endpoint URL.
    pub endpoint: String,
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Conversation id used when the caller does not supply one.
    pub default_conversation_id: String,
    /// Whether responses are cached at all.
    pub enable_caching: bool,
    /// How long a cached response stays valid.
    pub cache_ttl: Duration,
    /// Maximum cache entries before insertion-order eviction.
    pub max_cache_size: usize,
    /// Maximum recursion depth for a query chain. Also caps the
    /// follow-up generator, so there is a single depth bound.
    pub max_query_depth: usize,
    /// Maximum pending follow-up queries per chain.
    pub max_queue_size: usize,
    /// Per-call deadline on the transport call.
    pub query_timeout: Duration,
    /// Whether follow-up queries are issued automatically.
    pub enable_auto_follow: bool,
    /// Ceiling on concurrently in-flight transport calls.
    pub max_concurrency: usize,
    /// Retry behavior for transient transport failures.
    pub retry: RetryPolicy,
}

impl ServiceConfig {
    /// Creates a new builder for `ServiceConfig`.
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Configuration`] if the endpoint or API key
    /// is missing, or any bound is out of range.
    pub fn from_env() -> Result<Self, QueryError> {
        Self::builder().from_env().build()
    }

    /// Validates all configured bounds.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Configuration`] naming the first bound that
    /// is out of range.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.endpoint.trim().is_empty() {
            return Err(QueryError::Configuration {
                message: "endpoint must not be empty".to_string(),
            });
        }
        if self.api_key.trim().is_empty() {
            return Err(QueryError::Configuration {
                message: "api_key must not be empty".to_string(),
            });
        }
        if self.max_query_depth < 1 {
            return Err(QueryError::Configuration {
                message: "max_query_depth must be at least 1".to_string(),
            });
        }
        if self.max_queue_size < 1 {
            return Err(QueryError::Configuration {
                message: "max_queue_size must be at least 1".to_string(),
            });
        }
        if self.query_timeout < Duration::from_millis(MIN_QUERY_TIMEOUT_MS) {
            return Err(QueryError::Configuration {
                message: format!("query_timeout must be at least {MIN_QUERY_TIMEOUT_MS}ms"),
            });
        }
        if self.max_concurrency < 1 {
            return Err(QueryError::Configuration {
                message: "max_concurrency must be at least 1".to_string(),
            });
        }
        self.retry.validate()
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug, Clone, Default)]
pub struct ServiceConfigBuilder {
    endpoint: Option<String>,
    api_key: Option<String>,
    default_conversation_id: Option<String>,
    enable_caching: Option<bool>,
    cache_ttl: Option<Duration>,
    max_cache_size: Option<usize>,
    max_query_depth: Option<usize>,
    max_queue_size: Option<usize>,
    query_timeout: Option<Duration>,
    enable_auto_follow: Option<bool>,
    max_concurrency: Option<usize>,
    retry: Option<RetryPolicy>,
}

impl ServiceConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.endpoint.is_none() {
            self.endpoint = std::env::var("QUERYCHAIN_ENDPOINT").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("QUERYCHAIN_API_KEY")
                .or_else(|_| std::env::var("AGENT_API_KEY"))
                .ok();
        }
        if self.default_conversation_id.is_none() {
            self.default_conversation_id = std::env::var("QUERYCHAIN_CONVERSATION_ID").ok();
        }
        if self.max_query_depth.is_none() {
            self.max_query_depth = std::env::var("QUERYCHAIN_MAX_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.max_concurrency.is_none() {
            self.max_concurrency = std::env::var("QUERYCHAIN_MAX_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.cache_ttl.is_none() {
            self.cache_ttl = std::env::var("QUERYCHAIN_CACHE_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis);
        }
        if self.query_timeout.is_none() {
            self.query_timeout = std::env::var("QUERYCHAIN_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis);
        }
        self
    }

    /// Sets the agent endpoint URL.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the default conversation id.
    #[must_use]
    pub fn default_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.default_conversation_id = Some(id.into());
        self
    }

    /// Enables or disables response caching.
    #[must_use]
    pub const fn enable_caching(mut self, enabled: bool) -> Self {
        self.enable_caching = Some(enabled);
        self
    }

    /// Sets the cache TTL.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Sets the cache capacity.
    #[must_use]
    pub const fn max_cache_size(mut self, n: usize) -> Self {
        self.max_cache_size = Some(n);
        self
    }

    /// Sets the recursion depth bound.
    #[must_use]
    pub const fn max_query_depth(mut self, n: usize) -> Self {
        self.max_query_depth = Some(n);
        self
    }

    /// Sets the pending follow-up queue bound.
    #[must_use]
    pub const fn max_queue_size(mut self, n: usize) -> Self {
        self.max_queue_size = Some(n);
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub const fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Enables or disables automatic follow-up queries.
    #[must_use]
    pub const fn enable_auto_follow(mut self, enabled: bool) -> Self {
        self.enable_auto_follow = Some(enabled);
        self
    }

    /// Sets the in-flight concurrency ceiling.
    #[must_use]
    pub const fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Builds and validates the [`ServiceConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Configuration`] if the endpoint or API key
    /// was not set, or any bound fails validation.
    pub fn build(self) -> Result<ServiceConfig, QueryError> {
        let endpoint = self.endpoint.ok_or_else(|| QueryError::Configuration {
            message: "endpoint is required (set QUERYCHAIN_ENDPOINT)".to_string(),
        })?;
        let api_key = self.api_key.ok_or_else(|| QueryError::Configuration {
            message: "api_key is required (set QUERYCHAIN_API_KEY)".to_string(),
        })?;

        let config = ServiceConfig {
            endpoint,
            api_key,
            default_conversation_id: self
                .default_conversation_id
                .unwrap_or_else(|| DEFAULT_CONVERSATION_ID.to_string()),
            enable_caching: self.enable_caching.unwrap_or(true),
            cache_ttl: self
                .cache_ttl
                .unwrap_or(Duration::from_millis(DEFAULT_CACHE_TTL_MS)),
            max_cache_size: self.max_cache_size.unwrap_or(DEFAULT_MAX_CACHE_SIZE),
            max_query_depth: self.max_query_depth.unwrap_or(DEFAULT_MAX_QUERY_DEPTH),
            max_queue_size: self.max_queue_size.unwrap_or(DEFAULT_MAX_QUEUE_SIZE),
            query_timeout: self
                .query_timeout
                .unwrap_or(Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS)),
            enable_auto_follow: self.enable_auto_follow.unwrap_or(true),
            max_concurrency: self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
            retry: self.retry.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }
}
