//! Agent communication service.
//!
//! The façade that composes the orchestration core: response cache in
//! front, a semaphore admission gate bounding in-flight transport calls,
//! the retry executor around every network call, and the recursive query
//! manager for multi-step chains. Constructed explicitly once at startup
//! and shared by reference; there is no global instance.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::cache::{CacheStats, ResponseCache};
use crate::config::ServiceConfig;
use crate::error::QueryError;
use crate::payload::{extract_payload, generate_follow_up_query, should_follow_up};
use crate::recursion::{QueryExecutor, QueryStats, RecursiveQueryManager};
use crate::retry::execute_with_retry;
use crate::transport::{AgentRequest, AgentTransport, HttpTransport};
use crate::types::{AgentResponse, QueryResult};

/// Maximum byte length of a query string.
const MAX_QUERY_LEN: usize = 10_000;

/// Orchestrates queries against a remote conversational agent.
///
/// All calls on one instance share the response cache, the admission
/// gate, and the aggregate counters. The instance is `Send + Sync`; pass
/// it by reference (or `Arc`) to every call site.
pub struct AgentService {
    config: ServiceConfig,
    transport: Arc<dyn AgentTransport>,
    cache: Mutex<ResponseCache>,
    admission: Semaphore,
    in_flight: AtomicUsize,
    recursion: RecursiveQueryManager,
}

impl AgentService {
    /// Creates a service over an explicit transport.
    #[must_use]
    pub fn new(config: ServiceConfig, transport: Arc<dyn AgentTransport>) -> Self {
        let cache = ResponseCache::new(
            config.cache_ttl,
            config.max_cache_size,
            config.enable_caching,
        );
        let recursion = RecursiveQueryManager::new(
            config.max_query_depth,
            config.max_queue_size,
            config.enable_auto_follow,
        );
        let admission = Semaphore::new(config.max_concurrency);
        info!(
            endpoint = %config.endpoint,
            transport = transport.name(),
            max_concurrency = config.max_concurrency,
            "agent service ready"
        );
        Self {
            config,
            transport,
            cache: Mutex::new(cache),
            admission,
            in_flight: AtomicUsize::new(0),
            recursion,
        }
    }

    /// Creates a service with the production HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Configuration`] if the HTTP client cannot
    /// be constructed.
    pub fn from_config(config: ServiceConfig) -> Result<Self, QueryError> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::new(config, transport))
    }

    /// Executes a single query.
    ///
    /// Cache check first: a live hit returns immediately with
    /// `cached: true` and no network call. On a miss the transport call
    /// passes through admission and retry, the response is cached, and
    /// any follow-up signal is surfaced in `follow_up_queries` without
    /// being executed.
    ///
    /// # Errors
    ///
    /// The final classified [`QueryError`] after retries are exhausted,
    /// or a fail-fast validation/configuration error.
    pub async fn execute_query(
        &self,
        query: &str,
        conversation_id: Option<&str>,
    ) -> Result<QueryResult, QueryError> {
        self.execute_step(query, conversation_id, 0).await
    }

    /// Executes a query and automatically follows pagination or
    /// incompleteness signals, up to the configured depth and queue
    /// bounds.
    ///
    /// Every step of the chain independently goes through cache,
    /// admission, and retry.
    ///
    /// # Errors
    ///
    /// The first step failure aborts the chain; no partial results are
    /// returned.
    pub async fn execute_recursive_queries(
        &self,
        query: &str,
        conversation_id: Option<&str>,
    ) -> Result<Vec<QueryResult>, QueryError> {
        let conversation = self.resolve_conversation(conversation_id);
        let executor = ServiceStepExecutor {
            service: self,
            conversation,
        };
        self.recursion
            .execute_recursive_queries(query, &executor)
            .await
    }

    /// One orchestrated step: validation, cache, admission, retry,
    /// cache write, follow-up surface.
    async fn execute_step(
        &self,
        query: &str,
        conversation_id: Option<&str>,
        depth: usize,
    ) -> Result<QueryResult, QueryError> {
        if query.trim().is_empty() {
            return Err(QueryError::Validation {
                message: "query must not be empty".to_string(),
            });
        }
        if query.len() > MAX_QUERY_LEN {
            return Err(QueryError::Validation {
                message: format!(
                    "query exceeds maximum length ({} bytes, max {MAX_QUERY_LEN})",
                    query.len()
                ),
            });
        }

        let conversation = self.resolve_conversation(conversation_id);
        let key = ResponseCache::key(query, &conversation);

        if let Some(data) = self.cache_get(&key) {
            debug!(%key, depth, "cache hit");
            return Ok(QueryResult {
                query: query.to_string(),
                response: AgentResponse::new(200, data, None),
                depth,
                cached: true,
                follow_up_queries: Vec::new(),
            });
        }

        let request = AgentRequest {
            query: query.to_string(),
            conversation_id: conversation,
        };

        // Admission gate: bounds the count of in-flight transport calls.
        // Waiters are unordered; no fairness beyond what the semaphore gives.
        let _permit = self
            .admission
            .acquire()
            .await
            .map_err(|e| QueryError::Transport {
                message: format!("admission gate closed: {e}"),
            })?;
        let _gauge = InFlightGauge::enter(&self.in_flight);

        let timeout = self.config.query_timeout;
        let transport = &self.transport;
        let request_ref = &request;
        let response = execute_with_retry(
            || async move {
                match tokio::time::timeout(timeout, transport.send(request_ref)).await {
                    Ok(result) => result,
                    Err(_) => Err(QueryError::Timeout { elapsed: timeout }),
                }
            },
            &self.config.retry,
        )
        .await?;

        self.cache_set(key, response.data.clone());

        let follow_up_queries = if self.config.enable_auto_follow {
            let payload = extract_payload(&response.data);
            if should_follow_up(payload) {
                generate_follow_up_query(query, payload, depth, self.config.max_query_depth)
                    .into_iter()
                    .collect()
            } else {
                Vec::new()
            }
        } else {
            Vec::new()
        };

        Ok(QueryResult {
            query: query.to_string(),
            response,
            depth,
            cached: false,
            follow_up_queries,
        })
    }

    /// Returns current cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().map_or_else(
            |_| {
                ResponseCache::new(
                    self.config.cache_ttl,
                    self.config.max_cache_size,
                    self.config.enable_caching,
                )
                .stats()
            },
            |cache| cache.stats(),
        )
    }

    /// Returns aggregate recursion counters.
    #[must_use]
    pub fn query_stats(&self) -> QueryStats {
        self.recursion.stats()
    }

    /// Drops all cached responses.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// Returns a point-in-time health report.
    ///
    /// `healthy` is true iff the configuration validates and the
    /// in-flight count is below the concurrency ceiling.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        let in_flight = self.in_flight.load(Ordering::Relaxed);
        HealthReport {
            healthy: self.config.validate().is_ok() && in_flight < self.config.max_concurrency,
            config: ConfigSummary {
                endpoint: self.config.endpoint.clone(),
                transport: self.transport.name(),
                max_query_depth: self.config.max_query_depth,
                caching_enabled: self.config.enable_caching,
                auto_follow: self.config.enable_auto_follow,
            },
            requests: RequestStats {
                in_flight,
                max_concurrency: self.config.max_concurrency,
            },
            cache: self.cache_stats(),
            queries: self.query_stats(),
        }
    }

    fn resolve_conversation(&self, conversation_id: Option<&str>) -> String {
        conversation_id
            .unwrap_or(&self.config.default_conversation_id)
            .to_string()
    }

    fn cache_get(&self, key: &str) -> Option<serde_json::Value> {
        self.cache.lock().ok().and_then(|mut cache| cache.get(key))
    }

    fn cache_set(&self, key: String, data: serde_json::Value) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.set(key, data);
        }
    }
}

impl std::fmt::Debug for AgentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentService")
            .field("transport", &self.transport.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Executor handed to the recursion manager: each chain step re-enters
/// the service so it gets the full cache/admission/retry treatment.
struct ServiceStepExecutor<'a> {
    service: &'a AgentService,
    conversation: String,
}

#[async_trait]
impl QueryExecutor for ServiceStepExecutor<'_> {
    async fn execute(&self, query: &str, depth: usize) -> Result<QueryResult, QueryError> {
        self.service
            .execute_step(query, Some(&self.conversation), depth)
            .await
    }
}

/// RAII gauge for the in-flight request count.
struct InFlightGauge<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlightGauge<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for InFlightGauge<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Configuration summary surfaced in [`HealthReport`].
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    /// Configured agent endpoint.
    pub endpoint: String,
    /// Active transport name.
    pub transport: &'static str,
    /// Recursion depth bound.
    pub max_query_depth: usize,
    /// Whether caching is enabled.
    pub caching_enabled: bool,
    /// Whether automatic follow-up is enabled.
    pub auto_follow: bool,
}

/// In-flight request gauge versus the configured ceiling.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RequestStats {
    /// Transport calls currently in flight.
    pub in_flight: usize,
    /// Configured concurrency ceiling.
    pub max_concurrency: usize,
}

/// Point-in-time service health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall health verdict.
    pub healthy: bool,
    /// Configuration summary.
    pub config: ConfigSummary,
    /// In-flight request gauge.
    pub requests: RequestStats,
    /// Cache statistics.
    pub cache: CacheStats,
    /// Recursion counters.
    pub queries: QueryStats,
}
