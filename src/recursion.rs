//! Recursive query chain execution.
//!
//! Drives a linear chain of query → follow-up steps: issues the initial
//! query through a caller-supplied executor, inspects each response for
//! pagination/incompleteness signals, and repeats with the generated
//! follow-up until the chain completes or a bound is reached. Each step
//! has at most one follow-up, so the chain never branches.
//!
//! Caching, admission, and retry are the executor's concern; the manager
//! only decides whether and how to continue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::QueryError;
use crate::payload::{extract_payload, generate_follow_up_query, should_follow_up};
use crate::types::QueryResult;

/// Executes one step of a recursive chain.
///
/// Supplied by the caller; the communication service implements this with
/// a closure over its own `execute_query`, so every step independently
/// goes through cache, admission, and retry.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Runs `query` at the given recursion `depth` and returns its result.
    ///
    /// # Errors
    ///
    /// Any [`QueryError`] aborts the whole chain; partial results are
    /// not returned.
    async fn execute(&self, query: &str, depth: usize) -> Result<QueryResult, QueryError>;
}

/// Aggregate counters across all chains run by one manager.
#[derive(Debug, Clone, Serialize)]
pub struct QueryStats {
    /// Chains started via [`RecursiveQueryManager::execute_recursive_queries`].
    pub chains_started: u64,
    /// Individual steps executed across all chains.
    pub steps_executed: u64,
    /// Follow-up queries generated and executed.
    pub follow_ups_generated: u64,
    /// Deepest recursion level reached by any chain.
    pub deepest_chain: u64,
}

/// Per-chain mutable state. Fresh for every call; never shared.
struct RecursionState {
    queue: VecDeque<String>,
    results: Vec<QueryResult>,
}

/// Orchestrates recursive query chains within configured bounds.
///
/// Holds no cross-call mutable state beyond the aggregate counters, so a
/// single manager instance is safely shared across concurrent chains.
#[derive(Debug)]
pub struct RecursiveQueryManager {
    max_depth: usize,
    max_queue_size: usize,
    auto_follow: bool,
    chains_started: AtomicU64,
    steps_executed: AtomicU64,
    follow_ups_generated: AtomicU64,
    deepest_chain: AtomicU64,
}

impl RecursiveQueryManager {
    /// Creates a manager with the given bounds.
    #[must_use]
    pub const fn new(max_depth: usize, max_queue_size: usize, auto_follow: bool) -> Self {
        Self {
            max_depth,
            max_queue_size,
            auto_follow,
            chains_started: AtomicU64::new(0),
            steps_executed: AtomicU64::new(0),
            follow_ups_generated: AtomicU64::new(0),
            deepest_chain: AtomicU64::new(0),
        }
    }

    /// Executes a full query chain starting from `initial_query`.
    ///
    /// Results are returned in execution order: index 0 is the initial
    /// query, the last element is the final follow-up or the step at
    /// which recursion stopped. Termination is guaranteed: every
    /// iteration either stops or strictly increases the depth, which is
    /// bounded by `max_depth`.
    ///
    /// # Errors
    ///
    /// Propagates the first step failure unchanged; results already
    /// collected are discarded.
    pub async fn execute_recursive_queries(
        &self,
        initial_query: &str,
        executor: &dyn QueryExecutor,
    ) -> Result<Vec<QueryResult>, QueryError> {
        self.chains_started.fetch_add(1, Ordering::Relaxed);

        let mut state = RecursionState {
            queue: VecDeque::new(),
            results: Vec::new(),
        };
        let mut depth: usize = 0;
        let mut current = Some(initial_query.to_string());

        while let Some(query) = current.take() {
            if depth > 0 && state.queue.len() >= self.max_queue_size {
                warn!(
                    depth,
                    pending = state.queue.len(),
                    max_queue_size = self.max_queue_size,
                    "pending queue at capacity, stopping chain"
                );
                break;
            }

            let mut result = executor.execute(&query, depth).await?;
            result.depth = depth;
            self.steps_executed.fetch_add(1, Ordering::Relaxed);
            self.deepest_chain
                .fetch_max(depth as u64, Ordering::Relaxed);

            let next = if depth >= self.max_depth || !self.auto_follow {
                debug!(depth, auto_follow = self.auto_follow, "chain bound reached");
                None
            } else {
                let payload = extract_payload(&result.response.data);
                if should_follow_up(payload) {
                    generate_follow_up_query(&query, payload, depth, self.max_depth)
                } else {
                    None
                }
            };

            state.results.push(result);

            if let Some(follow_up) = next {
                debug!(depth, follow_up = %follow_up, "continuing chain");
                self.follow_ups_generated.fetch_add(1, Ordering::Relaxed);
                state.queue.push_back(follow_up);
            }

            current = state.queue.pop_front();
            if current.is_some() {
                depth += 1;
            }
        }

        Ok(state.results)
    }

    /// Returns the aggregate counters.
    #[must_use]
    pub fn stats(&self) -> QueryStats {
        QueryStats {
            chains_started: self.chains_started.load(Ordering::Relaxed),
            steps_executed: self.steps_executed.load(Ordering::Relaxed),
            follow_ups_generated: self.follow_ups_generated.load(Ordering::Relaxed),
            deepest_chain: self.deepest_chain.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use serde_json::json;

    use crate::types::AgentResponse;

    /// Scripted executor: returns the configured payload per call and
    /// records the (query, depth) pairs it was invoked with.
    struct ScriptedExecutor {
        payloads: Mutex<VecDeque<serde_json::Value>>,
        calls: Mutex<Vec<(String, usize)>>,
        fail_at_depth: Option<usize>,
    }

    impl ScriptedExecutor {
        fn new(payloads: Vec<serde_json::Value>) -> Self {
            Self {
                payloads: Mutex::new(payloads.into()),
                calls: Mutex::new(Vec::new()),
                fail_at_depth: None,
            }
        }

        fn failing_at(depth: usize, payloads: Vec<serde_json::Value>) -> Self {
            Self {
                fail_at_depth: Some(depth),
                ..Self::new(payloads)
            }
        }

        fn calls(&self) -> Vec<(String, usize)> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl QueryExecutor for ScriptedExecutor {
        async fn execute(&self, query: &str, depth: usize) -> Result<QueryResult, QueryError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((query.to_string(), depth));
            }
            if self.fail_at_depth == Some(depth) {
                return Err(QueryError::Transport {
                    message: "connection reset".to_string(),
                });
            }
            let data = self
                .payloads
                .lock()
                .ok()
                .and_then(|mut p| p.pop_front())
                .unwrap_or_else(|| json!({"answer": "done"}));
            Ok(QueryResult {
                query: query.to_string(),
                response: AgentResponse::new(200, data, None),
                depth: 0,
                cached: false,
                follow_up_queries: Vec::new(),
            })
        }
    }

    fn paginated() -> serde_json::Value {
        json!({"has_more_results": true, "data": {"page": 1}})
    }

    #[tokio::test]
    async fn test_single_step_when_complete() {
        let manager = RecursiveQueryManager::new(4, 10, true);
        let executor = ScriptedExecutor::new(vec![json!({"answer": "done"})]);
        let results = manager
            .execute_recursive_queries("sales", &executor)
            .await
            .unwrap_or_else(|e| panic!("chain failed: {e}"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].depth, 0);
        assert_eq!(executor.calls(), vec![("sales".to_string(), 0)]);
    }

    #[tokio::test]
    async fn test_terminates_at_max_depth() {
        // Every response says "has more": the chain must stop at the bound.
        let manager = RecursiveQueryManager::new(2, 10, true);
        let executor = ScriptedExecutor::new(vec![paginated(), paginated(), paginated()]);
        let results = manager
            .execute_recursive_queries("sales", &executor)
            .await
            .unwrap_or_else(|e| panic!("chain failed: {e}"));
        assert_eq!(results.len(), 3);
        let depths: Vec<usize> = results.iter().map(|r| r.depth).collect();
        assert_eq!(depths, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_follow_up_queries_form_page_sequence() {
        let manager = RecursiveQueryManager::new(3, 10, true);
        let executor = ScriptedExecutor::new(vec![
            json!({"has_more_results": true, "data": {"page": 1}}),
            json!({"has_more_results": true, "data": {"page": 2}}),
            json!({"answer": "done"}),
        ]);
        let results = manager
            .execute_recursive_queries("sales", &executor)
            .await
            .unwrap_or_else(|e| panic!("chain failed: {e}"));
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].query, "sales (page 2)");
        assert_eq!(results[2].query, "sales (page 2) (page 3)");
    }

    #[tokio::test]
    async fn test_auto_follow_disabled_stops_after_first_step() {
        let manager = RecursiveQueryManager::new(4, 10, false);
        let executor = ScriptedExecutor::new(vec![paginated()]);
        let results = manager
            .execute_recursive_queries("sales", &executor)
            .await
            .unwrap_or_else(|e| panic!("chain failed: {e}"));
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_mid_chain_failure_discards_partials() {
        let manager = RecursiveQueryManager::new(4, 10, true);
        let executor = ScriptedExecutor::failing_at(1, vec![paginated()]);
        let result = manager.execute_recursive_queries("sales", &executor).await;
        assert!(matches!(result, Err(QueryError::Transport { .. })));
        // The first step did run; its result is not surfaced.
        assert_eq!(executor.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_incomplete_signal_generates_continuation() {
        let manager = RecursiveQueryManager::new(4, 10, true);
        let executor = ScriptedExecutor::new(vec![
            json!({"data": {"incomplete": true}}),
            json!({"answer": "done"}),
        ]);
        let results = manager
            .execute_recursive_queries("report", &executor)
            .await
            .unwrap_or_else(|e| panic!("chain failed: {e}"));
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].query, "report (continue with more details)");
    }

    #[tokio::test]
    async fn test_stats_accumulate_across_chains() {
        let manager = RecursiveQueryManager::new(2, 10, true);
        let executor = ScriptedExecutor::new(vec![paginated(), json!({"answer": "done"})]);
        let _ = manager
            .execute_recursive_queries("a", &executor)
            .await
            .unwrap_or_else(|e| panic!("chain failed: {e}"));
        let executor2 = ScriptedExecutor::new(vec![json!({"answer": "done"})]);
        let _ = manager
            .execute_recursive_queries("b", &executor2)
            .await
            .unwrap_or_else(|e| panic!("chain failed: {e}"));

        let stats = manager.stats();
        assert_eq!(stats.chains_started, 2);
        assert_eq!(stats.steps_executed, 3);
        assert_eq!(stats.follow_ups_generated, 1);
        assert_eq!(stats.deepest_chain, 1);
    }

    #[tokio::test]
    async fn test_fresh_state_per_call() {
        // A deep first chain must not affect a later shallow one.
        let manager = RecursiveQueryManager::new(2, 10, true);
        let executor = ScriptedExecutor::new(vec![paginated(), paginated(), paginated()]);
        let first = manager
            .execute_recursive_queries("a", &executor)
            .await
            .unwrap_or_else(|e| panic!("chain failed: {e}"));
        assert_eq!(first.len(), 3);

        let executor2 = ScriptedExecutor::new(vec![json!({"answer": "done"})]);
        let second = manager
            .execute_recursive_queries("b", &executor2)
            .await
            .unwrap_or_else(|e| panic!("chain failed: {e}"));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].depth, 0);
    }
}
