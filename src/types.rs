//! Core data types for queries and their results.
//!
//! These types flow between the service, the recursion manager, and the
//! caller. Both are immutable once returned: the core keeps no ownership
//! of a [`QueryResult`] after handing it back.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A response from the remote agent endpoint.
///
/// Owned exclusively by the call that produced it; the cache stores only
/// the `data` payload, not the whole response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// HTTP status the endpoint answered with.
    pub status: u16,
    /// Opaque response body. The payload extractor digs into this;
    /// the core never interprets it beyond the follow-up signals.
    pub data: serde_json::Value,
    /// Epoch milliseconds at which the response was produced.
    pub timestamp: u64,
    /// Request correlation ID from the endpoint, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AgentResponse {
    /// Creates a response stamped with the current time.
    #[must_use]
    pub fn new(status: u16, data: serde_json::Value, request_id: Option<String>) -> Self {
        Self {
            status,
            data,
            timestamp: epoch_millis(),
            request_id,
        }
    }
}

/// The result of one orchestrated query step.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// The query string that was executed (initial or generated follow-up).
    pub query: String,
    /// The agent's response for this step.
    pub response: AgentResponse,
    /// Recursion level at which this result was produced (0 = initial).
    pub depth: usize,
    /// Whether the response was served from the cache.
    pub cached: bool,
    /// Follow-up queries surfaced for this step. At most one entry; the
    /// single-query path surfaces it without executing it.
    pub follow_up_queries: Vec<String>,
}

/// Current time as epoch milliseconds.
///
/// Saturates to 0 for clocks before the epoch rather than failing.
#[must_use]
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
