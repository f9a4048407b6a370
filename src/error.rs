//! Error types for query orchestration.
//!
//! The taxonomy mirrors how failures are handled: configuration and
//! validation errors fail fast and are never retried, transport errors are
//! always retryable, agent errors carry an HTTP status plus an explicit
//! retryability flag, and timeouts are treated as 408-equivalent.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the query orchestration core.
///
/// The retry executor is the only layer that inspects these for
/// retryability; every other layer propagates them unchanged.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A required credential or configuration value is missing or invalid.
    ///
    /// Raised before any network call and never retried.
    #[error("configuration error: {message}")]
    Configuration {
        /// What was missing or invalid.
        message: String,
    },

    /// The request was malformed before it could be sent.
    ///
    /// Raised before any network call and never retried.
    #[error("validation error: {message}")]
    Validation {
        /// What was wrong with the request.
        message: String,
    },

    /// A connection-level failure talking to the agent endpoint.
    ///
    /// Always considered retryable.
    #[error("transport error: {message}")]
    Transport {
        /// Underlying failure description.
        message: String,
    },

    /// The agent endpoint answered with a non-success HTTP status.
    #[error("agent error (status {status}): {message}")]
    Agent {
        /// Failure description, including response body context when available.
        message: String,
        /// HTTP status code returned by the endpoint.
        status: u16,
        /// Whether the transport layer classified this status as transient.
        retryable: bool,
    },

    /// The per-call deadline elapsed before the agent responded.
    #[error("query timed out after {elapsed:?}")]
    Timeout {
        /// How long the call ran before being aborted.
        elapsed: Duration,
    },
}

impl QueryError {
    /// Returns the HTTP status code carried by this error, if any.
    ///
    /// Timeouts report 408 so the status-code retry set applies to them
    /// uniformly.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Agent { status, .. } => Some(*status),
            Self::Timeout { .. } => Some(408),
            _ => None,
        }
    }

    /// Returns the explicit retryability classification, if one exists.
    ///
    /// `Some(true)`/`Some(false)` when the error classifies itself;
    /// `None` when the retry policy must decide from the status code.
    #[must_use]
    pub const fn retryable_hint(&self) -> Option<bool> {
        match self {
            Self::Configuration { .. } | Self::Validation { .. } => Some(false),
            Self::Transport { .. } => Some(true),
            Self::Agent { .. } | Self::Timeout { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_is_always_retryable() {
        let err = QueryError::Transport {
            message: "connection reset".to_string(),
        };
        assert_eq!(err.retryable_hint(), Some(true));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_configuration_never_retryable() {
        let err = QueryError::Configuration {
            message: "api key missing".to_string(),
        };
        assert_eq!(err.retryable_hint(), Some(false));
    }

    #[test]
    fn test_agent_error_defers_to_policy() {
        let err = QueryError::Agent {
            message: "bad gateway".to_string(),
            status: 502,
            retryable: true,
        };
        assert_eq!(err.retryable_hint(), None);
        assert_eq!(err.status(), Some(502));
    }

    #[test]
    fn test_timeout_reports_408() {
        let err = QueryError::Timeout {
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(err.status(), Some(408));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_display_includes_status() {
        let err = QueryError::Agent {
            message: "rate limited".to_string(),
            status: 429,
            retryable: true,
        };
        let text = err.to_string();
        assert!(text.contains("429"));
        assert!(text.contains("rate limited"));
    }
}
