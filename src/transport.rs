//! Transport layer for the agent endpoint.
//!
//! The [`AgentTransport`] trait keeps all orchestration logic decoupled
//! from the wire: the service only sees a single asynchronous `send` that
//! either yields an [`AgentResponse`] or fails with a classified
//! [`QueryError`]. [`HttpTransport`] is the production implementation;
//! tests substitute their own.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::config::ServiceConfig;
use crate::error::QueryError;
use crate::types::AgentResponse;

/// HTTP statuses classified as transient by default.
const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Maximum response-body characters echoed into an error message.
const MAX_ERROR_BODY_LEN: usize = 300;

/// A query as sent over the wire.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRequest {
    /// Natural-language query text.
    pub query: String,
    /// Conversation scope for context continuity.
    pub conversation_id: String,
}

/// Asynchronous call into the remote agent endpoint.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Transport name for logging and health reporting.
    fn name(&self) -> &'static str;

    /// Sends one query and returns the agent's response.
    ///
    /// # Errors
    ///
    /// [`QueryError::Transport`] for connection-level failures,
    /// [`QueryError::Agent`] for non-success HTTP statuses.
    async fn send(&self, request: &AgentRequest) -> Result<AgentResponse, QueryError>;
}

/// Whether a status code is in the default transient set.
#[must_use]
pub fn is_transient_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Production transport: JSON POST to the configured endpoint with
/// bearer authentication.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    /// Creates a transport from service configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Configuration`] if the HTTP client cannot
    /// be constructed.
    pub fn new(config: &ServiceConfig) -> Result<Self, QueryError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| QueryError::Configuration {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl AgentTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, request: &AgentRequest) -> Result<AgentResponse, QueryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| QueryError::Transport {
                message: format!("request to {} failed: {e}", self.endpoint),
            })?;

        let status = response.status().as_u16();
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            // Char-based cut so multi-byte bodies cannot split a boundary.
            let snippet: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
            return Err(QueryError::Agent {
                message: format!("endpoint {} answered: {snippet}", self.endpoint),
                status,
                retryable: is_transient_status(status),
            });
        }

        // Non-JSON bodies are preserved verbatim as a JSON string.
        let body = response.text().await.map_err(|e| QueryError::Transport {
            message: format!("failed to read response body: {e}"),
        })?;
        let data = serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body));

        debug!(status, request_id = request_id.as_deref(), "agent responded");
        Ok(AgentResponse::new(status, data, request_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_case::test_case;

    #[test_case(408, true; "timeout")]
    #[test_case(429, true; "rate limited")]
    #[test_case(500, true; "internal error")]
    #[test_case(502, true; "bad gateway")]
    #[test_case(503, true; "unavailable")]
    #[test_case(504, true; "gateway timeout")]
    #[test_case(400, false; "bad request")]
    #[test_case(401, false; "unauthorized")]
    #[test_case(404, false; "not found")]
    fn test_transient_status_classification(status: u16, expected: bool) {
        assert_eq!(is_transient_status(status), expected);
    }

    #[test]
    fn test_request_serializes_to_wire_shape() {
        let request = AgentRequest {
            query: "sales".to_string(),
            conversation_id: "conv-1".to_string(),
        };
        let json = serde_json::to_string(&request).unwrap_or_default();
        assert!(json.contains("\"query\":\"sales\""));
        assert!(json.contains("\"conversation_id\":\"conv-1\""));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = ServiceConfig::builder()
            .endpoint("https://agent.example.com/query")
            .api_key("super-secret")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let transport = HttpTransport::new(&config).unwrap_or_else(|_| unreachable!());
        let debug = format!("{transport:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("redacted"));
    }
}
