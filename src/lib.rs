//! Recursive query orchestration for conversational agent endpoints.
//!
//! `querychain` asks a remote agent a natural-language question and, when
//! the answer signals pagination or incompleteness, automatically issues
//! follow-up questions until the answer is complete or a depth/queue
//! bound is reached. Responses are cached with a TTL, transient failures
//! are retried with exponential backoff, and in-flight calls are bounded
//! by a semaphore admission gate.
//!
//! # Architecture
//!
//! ```text
//! Caller → AgentService::execute_query / execute_recursive_queries
//!   ├── ResponseCache (TTL + insertion-order eviction)
//!   ├── Semaphore admission gate (bounded in-flight calls)
//!   ├── RecursiveQueryManager (linear query → follow-up chain)
//!   │   └── per-step callback → execute_query
//!   ├── execute_with_retry (exponential backoff)
//!   │   └── AgentTransport (HTTP POST to the agent endpoint)
//!   └── payload extraction → follow-up decision
//! ```
//!
//! # Example
//!
//! ```no_run
//! use querychain::{AgentService, ServiceConfig};
//!
//! # async fn run() -> Result<(), querychain::QueryError> {
//! let config = ServiceConfig::builder()
//!     .endpoint("https://agent.example.com/query")
//!     .api_key("secret")
//!     .build()?;
//! let service = AgentService::from_config(config)?;
//! let results = service.execute_recursive_queries("quarterly sales", None).await?;
//! for step in &results {
//!     println!("depth {}: {}", step.depth, step.query);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod payload;
pub mod recursion;
pub mod retry;
pub mod service;
pub mod transport;
pub mod types;

// Re-export key types
pub use cache::CacheStats;
pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::QueryError;
pub use recursion::{QueryExecutor, QueryStats, RecursiveQueryManager};
pub use retry::{RetryPolicy, execute_with_retry};
pub use service::{AgentService, HealthReport};
pub use transport::{AgentRequest, AgentTransport, HttpTransport};
pub use types::{AgentResponse, QueryResult};
