//! Command-line entry point for querychain.
//!
//! Thin driver over [`AgentService`]: issue a single query or a full
//! recursive chain against a configured agent endpoint, or inspect
//! service health. Output is text or JSON.

#![allow(clippy::print_stdout)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use querychain::{AgentService, ServiceConfig};

/// Querychain: recursive query client for conversational agent endpoints.
///
/// Issues a query and automatically follows pagination or incompleteness
/// signals in the agent's answers, with caching, retries, and bounded
/// concurrency.
#[derive(Parser, Debug)]
#[command(name = "querychain")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Agent endpoint URL.
    #[arg(long, env = "QUERYCHAIN_ENDPOINT")]
    endpoint: Option<String>,

    /// API key for the endpoint.
    #[arg(long, env = "QUERYCHAIN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a query against the agent endpoint.
    #[command(after_help = r#"Examples:
  querychain query "quarterly sales"                 # Single query
  querychain query "quarterly sales" --recursive     # Follow pagination automatically
  querychain query "status" --conversation ops-7     # Scope to a conversation
  querychain --format json query "sales" | jq '.[].depth'
"#)]
    Query {
        /// Query text.
        text: String,

        /// Conversation id (defaults to the configured value).
        #[arg(short, long)]
        conversation: Option<String>,

        /// Automatically execute follow-up queries for paginated or
        /// incomplete answers.
        #[arg(short, long)]
        recursive: bool,

        /// Maximum recursion depth for --recursive.
        #[arg(long)]
        max_depth: Option<usize>,

        /// Disable the response cache for this run.
        #[arg(long)]
        no_cache: bool,
    },

    /// Show service configuration and health.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("querychain=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("querychain=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut builder = ServiceConfig::builder().from_env();
    if let Some(endpoint) = cli.endpoint.clone() {
        builder = builder.endpoint(endpoint);
    }
    if let Some(api_key) = cli.api_key.clone() {
        builder = builder.api_key(api_key);
    }

    match cli.command {
        Commands::Query {
            text,
            conversation,
            recursive,
            max_depth,
            no_cache,
        } => {
            if let Some(depth) = max_depth {
                builder = builder.max_query_depth(depth);
            }
            if no_cache {
                builder = builder.enable_caching(false);
            }
            let config = builder.build().context("invalid configuration")?;
            let service = AgentService::from_config(config)?;

            let results = if recursive {
                service
                    .execute_recursive_queries(&text, conversation.as_deref())
                    .await?
            } else {
                vec![service.execute_query(&text, conversation.as_deref()).await?]
            };

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for step in &results {
                    let cached = if step.cached { " [cached]" } else { "" };
                    println!("── depth {}{cached}: {}", step.depth, step.query);
                    println!("{}", serde_json::to_string_pretty(&step.response.data)?);
                    for follow_up in &step.follow_up_queries {
                        println!("   follow-up: {follow_up}");
                    }
                }
            }
        }
        Commands::Health => {
            let config = builder.build().context("invalid configuration")?;
            let service = AgentService::from_config(config)?;
            let health = service.health();
            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("healthy: {}", health.healthy);
                println!("endpoint: {}", health.config.endpoint);
                println!(
                    "requests: {}/{} in flight",
                    health.requests.in_flight, health.requests.max_concurrency
                );
                println!(
                    "cache: {}/{} entries (enabled: {})",
                    health.cache.size, health.cache.max_size, health.cache.enabled
                );
            }
        }
    }

    Ok(())
}
