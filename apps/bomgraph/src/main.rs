//! # bomgraph
//!
//! The main binary for the versioned bill-of-materials graph.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                apps/bomgraph (THE BINARY)            │
//! │                                                      │
//! │   ┌─────────────┐            ┌─────────────┐         │
//! │   │    CLI      │            │   HTTP API  │         │
//! │   │   (clap)    │            │   (axum)    │         │
//! │   └──────┬──────┘            └──────┬──────┘         │
//! │          └─────────────┬────────────┘                │
//! │                        ▼                             │
//! │                ┌───────────────┐                     │
//! │                │ bomgraph-core │                     │
//! │                │  (THE ENGINE) │                     │
//! │                └───────────────┘                     │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! bomgraph init
//! bomgraph component add --name Frame --classification ASM
//! bomgraph link add --source 2 --target 3 --quantity 4
//! bomgraph analyze --revision 2
//! bomgraph server --port 8080
//! ```

use bomgraph::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // BOMGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("BOMGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "bomgraph=debug,bomgraph_core=debug,tower_http=debug"
    } else {
        "bomgraph=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!(error = %e, "Command failed");
        std::process::exit(1);
    }
}
