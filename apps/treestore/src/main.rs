//! # TreeStore - Hierarchical Tagging Store
//!
//! The main binary for TreeStore.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for browsing and editing the store
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │            apps/treestore (THE BINARY)        │
//! │                                               │
//! │     ┌─────────────┐      ┌─────────────┐      │
//! │     │   CLI       │      │   HTTP API  │      │
//! │     │  (clap)     │      │   (axum)    │      │
//! │     └──────┬──────┘      └──────┬──────┘      │
//! │            └─────────┬──────────┘             │
//! │                      ▼                        │
//! │              ┌────────────────┐               │
//! │              │ treestore-core │               │
//! │              │  (THE LOGIC)   │               │
//! │              └────────────────┘               │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! treestore server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! treestore init
//! treestore category create docs/guides
//! treestore entity set docs/guides/readme owner ann
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use treestore::cli;

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // TREESTORE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("TREESTORE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "treestore=debug,treestore_core=debug,tower_http=debug"
    } else {
        "treestore=info,treestore_core=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    // Keep stdout clean for JSON consumers
    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the TreeStore startup banner.
fn print_banner() {
    println!(
        r#"
  ┌┬┐┬─┐┌─┐┌─┐┌─┐┌┬┐┌─┐┬─┐┌─┐
   │ ├┬┘├┤ ├┤ └─┐ │ │ │├┬┘├┤
   ┴ ┴└─└─┘└─┘└─┘ ┴ └─┘┴└─└─┘

  Hierarchical Tagging Store v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
