//! # kernsync - Kernel and Session Synchronizer
//!
//! Keeps three views of "which kernels exist" consistent:
//! - kernels tracked by the local lifecycle manager
//! - kernels recorded in the persistent kernel table
//! - kernels reported by an optional remote kernel gateway
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    apps/kernsync (THE BINARY)                   │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────┐     │
//! │  │   CLI       │    │  HTTP API   │    │    Scheduler     │     │
//! │  │  (clap)     │    │  (axum)     │    │  (tokio task)    │     │
//! │  └──────┬──────┘    └──────┬──────┘    └────────┬─────────┘     │
//! │         │                  │                    │               │
//! │         └──────────────────┼────────────────────┘               │
//! │                            ▼                                    │
//! │                   ┌─────────────────┐                           │
//! │                   │  Synchronizer   │──▶ collaborators          │
//! │                   └────────┬────────┘                           │
//! │                            ▼                                    │
//! │                   ┌─────────────────┐                           │
//! │                   │  kernsync-core  │                           │
//! │                   │  (THE LOGIC)    │                           │
//! │                   └─────────────────┘                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP trigger with periodic passes every 5 seconds
//! kernsync server --autosync
//!
//! # One-off operations
//! kernsync sync --database kernels.redb
//! kernsync list --json-mode
//! kernsync forget --field kernel_id --value 3f2a...
//! ```

use clap::Parser;
use kernsync::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // KERNSYNC_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("KERNSYNC_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "kernsync=info,tower_http=info".into());

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

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  _
 | | _____ _ __ _ __  ___ _   _ _ __   ___
 | |/ / _ \ '__| '_ \/ __| | | | '_ \ / __|
 |   <  __/ |  | | | \__ \ |_| | | | | (__
 |_|\_\___|_|  |_| |_|___/\__, |_| |_|\___|
                          |___/

  Kernel Synchronizer v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
