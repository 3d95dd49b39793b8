//! # Rombel - Student Enrollment Server
//!
//! The main binary for the Rombel enrollment lifecycle manager.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for class and enrollment operations
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               apps/rombel (THE BINARY)               │
//! │                                                      │
//! │   ┌─────────────┐   ┌─────────────┐   ┌──────────┐   │
//! │   │    CLI      │   │  HTTP API   │   │  config  │   │
//! │   │   (clap)    │   │   (axum)    │   │  (toml)  │   │
//! │   └──────┬──────┘   └──────┬──────┘   └────┬─────┘   │
//! │          └─────────────────┼───────────────┘         │
//! │                            ▼                         │
//! │                    ┌───────────────┐                 │
//! │                    │  rombel-core  │                 │
//! │                    │  (THE LOGIC)  │                 │
//! │                    └───────────────┘                 │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! rombel server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! rombel class create --name "X IPA 1" --grade 10 --capacity 36
//! rombel assign --student 1001 --class 1
//! rombel transfer --student 1001 --from 1 --to 2 -r "Pindah peminatan" -a "Wakasek"
//! ```

use clap::Parser;
use rombel::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Initialize tracing. ROMBEL_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("ROMBEL_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "rombel=debug,rombel_core=debug,tower_http=debug"
    } else {
        "rombel=info,rombel_core=info,tower_http=debug"
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
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    // Display startup banner
    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!(code = e.kind(), "Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Rombel startup banner.
fn print_banner() {
    println!(
        r#"
  ██████╗  ██████╗ ███╗   ███╗██████╗ ███████╗██╗
  ██╔══██╗██╔═══██╗████╗ ████║██╔══██╗██╔════╝██║
  ██████╔╝██║   ██║██╔████╔██║██████╔╝█████╗  ██║
  ██╔══██╗██║   ██║██║╚██╔╝██║██╔══██╗██╔══╝  ██║
  ██║  ██║╚██████╔╝██║ ╚═╝ ██║██████╔╝███████╗███████╗
  ╚═╝  ╚═╝ ╚═════╝ ╚═╝     ╚═╝╚═════╝ ╚══════╝╚══════╝

  Enrollment Lifecycle Server v{}

  Exact occupancy • Full audit trail
"#,
        env!("CARGO_PKG_VERSION")
    );
}
