//! # VaxTrax - Cold-Chain Custody Server
//!
//! The main binary for the VaxTrax vaccine custody ledger.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │               apps/vaxtrax (THE BINARY)            │
//! │                                                    │
//! │   ┌─────────────┐          ┌─────────────┐         │
//! │   │    CLI      │          │  HTTP API   │         │
//! │   │   (clap)    │          │   (axum)    │         │
//! │   └──────┬──────┘          └──────┬──────┘         │
//! │          └────────────┬───────────┘                │
//! │                       ▼                            │
//! │               ┌───────────────┐                    │
//! │               │ vaxtrax-core  │                    │
//! │               │ (THE LEDGER)  │                    │
//! │               └───────────────┘                    │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! vaxtrax server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! vaxtrax create -l "52.5200° N, 13.4050° E" --temp-min -25 --temp-max -15
//! vaxtrax scan VAX-2025-001 -t -18.5 -s hub
//! vaxtrax proceed VAX-2025-001
//! vaxtrax history VAX-2025-001 --view public
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vaxtrax::cli;

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // VAXTRAX_LOG_FORMAT=json switches to machine-parseable output.
    let log_format = std::env::var("VAXTRAX_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vaxtrax=info,tower_http=debug".into());

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

    let cli = cli::Cli::parse();

    // Banners would corrupt JSON output.
    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!(kind = e.kind(), "Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the VaxTrax startup banner.
fn print_banner() {
    println!(
        r#"
  ██╗   ██╗ █████╗ ██╗  ██╗████████╗██████╗  █████╗ ██╗  ██╗
  ██║   ██║██╔══██╗╚██╗██╔╝╚══██╔══╝██╔══██╗██╔══██╗╚██╗██╔╝
  ██║   ██║███████║ ╚███╔╝    ██║   ██████╔╝███████║ ╚███╔╝
  ╚██╗ ██╔╝██╔══██║ ██╔██╗    ██║   ██╔══██╗██╔══██║ ██╔██╗
   ╚████╔╝ ██║  ██║██╔╝ ██╗   ██║   ██║  ██║██║  ██║██╔╝ ██╗
    ╚═══╝  ╚═╝  ╚═╝╚═╝  ╚═╝   ╚═╝   ╚═╝  ╚═╝╚═╝  ╚═╝╚═╝  ╚═╝

  Cold-Chain Custody Ledger v{}

  Scan • Classify • Gate
"#,
        env!("CARGO_PKG_VERSION")
    );
}
