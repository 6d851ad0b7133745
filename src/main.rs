//! slipcover gateway
//!
//! An HTTP gateway that sits in front of a CouchDB server and lets handler
//! modules inspect, rewrite or answer every request.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                      SLIPCOVER                        │
//!                    │                                                       │
//!  Client Request    │  ┌────────┐   ┌──────────┐   ┌─────────────────────┐  │
//!  ──────────────────┼─▶│  http  │──▶│ routing  │──▶│ hooks: url → pre    │  │
//!                    │  │ server │   │ resolver │   │        → pending    │  │
//!                    │  └────────┘   └──────────┘   └──────────┬──────────┘  │
//!                    │                                         │             │
//!                    │                                         ▼             │
//!  Client Response   │  ┌────────┐   ┌──────────────────┐   ┌──────────┐     │
//!  ◀─────────────────┼──│response│◀──│ hooks: finish    │◀──│ CouchDB  │◀────┼── Backend
//!                    │  │serialize│  │        → final   │   │ forward  │     │
//!                    │  └────────┘   └──────────────────┘   └──────────┘     │
//!                    │                                                       │
//!                    │  modules: cors, sessions, admin   store: async CouchDB │
//!                    │  cross-cutting: config, lifecycle, observability      │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::{Path, PathBuf};

use slipcover::config::{load_config, load_default};
use slipcover::lifecycle::startup;
use slipcover::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "slipcover")]
#[command(about = "Hookable HTTP gateway for CouchDB", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "SLIPCOVER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_default()?,
    };

    let _log_guard = logging::init_logging(
        &config.observability.log_level,
        config.observability.log_file.as_deref().map(Path::new),
    )?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "slipcover starting");
    tracing::info!(
        default_db = %config.default_db,
        backend = %config.backend.url,
        endpoints = config.endpoints.len(),
        admins = config.admins.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
