//! Admission gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │               ADMISSION GATEWAY               │
//!                      │                                               │
//!   POST /forward      │  ┌──────────┐   ┌───────────┐   ┌──────────┐  │
//!   ───────────────────┼─▶│   http   │──▶│ admission │──▶│forwarding│──┼──▶ Upstream
//!                      │  │  server  │   │  buckets  │   │  + cache │  │
//!   200/4xx/5xx        │  └──────────┘   └───────────┘   └──────────┘  │
//!   ◀──────────────────┼── 429 + Retry-After when the bucket is empty   │
//!                      │                                               │
//!                      │  config · observability · lifecycle           │
//!                      └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use admission_gateway::config::{load_config, load_defaults};
use admission_gateway::observability::{logging, metrics};
use admission_gateway::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "admission-gateway", version, about = "Rate-limited caching forwarder")]
struct Cli {
    /// Path to a TOML config file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => load_defaults()?,
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!("admission-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        requests_per_minute = config.rate_limit.requests_per_minute,
        timeout_seconds = config.forwarding.timeout_seconds,
        cache_ttl_secs = config.cache.ttl_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    let server = HttpServer::from_config(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
