//! Edge rewriting reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http::server ──▶ routing ──┬─▶ http::tunnel ◀──▶ CONNECT target
//!                (middleware,               │
//!                 error boundary)           └─▶ cache lookup ──hit──▶ Client
//!                                                 │ miss
//!                                                 ▼
//!                                           http::request ──▶ upstream ──▶ Origin
//!                                                                │
//!     Client ◀── http::response ◀── rewrite ◀────────────────────┘
//!                     │
//!                     └──▶ cache store (background task)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use edge_rewrite_proxy::config::{load_config, validation::validate_config, ConfigError};
use edge_rewrite_proxy::lifecycle::signals::wait_for_signal;
use edge_rewrite_proxy::observability::{logging, metrics};
use edge_rewrite_proxy::{HttpServer, ProxyConfig, Shutdown};

#[derive(Parser)]
#[command(name = "edge-rewrite-proxy")]
#[command(about = "Edge reverse proxy with domain rewriting and response caching", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `origin.base_url`.
    #[arg(long)]
    origin: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(origin) = cli.origin {
        config.origin.base_url = origin;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability);
    tracing::info!("edge-rewrite-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        origin = %config.origin.base(),
        rewrite_active = config.rewrite.is_active(),
        cache_enabled = config.cache.enabled,
        request_timeout_ms = config.timeouts.request_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
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
    let server_shutdown = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            shutdown.trigger();
        }
    });

    let server = HttpServer::new(config)?;
    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
