//! kv-cache-compress: attention-based KV-cache compression server.
//!
//! Scores every cached token against the request's query vectors with
//! scaled dot-product attention, keeps the smallest subset covering the
//! configured fraction of attention mass, and reports the savings.
//!
//! Exposes a small HTTP API consumed by dashboard clients.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use kv_cache_compress::config::{Cli, Config};
use kv_cache_compress::engine::compressor::Compressor;
use kv_cache_compress::server::api::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "kv_cache_compress=debug,tower_http=debug"
    } else {
        "kv_cache_compress=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("kv-cache-compress v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let config = Config::load(&cli.config)?;
    let config = Arc::new(config);

    info!(
        max_tokens = config.server.max_tokens,
        max_queries = config.server.max_queries,
        max_dim = config.server.max_dim,
        request_timeout_secs = config.server.request_timeout_secs,
        "Configuration loaded"
    );

    // Build application state.
    let state = Arc::new(AppState {
        compressor: Compressor::new(config.engine.parallel_min_work),
        config: config.clone(),
        start_time: Instant::now(),
    });

    // Build the HTTP router.
    let app = build_router(state);

    // Start the server.
    let listen_addr = cli.listen;
    info!(addr = listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
