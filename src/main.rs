//! Dual-protocol reverse proxy for the spot and futures trading APIs.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!                 │                 EXCHANGE PROXY                │
//!                 │                                               │
//!  /spot/...      │  ┌────────┐   ┌───────────┐   ┌────────────┐ │
//!  /futures/... ──┼─▶│  http  │──▶│  family   │──▶│ proxy::rest│─┼─▶ REST upstream
//!                 │  │ server │   │  router   │   └────────────┘ │
//!                 │  └────────┘   └─────┬─────┘   ┌────────────┐ │
//!  ws upgrade ────┼────────────────────-┴────────▶│proxy::relay│─┼─◀▶ WS upstream
//!                 │                                └────────────┘ │
//!                 │  ┌──────────────────────────────────────────┐ │
//!                 │  │ config · observability · lifecycle       │ │
//!                 │  └──────────────────────────────────────────┘ │
//!                 └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use exchange_proxy::config::load_config;
use exchange_proxy::lifecycle::{signals, Shutdown};
use exchange_proxy::observability;
use exchange_proxy::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "exchange-proxy", about = "Reverse proxy for spot and futures trading APIs")]
struct Args {
    /// Path to the config file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    observability::logging::init(&config.logging);

    tracing::info!(
        spot_rest = %config.upstream.spot.rest_url,
        spot_ws = %config.upstream.spot.ws_url,
        futures_rest = %config.upstream.futures.rest_url,
        futures_ws = %config.upstream.futures.ws_url,
        bind_address = %config.server.address(),
        "exchange-proxy starting"
    );

    let shutdown = Arc::new(Shutdown::new());
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            signals::wait_for_signal().await;
            shutdown.trigger();
        });
    }

    let listener = TcpListener::bind(config.server.address()).await?;
    let server = HttpServer::new(&config, shutdown.clone())?;
    server.run(listener, &shutdown).await?;

    tracing::info!("shutdown complete");
    Ok(())
}
