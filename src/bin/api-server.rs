//! TickerLens API Server
//!
//! Read-only HTTP API over persisted indicator rows, plus health and metrics.
//! Stateless; scale horizontally behind a load balancer.

use dotenvy::dotenv;
use std::sync::Arc;
use tickerlens::config::PipelineConfig;
use tickerlens::core::bootstrap;
use tickerlens::core::http::start_server;
use tickerlens::logging;
use tickerlens::metrics::Metrics;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    logging::init_logging();

    let config = PipelineConfig::from_env()?;
    let env = tickerlens::config::get_environment();
    info!("Starting TickerLens API Server");
    info!(environment = %env, "Environment");
    info!(port = config.port, "HTTP Server: http://0.0.0.0:{}", config.port);

    let metrics = Arc::new(Metrics::new()?);

    // The API still serves /health and /metrics without a store.
    let store = match bootstrap::connect_store(&config).await {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %e, "Store unavailable - indicator endpoints will return 503");
            None
        }
    };

    let port = config.port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(port, store, metrics).await {
            error!(error = %e, "HTTP server error");
        }
    });

    info!("API server started, waiting for shutdown signal...");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down API server...");
        }
        _ = server_handle => {
            error!("HTTP server stopped");
        }
    }

    Ok(())
}
