//! TickerLens Worker
//!
//! Fires the daily reconcile run on the RUN_SCHEDULE cron and exposes
//! metrics for the process. Run as a single instance.

use dotenvy::dotenv;
use std::sync::Arc;
use tickerlens::config::PipelineConfig;
use tickerlens::core::bootstrap;
use tickerlens::core::http::start_server;
use tickerlens::core::scheduler::DailyScheduler;
use tickerlens::logging;
use tickerlens::metrics::Metrics;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    logging::init_logging();

    let config = PipelineConfig::from_env()?;
    let env = tickerlens::config::get_environment();
    info!("Starting TickerLens Worker");
    info!(environment = %env, "Environment");
    info!(
        instruments = config.universe.len(),
        schedule = %config.run_schedule,
        concurrency = config.orchestrator.concurrency,
        "Worker configuration"
    );

    let metrics = Arc::new(Metrics::new()?);

    info!("Connecting to store...");
    let store = bootstrap::connect_store(&config).await?;
    metrics.database_connected.set(1);

    let source = bootstrap::yahoo_source(&config)?;
    let orchestrator = Arc::new(bootstrap::build_orchestrator(
        &config,
        source,
        store.clone(),
        Some(metrics.clone()),
    )?);

    let scheduler = DailyScheduler::new(
        orchestrator,
        config.universe.clone(),
        &config.run_schedule,
        config.reconcile_lookback_days,
    )?;
    if let Some(next) = scheduler.next_tick() {
        info!(next_run = %next, "First scheduled run");
    }
    scheduler.start().await;

    // Worker exposes the same health/metrics surface as the API.
    let port = config.port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(port, Some(store), metrics).await {
            error!(error = %e, "HTTP server error");
        }
    });

    info!("Worker started, waiting for shutdown signal...");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down worker, waiting for in-flight instruments...");
        }
        _ = server_handle => {
            error!("HTTP server stopped");
        }
    }

    scheduler.stop().await;
    info!("Worker stopped");
    Ok(())
}
