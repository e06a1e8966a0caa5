//! TickerLens CLI: one-off runs, the daily reconcile and CSV export.
//!
//! Commands:
//! - `run` recompute (or reconcile) a date range for some or all tickers
//! - `daily` the same reconcile the worker performs on its schedule
//! - `export` dump stored rows for one ticker to CSV

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tickerlens::config::{parse_list, PipelineConfig};
use tickerlens::core::bootstrap;
use tickerlens::core::{daily_request, CancelHandle, RunRequest};
use tickerlens::db::IndicatorStore;
use tickerlens::logging;
use tickerlens::models::{DateSpan, RunMode, RunSummary};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "tickerlens", about = "Daily indicator and signal pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute indicators for a date range.
    Run {
        /// First date to write (YYYY-MM-DD).
        #[arg(long)]
        start: NaiveDate,

        /// Last date to write. Defaults to the previous trading day.
        #[arg(long)]
        end: Option<NaiveDate>,

        /// `full` overwrites every day, `reconcile` only fills missing days.
        #[arg(long, default_value = "full")]
        mode: RunMode,

        /// Comma-separated tickers. Defaults to TICKERS.
        #[arg(long)]
        tickers: Option<String>,

        /// Keep rows in memory instead of writing to the database.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Also write the run summary as JSON to this path.
        #[arg(long)]
        summary_out: Option<PathBuf>,
    },
    /// Reconcile the trailing window up to the previous trading day.
    Daily {
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Export stored rows for one ticker to CSV.
    Export {
        #[arg(long)]
        ticker: String,

        #[arg(long)]
        start: NaiveDate,

        #[arg(long)]
        end: NaiveDate,

        #[arg(long, default_value = "indicators.csv")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env()?;

    match cli.command {
        Commands::Run {
            start,
            end,
            mode,
            tickers,
            dry_run,
            summary_out,
        } => {
            let calendar = bootstrap::calendar(&config);
            let end = end.unwrap_or_else(|| calendar.previous_trading_day(Utc::now().date_naive()));
            let instruments = tickers
                .map(|t| parse_list(&t))
                .unwrap_or_else(|| config.universe.clone());
            let request = RunRequest::new(instruments, DateSpan::new(start, end), mode);
            let summary = execute(&config, request, dry_run).await?;
            if let Some(path) = summary_out {
                std::fs::write(&path, serde_json::to_vec_pretty(&summary)?)?;
                info!(path = %path.display(), "Run summary written");
            }
            finish(&summary)
        }
        Commands::Daily { dry_run } => {
            let calendar = bootstrap::calendar(&config);
            let now = Utc::now();
            let request = daily_request(
                &calendar,
                &config.universe,
                config.reconcile_lookback_days,
                now.date_naive(),
                now,
            );
            let summary = execute(&config, request, dry_run).await?;
            finish(&summary)
        }
        Commands::Export {
            ticker,
            start,
            end,
            out,
        } => {
            let store = bootstrap::connect_store(&config).await?;
            let rows = store.read(&ticker.to_uppercase(), start, end).await?;
            let written = tickerlens::export::write_csv_file(&rows, &out)?;
            info!(ticker = %ticker, rows = written, path = %out.display(), "Export complete");
            Ok(())
        }
    }
}

async fn execute(
    config: &PipelineConfig,
    request: RunRequest,
    dry_run: bool,
) -> Result<RunSummary, Box<dyn std::error::Error + Send + Sync>> {
    let store: Arc<dyn IndicatorStore> = if dry_run {
        bootstrap::dry_run_store()
    } else {
        bootstrap::connect_store(config).await?
    };
    let source = bootstrap::yahoo_source(config)?;
    let orchestrator = bootstrap::build_orchestrator(config, source, store, None)?;

    let cancel = CancelHandle::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight instruments");
            on_ctrl_c.cancel();
        }
    });

    Ok(orchestrator.run(request, cancel.signal()).await)
}

fn finish(summary: &RunSummary) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    if summary.is_clean() {
        Ok(())
    } else {
        Err(format!(
            "{} instrument(s) failed, {} skipped",
            summary.instruments_failed(),
            summary.skipped.len()
        )
        .into())
    }
}
