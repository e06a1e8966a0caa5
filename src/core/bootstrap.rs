//! Wiring shared by the binaries: config in, pipeline components out.

use std::sync::Arc;
use tracing::info;

use crate::calendar::TradingCalendar;
use crate::config::{ConfigurationError, PipelineConfig};
use crate::core::orchestrator::BatchOrchestrator;
use crate::db::{IndicatorStore, InMemoryIndicatorStore, PostgresIndicatorStore};
use crate::indicators::IndicatorEngine;
use crate::metrics::Metrics;
use crate::services::{BarSource, FetchError, YahooBarSource};
use crate::signals::SignalClassifier;

/// Exchange rules from `MARKET_CALENDAR` plus any `MARKET_HOLIDAYS` closures.
pub fn calendar(config: &PipelineConfig) -> TradingCalendar {
    TradingCalendar::from_rules(config.market_calendar)
        .with_extra_holidays(config.holidays.iter().copied())
}

/// Postgres store with the schema in place.
pub async fn connect_store(
    config: &PipelineConfig,
) -> Result<Arc<dyn IndicatorStore>, Box<dyn std::error::Error + Send + Sync>> {
    let url = config.require_database_url()?;
    let store = PostgresIndicatorStore::connect(url, config.database_pool_size).await?;
    store.ensure_schema().await?;
    Ok(Arc::new(store))
}

/// In-memory store for dry runs; nothing is persisted.
pub fn dry_run_store() -> Arc<dyn IndicatorStore> {
    info!("Dry run: rows are kept in memory only");
    Arc::new(InMemoryIndicatorStore::new())
}

pub fn yahoo_source(config: &PipelineConfig) -> Result<Arc<dyn BarSource>, FetchError> {
    Ok(Arc::new(YahooBarSource::with_base_url(
        config.yahoo_base_url.clone(),
    )?))
}

pub fn build_orchestrator(
    config: &PipelineConfig,
    source: Arc<dyn BarSource>,
    store: Arc<dyn IndicatorStore>,
    metrics: Option<Arc<Metrics>>,
) -> Result<BatchOrchestrator, ConfigurationError> {
    let engine = IndicatorEngine::new(config.indicators.clone())?;
    let orchestrator = BatchOrchestrator::new(
        source,
        store,
        engine,
        SignalClassifier::new(config.thresholds),
        calendar(config),
        config.orchestrator.clone(),
    );
    Ok(match metrics {
        Some(m) => orchestrator.with_metrics(m),
        None => orchestrator,
    })
}
