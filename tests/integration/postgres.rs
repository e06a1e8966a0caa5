//! Postgres store round-trips
//!
//! Skipped unless DATABASE_URL points at a scratch database.

use std::sync::Arc;

use tickerlens::core::{CancelSignal, RunRequest};
use tickerlens::db::{IndicatorStore, PostgresIndicatorStore};
use tickerlens::models::{DateSpan, IndicatorRow, IndicatorValues, RunMode};
use tickerlens::services::StaticBarSource;

use crate::test_utils::{build_orchestrator, fixed_time, ids, test_config, trading_dates, weekday_bars};

async fn connect() -> Option<PostgresIndicatorStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let store = PostgresIndicatorStore::connect(&url, 2)
        .await
        .expect("connect to DATABASE_URL");
    store.ensure_schema().await.expect("create schema");
    Some(store)
}

#[tokio::test]
async fn upsert_replaces_rows_and_reads_back() {
    let Some(store) = connect().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let bars = weekday_bars("PGTEST_RT", 3);
    let mut rows: Vec<IndicatorRow> = bars
        .iter()
        .map(|b| IndicatorRow::from_values(b, IndicatorValues::default(), fixed_time()))
        .collect();
    store.upsert_batch("PGTEST_RT", &rows).await.unwrap();

    rows[1].sma = Some(42.5);
    rows[1].buy_signal = true;
    store.upsert_batch("PGTEST_RT", &rows).await.unwrap();

    let dates = trading_dates(3);
    let stored = store.read("PGTEST_RT", dates[0], dates[2]).await.unwrap();
    assert_eq!(stored, rows);
    assert!(store.exists("PGTEST_RT", dates[1]).await.unwrap());
    assert_eq!(
        store.read_one("PGTEST_RT", dates[1]).await.unwrap(),
        Some(rows[1].clone())
    );

    let persisted = store
        .persisted_dates("PGTEST_RT", dates[0], dates[2])
        .await
        .unwrap();
    assert_eq!(persisted.len(), 3);
}

#[tokio::test]
async fn mixed_batch_is_rejected_whole() {
    let Some(store) = connect().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let mut rows: Vec<IndicatorRow> = weekday_bars("PGTEST_MIX", 2)
        .iter()
        .map(|b| IndicatorRow::from_values(b, IndicatorValues::default(), fixed_time()))
        .collect();
    rows[1].instrument_id = "OTHER".into();

    assert!(store.upsert_batch("PGTEST_MIX", &rows).await.is_err());
    let dates = trading_dates(2);
    assert!(!store.exists("PGTEST_MIX", dates[0]).await.unwrap());
}

#[tokio::test]
async fn pipeline_run_against_postgres() {
    let Some(store) = connect().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let store = Arc::new(store);

    let source = StaticBarSource::new().with_bars("PGTEST_RUN", weekday_bars("PGTEST_RUN", 12));
    let orchestrator = build_orchestrator(Arc::new(source), store.clone(), test_config());
    let dates = trading_dates(12);
    let request = RunRequest::new(
        ids(&["PGTEST_RUN"]),
        DateSpan::new(dates[0], dates[11]),
        RunMode::Full,
    )
    .computed_at(fixed_time());

    let summary = orchestrator.run(request, CancelSignal::never()).await;
    assert!(summary.is_clean());
    assert_eq!(summary.rows_written, 12);

    let stored = store.read("PGTEST_RUN", dates[0], dates[11]).await.unwrap();
    assert_eq!(stored.len(), 12);
    assert!(stored[11].is_warm());
}
