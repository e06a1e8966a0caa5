//! Integration tests for the batch orchestrator
//!
//! Runs the full fetch -> compute -> write pipeline against a static bar
//! source and the in-memory store.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tickerlens::calendar::TradingCalendar;
use tickerlens::config::PipelineConfig;
use tickerlens::core::{bootstrap, CancelHandle, CancelSignal, RunRequest};
use tickerlens::db::{InMemoryIndicatorStore, IndicatorStore, StoreError};
use tickerlens::indicators::IndicatorEngine;
use tickerlens::config::SignalThresholds;
use tickerlens::metrics::Metrics;
use tickerlens::models::{Bar, DateSpan, FailureKind, RunMode, Stage};
use tickerlens::services::{FetchError, StaticBarSource};
use tickerlens::signals::SignalClassifier;

use crate::test_utils::{
    build_orchestrator, fixed_time, ids, small_indicators, test_config, trading_dates,
    weekday_bars, CancellingSource, FlakySource,
};

fn full_request(instruments: &[&str], days: usize) -> RunRequest {
    let dates = trading_dates(days);
    RunRequest::new(
        ids(instruments),
        DateSpan::new(dates[0], dates[days - 1]),
        RunMode::Full,
    )
    .computed_at(fixed_time())
}

#[tokio::test]
async fn failing_instruments_do_not_affect_others() {
    let mut gapped = weekday_bars("TSLA", 20);
    gapped.remove(10);
    let source = StaticBarSource::new()
        .with_bars("AAPL", weekday_bars("AAPL", 20))
        .with_bars("TSLA", gapped)
        .with_failure(
            "MSFT",
            FetchError::NotFound {
                instrument: "MSFT".into(),
            },
        );
    let store = Arc::new(InMemoryIndicatorStore::new());
    let orchestrator = build_orchestrator(Arc::new(source), store.clone(), test_config());

    let summary = orchestrator
        .run(full_request(&["AAPL", "MSFT", "TSLA"], 20), CancelSignal::never())
        .await;

    assert_eq!(summary.instruments_total, 3);
    assert_eq!(summary.instruments_processed, 1);
    assert_eq!(summary.instruments_failed(), 2);
    assert_eq!(summary.rows_written, 20);
    assert!(!summary.is_clean());

    let msft = summary.failure_for("MSFT").unwrap();
    assert_eq!(msft.kind, FailureKind::Fetch);
    assert_eq!(msft.stage, Stage::Fetching);

    let tsla = summary.failure_for("TSLA").unwrap();
    assert_eq!(tsla.kind, FailureKind::DataIntegrity);
    assert_eq!(tsla.stage, Stage::Computing);

    assert_eq!(store.len().await, 20);
    let dates = trading_dates(20);
    assert!(store.read("TSLA", dates[0], dates[19]).await.unwrap().is_empty());
}

#[tokio::test]
async fn summary_keeps_request_order() {
    let source = StaticBarSource::new()
        .with_bars("NVDA", weekday_bars("NVDA", 10))
        .with_bars("AAPL", weekday_bars("AAPL", 10))
        .with_bars("AMD", weekday_bars("AMD", 10));
    let store = Arc::new(InMemoryIndicatorStore::new());
    let orchestrator = build_orchestrator(Arc::new(source), store, test_config());

    let summary = orchestrator
        .run(full_request(&["NVDA", "AAPL", "AMD"], 10), CancelSignal::never())
        .await;

    let order: Vec<&str> = summary
        .reports
        .iter()
        .map(|r| r.instrument_id.as_str())
        .collect();
    assert_eq!(order, vec!["NVDA", "AAPL", "AMD"]);
    assert!(summary.is_clean());
    assert_eq!(summary.rows_written, 30);
}

#[tokio::test]
async fn stored_rows_match_direct_computation() {
    let bars = weekday_bars("AAPL", 25);
    let source = StaticBarSource::new().with_bars("AAPL", bars.clone());
    let store = Arc::new(InMemoryIndicatorStore::new());
    let orchestrator = build_orchestrator(Arc::new(source), store.clone(), test_config());

    orchestrator
        .run(full_request(&["AAPL"], 25), CancelSignal::never())
        .await;

    let engine = IndicatorEngine::new(small_indicators()).unwrap();
    let mut expected = engine.compute(&bars, fixed_time()).unwrap();
    SignalClassifier::new(SignalThresholds::default()).apply(&mut expected);

    let dates = trading_dates(25);
    let stored = store.read("AAPL", dates[0], dates[24]).await.unwrap();
    assert_eq!(stored, expected);
}

#[tokio::test]
async fn repeated_runs_are_idempotent() {
    let source = Arc::new(StaticBarSource::new().with_bars("AAPL", weekday_bars("AAPL", 15)));
    let store = Arc::new(InMemoryIndicatorStore::new());
    let orchestrator = build_orchestrator(source, store.clone(), test_config());

    orchestrator
        .run(full_request(&["AAPL"], 15), CancelSignal::never())
        .await;
    let first = serde_json::to_string(&store.all().await).unwrap();

    orchestrator
        .run(full_request(&["AAPL"], 15), CancelSignal::never())
        .await;
    let second = serde_json::to_string(&store.all().await).unwrap();

    assert_eq!(first, second);
    assert_eq!(store.len().await, 15);
}

#[tokio::test]
async fn missing_trailing_bars_are_reported_not_failed() {
    let source = StaticBarSource::new().with_bars("AAPL", weekday_bars("AAPL", 20));
    let store = Arc::new(InMemoryIndicatorStore::new());
    let orchestrator = build_orchestrator(Arc::new(source), store.clone(), test_config());

    let summary = orchestrator
        .run(full_request(&["AAPL"], 22), CancelSignal::never())
        .await;

    let report = summary.report_for("AAPL").unwrap();
    assert_eq!(report.rows_written, 20);
    assert_eq!(report.unfilled_dates, 2);
    assert!(summary.failures.is_empty());
}

#[tokio::test]
async fn transient_fetch_errors_are_retried() {
    let inner = StaticBarSource::new().with_bars("AAPL", weekday_bars("AAPL", 10));
    let source = Arc::new(FlakySource::new(inner, 2));
    let store = Arc::new(InMemoryIndicatorStore::new());
    let metrics = Arc::new(Metrics::new().unwrap());
    let orchestrator = build_orchestrator(source.clone(), store.clone(), test_config())
        .with_metrics(metrics.clone());

    let summary = orchestrator
        .run(full_request(&["AAPL"], 10), CancelSignal::never())
        .await;

    assert!(summary.is_clean());
    assert_eq!(source.calls(), 3);
    assert_eq!(store.len().await, 10);
    assert_eq!(metrics.fetch_retries_total.get(), 2);
}

#[tokio::test]
async fn exhausted_fetch_retries_fail_the_instrument() {
    let inner = StaticBarSource::new().with_bars("AAPL", weekday_bars("AAPL", 10));
    let source = Arc::new(FlakySource::new(inner, 10));
    let store = Arc::new(InMemoryIndicatorStore::new());
    let orchestrator = build_orchestrator(source.clone(), store.clone(), test_config());

    let summary = orchestrator
        .run(full_request(&["AAPL"], 10), CancelSignal::never())
        .await;

    let failure = summary.failure_for("AAPL").unwrap();
    assert_eq!(failure.kind, FailureKind::Fetch);
    assert_eq!(failure.stage, Stage::Fetching);
    // one attempt plus two retries
    assert_eq!(source.calls(), 3);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn permanent_fetch_errors_are_not_retried() {
    let inner = StaticBarSource::new().with_failure(
        "ZZZZ",
        FetchError::NotFound {
            instrument: "ZZZZ".into(),
        },
    );
    let source = Arc::new(FlakySource::new(inner, 0));
    let store = Arc::new(InMemoryIndicatorStore::new());
    let orchestrator = build_orchestrator(source.clone(), store, test_config());

    let summary = orchestrator
        .run(full_request(&["ZZZZ"], 10), CancelSignal::never())
        .await;

    assert_eq!(summary.instruments_failed(), 1);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn write_conflict_is_retried_with_full_batch() {
    let source = StaticBarSource::new().with_bars("AAPL", weekday_bars("AAPL", 12));
    let store = Arc::new(InMemoryIndicatorStore::new());
    store
        .inject_write_failures([StoreError::Conflict("could not serialize access".into())])
        .await;
    let orchestrator = build_orchestrator(Arc::new(source), store.clone(), test_config());

    let summary = orchestrator
        .run(full_request(&["AAPL"], 12), CancelSignal::never())
        .await;

    assert!(summary.is_clean());
    assert_eq!(store.batch_calls(), 2);
    assert_eq!(store.len().await, 12);
}

#[tokio::test]
async fn constraint_violation_fails_without_partial_rows() {
    let source = StaticBarSource::new().with_bars("AAPL", weekday_bars("AAPL", 12));
    let store = Arc::new(InMemoryIndicatorStore::new());
    store
        .inject_write_failures([StoreError::ConstraintViolation("check failed".into())])
        .await;
    let orchestrator = build_orchestrator(Arc::new(source), store.clone(), test_config());

    let summary = orchestrator
        .run(full_request(&["AAPL"], 12), CancelSignal::never())
        .await;

    let failure = summary.failure_for("AAPL").unwrap();
    assert_eq!(failure.kind, FailureKind::Write);
    assert_eq!(failure.stage, Stage::Writing);
    assert_eq!(store.batch_calls(), 1);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn cancelled_before_start_skips_everything() {
    let source = StaticBarSource::new().with_bars("AAPL", weekday_bars("AAPL", 10));
    let store = Arc::new(InMemoryIndicatorStore::new());
    let orchestrator = build_orchestrator(Arc::new(source), store.clone(), test_config());

    let handle = CancelHandle::new();
    handle.cancel();
    let summary = orchestrator
        .run(full_request(&["AAPL", "MSFT"], 10), handle.signal())
        .await;

    assert_eq!(summary.instruments_processed, 0);
    assert_eq!(summary.skipped, ids(&["AAPL", "MSFT"]));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn cancel_mid_run_finishes_in_flight_and_skips_rest() {
    let handle = CancelHandle::new();
    let inner = StaticBarSource::new()
        .with_bars("AAPL", weekday_bars("AAPL", 10))
        .with_bars("MSFT", weekday_bars("MSFT", 10))
        .with_bars("NVDA", weekday_bars("NVDA", 10));
    let source = CancellingSource::new(inner, handle.clone());
    let store = Arc::new(InMemoryIndicatorStore::new());
    let mut config = test_config();
    config.concurrency = 1;
    let orchestrator = build_orchestrator(Arc::new(source), store.clone(), config);

    let summary = orchestrator
        .run(full_request(&["AAPL", "MSFT", "NVDA"], 10), handle.signal())
        .await;

    assert_eq!(summary.instruments_processed, 1);
    assert!(summary.report_for("AAPL").is_some());
    assert_eq!(summary.skipped, ids(&["MSFT", "NVDA"]));
    assert_eq!(store.len().await, 10);
}

#[tokio::test]
async fn expired_run_timeout_dispatches_nothing() {
    let source = StaticBarSource::new().with_bars("AAPL", weekday_bars("AAPL", 10));
    let store = Arc::new(InMemoryIndicatorStore::new());
    let mut config = test_config();
    config.run_timeout = Some(Duration::ZERO);
    let orchestrator = build_orchestrator(Arc::new(source), store.clone(), config);

    let summary = orchestrator
        .run(full_request(&["AAPL"], 10), CancelSignal::never())
        .await;

    assert_eq!(summary.skipped, ids(&["AAPL"]));
    assert!(!summary.is_clean());
}

#[tokio::test]
async fn run_updates_metrics() {
    let source = StaticBarSource::new()
        .with_bars("AAPL", weekday_bars("AAPL", 10))
        .with_failure(
            "MSFT",
            FetchError::MalformedResponse("truncated body".into()),
        );
    let store = Arc::new(InMemoryIndicatorStore::new());
    let metrics = Arc::new(Metrics::new().unwrap());
    let orchestrator =
        build_orchestrator(Arc::new(source), store, test_config()).with_metrics(metrics.clone());

    orchestrator
        .run(full_request(&["AAPL", "MSFT"], 10), CancelSignal::never())
        .await;

    assert_eq!(metrics.runs_total.get(), 1);
    assert_eq!(metrics.instruments_processed_total.get(), 1);
    assert_eq!(metrics.instruments_failed_total.get(), 1);
    assert_eq!(metrics.rows_written_total.get(), 10);
    assert!(metrics.export().unwrap().contains("tickerlens_runs_total 1"));
}

#[tokio::test]
async fn out_of_order_provider_data_fails_the_instrument() {
    let mut shuffled = weekday_bars("AAPL", 20);
    shuffled.swap(8, 9);
    let source = StaticBarSource::new()
        .with_bars("AAPL", shuffled)
        .with_bars("MSFT", weekday_bars("MSFT", 20));
    let store = Arc::new(InMemoryIndicatorStore::new());
    let orchestrator = build_orchestrator(Arc::new(source), store.clone(), test_config());

    let summary = orchestrator
        .run(full_request(&["AAPL", "MSFT"], 20), CancelSignal::never())
        .await;

    let aapl = summary.failure_for("AAPL").unwrap();
    assert_eq!(aapl.kind, FailureKind::DataIntegrity);
    assert_eq!(aapl.stage, Stage::Computing);
    assert_eq!(summary.instruments_processed, 1);
    assert_eq!(store.len().await, 20);
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Daily AAPL history from 2023-06-01 to 2024-03-28 as the exchange
/// published it, with no sessions on its holidays.
fn exchange_history() -> Vec<Bar> {
    let closed = [
        d(2023, 6, 19),
        d(2023, 7, 4),
        d(2023, 9, 4),
        d(2023, 11, 23),
        d(2023, 12, 25),
        d(2024, 1, 1),
        d(2024, 1, 15),
        d(2024, 2, 19),
    ];
    TradingCalendar::weekdays()
        .trading_days(d(2023, 6, 1), d(2024, 3, 28))
        .into_iter()
        .filter(|date| !closed.contains(date))
        .enumerate()
        .map(|(i, date)| {
            let close = 180.0 + ((i * 13) % 17) as f64 - 8.0;
            Bar::new("AAPL", date, close - 0.5, close + 1.5, close - 1.5, close, 50_000_000)
        })
        .collect()
}

fn env_config(pairs: &[(&str, &str)]) -> PipelineConfig {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    PipelineConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

fn holiday_week_request() -> RunRequest {
    RunRequest::new(
        ids(&["AAPL"]),
        DateSpan::new(d(2024, 3, 25), d(2024, 3, 28)),
        RunMode::Full,
    )
    .computed_at(fixed_time())
}

#[tokio::test]
async fn default_config_accepts_history_with_exchange_holidays() {
    let config = env_config(&[]);
    let source = StaticBarSource::new().with_bars("AAPL", exchange_history());
    let store = Arc::new(InMemoryIndicatorStore::new());
    let orchestrator =
        bootstrap::build_orchestrator(&config, Arc::new(source), store.clone(), None).unwrap();

    let summary = orchestrator
        .run(holiday_week_request(), CancelSignal::never())
        .await;

    assert!(summary.is_clean(), "failures: {:?}", summary.failures);
    assert_eq!(summary.rows_written, 4);
    let stored = store.read("AAPL", d(2024, 3, 25), d(2024, 3, 28)).await.unwrap();
    assert_eq!(stored.len(), 4);
    assert!(stored.iter().all(|row| row.sma.is_some()));
}

#[tokio::test]
async fn weekday_calendar_flags_exchange_holidays_as_gaps() {
    let config = env_config(&[("MARKET_CALENDAR", "weekdays")]);
    let source = StaticBarSource::new().with_bars("AAPL", exchange_history());
    let store = Arc::new(InMemoryIndicatorStore::new());
    let orchestrator =
        bootstrap::build_orchestrator(&config, Arc::new(source), store.clone(), None).unwrap();

    let summary = orchestrator
        .run(holiday_week_request(), CancelSignal::never())
        .await;

    let aapl = summary.failure_for("AAPL").unwrap();
    assert_eq!(aapl.kind, FailureKind::DataIntegrity);
    assert!(store.is_empty().await);
}
