//! Shared fixtures for pipeline integration tests

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tickerlens::calendar::TradingCalendar;
use tickerlens::config::{IndicatorConfig, OrchestratorConfig, SignalThresholds};
use tickerlens::core::{BatchOrchestrator, CancelHandle, RetryPolicy};
use tickerlens::db::IndicatorStore;
use tickerlens::indicators::IndicatorEngine;
use tickerlens::models::{Bar, DateSpan};
use tickerlens::services::{BarSource, FetchError};
use tickerlens::signals::SignalClassifier;

/// First `n` weekdays starting Monday 2024-01-01.
pub fn trading_dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    TradingCalendar::weekdays()
        .trading_days_from(start)
        .take(n)
        .collect()
}

/// A deterministic, well-formed daily history.
pub fn weekday_bars(instrument_id: &str, n: usize) -> Vec<Bar> {
    trading_dates(n)
        .into_iter()
        .enumerate()
        .map(|(i, date)| {
            let close = 100.0 + ((i * 7) % 11) as f64 - 5.0;
            Bar::new(instrument_id, date, close, close + 1.0, close - 1.0, close, 1_000 + i as u64)
        })
        .collect()
}

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 22, 30, 0).unwrap()
}

/// Short windows so a handful of bars is enough to warm everything up.
pub fn small_indicators() -> IndicatorConfig {
    IndicatorConfig {
        sma_window: 3,
        ema_window: 3,
        bollinger_window: 3,
        rsi_period: 2,
        macd_fast: 2,
        macd_slow: 3,
        macd_signal_period: 2,
        ..IndicatorConfig::default()
    }
}

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        concurrency: 4,
        lookback_bars: 5,
        fetch_retry: RetryPolicy::new(2, Duration::from_millis(1)),
        write_retry: RetryPolicy::new(2, Duration::from_millis(1)),
        run_timeout: None,
    }
}

pub fn build_orchestrator(
    source: Arc<dyn BarSource>,
    store: Arc<dyn IndicatorStore>,
    config: OrchestratorConfig,
) -> BatchOrchestrator {
    BatchOrchestrator::new(
        source,
        store,
        IndicatorEngine::new(small_indicators()).unwrap(),
        SignalClassifier::new(SignalThresholds::default()),
        TradingCalendar::weekdays(),
        config,
    )
}

pub fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Fails the first `failures` fetches with a transient error, then delegates.
pub struct FlakySource<S> {
    inner: S,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
}

impl<S> FlakySource<S> {
    pub fn new(inner: S, failures: usize) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: BarSource> BarSource for FlakySource<S> {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn fetch(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(FetchError::TransientNetwork("connection reset".into()));
        }
        self.inner.fetch(instrument_id, start, end).await
    }
}

/// Records every requested fetch span.
pub struct RecordingSource<S> {
    inner: S,
    requests: Mutex<Vec<(String, DateSpan)>>,
}

impl<S> RecordingSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(String, DateSpan)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl<S: BarSource> BarSource for RecordingSource<S> {
    fn name(&self) -> &str {
        "recording"
    }

    async fn fetch(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((instrument_id.to_string(), DateSpan::new(start, end)));
        self.inner.fetch(instrument_id, start, end).await
    }
}

/// Requests cancellation of the run on its first fetch.
pub struct CancellingSource<S> {
    inner: S,
    handle: CancelHandle,
}

impl<S> CancellingSource<S> {
    pub fn new(inner: S, handle: CancelHandle) -> Self {
        Self { inner, handle }
    }
}

#[async_trait]
impl<S: BarSource> BarSource for CancellingSource<S> {
    fn name(&self) -> &str {
        "cancelling"
    }

    async fn fetch(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, FetchError> {
        self.handle.cancel();
        self.inner.fetch(instrument_id, start, end).await
    }
}
