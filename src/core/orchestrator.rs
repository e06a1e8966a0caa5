//! Batch orchestration across the instrument universe.
//!
//! Each instrument is an independent unit:
//! `PENDING -> PLANNING -> FETCHING -> COMPUTING -> WRITING -> DONE`, or a
//! recorded failure. Units run concurrently up to the configured limit and a
//! failed unit never touches any other.

use chrono::{DateTime, NaiveDate, Utc};
use futures_util::{future, stream, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::calendar::TradingCalendar;
use crate::config::OrchestratorConfig;
use crate::core::cancel::CancelSignal;
use crate::core::error::{AtStage, PipelineError, UnitError};
use crate::core::reconciler::{BackfillPlan, GapReconciler};
use crate::core::validation::validate_bars;
use crate::db::{IndicatorStore, StoreError};
use crate::indicators::IndicatorEngine;
use crate::metrics::Metrics;
use crate::models::{
    Bar, DateSpan, IndicatorRow, InstrumentFailure, InstrumentReport, RunMode, RunSummary, Stage,
};
use crate::services::{BarSource, FetchError};
use crate::signals::SignalClassifier;

/// What one run should do.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub instruments: Vec<String>,
    pub span: DateSpan,
    pub mode: RunMode,
    /// Stamped on every row; fix it to make repeated runs byte-identical.
    pub computed_at: DateTime<Utc>,
}

impl RunRequest {
    pub fn new(instruments: Vec<String>, span: DateSpan, mode: RunMode) -> Self {
        Self {
            instruments,
            span,
            mode,
            computed_at: Utc::now(),
        }
    }

    pub fn computed_at(mut self, at: DateTime<Utc>) -> Self {
        self.computed_at = at;
        self
    }
}

pub struct BatchOrchestrator {
    source: Arc<dyn BarSource>,
    store: Arc<dyn IndicatorStore>,
    engine: IndicatorEngine,
    classifier: SignalClassifier,
    calendar: TradingCalendar,
    config: OrchestratorConfig,
    metrics: Option<Arc<Metrics>>,
}

impl BatchOrchestrator {
    pub fn new(
        source: Arc<dyn BarSource>,
        store: Arc<dyn IndicatorStore>,
        engine: IndicatorEngine,
        classifier: SignalClassifier,
        calendar: TradingCalendar,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            source,
            store,
            engine,
            classifier,
            calendar,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn store(&self) -> &Arc<dyn IndicatorStore> {
        &self.store
    }

    /// Run every instrument of `request` and summarize.
    ///
    /// Never fails as a whole: every per-instrument error ends up in the
    /// summary. Once `cancel` fires or the run timeout passes, no new
    /// instrument is started and the remainder is listed as skipped.
    pub async fn run(&self, request: RunRequest, cancel: CancelSignal) -> RunSummary {
        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = self.config.run_timeout.map(|t| started + t);
        let concurrency = self.config.concurrency.max(1);

        info!(
            mode = ?request.mode,
            range = %request.span,
            instruments = request.instruments.len(),
            concurrency,
            source = self.source.name(),
            store = self.store.name(),
            "Starting indicator run"
        );
        if let Some(m) = &self.metrics {
            m.runs_total.inc();
        }

        let request_ref = &request;
        let outcomes: Vec<(String, Result<InstrumentReport, UnitError>)> =
            stream::iter(request.instruments.iter().cloned())
                .take_while(|_| {
                    let expired = deadline.is_some_and(|d| Instant::now() >= d);
                    future::ready(!cancel.is_cancelled() && !expired)
                })
                .map(|instrument_id| async move {
                    let result = self.run_instrument(&instrument_id, request_ref).await;
                    (instrument_id, result)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        let summary = self.summarize(&request, started_at, started, outcomes);
        if let Some(m) = &self.metrics {
            m.run_duration_seconds.observe(started.elapsed().as_secs_f64());
        }

        info!(
            mode = ?summary.mode,
            range = %summary.range,
            processed = summary.instruments_processed,
            failed = summary.instruments_failed(),
            skipped = summary.skipped.len(),
            rows_written = summary.rows_written,
            duration_ms = summary.duration_ms,
            "Indicator run finished"
        );
        summary
    }

    fn summarize(
        &self,
        request: &RunRequest,
        started_at: DateTime<Utc>,
        started: Instant,
        outcomes: Vec<(String, Result<InstrumentReport, UnitError>)>,
    ) -> RunSummary {
        let mut by_id: HashMap<String, Result<InstrumentReport, UnitError>> =
            outcomes.into_iter().collect();

        let mut reports = Vec::new();
        let mut failures = Vec::new();
        let mut skipped = Vec::new();
        for id in &request.instruments {
            match by_id.remove(id) {
                Some(Ok(report)) => reports.push(report),
                Some(Err(err)) => failures.push(InstrumentFailure {
                    instrument_id: id.clone(),
                    stage: err.stage,
                    kind: err.source.kind(),
                    reason: err.source.to_string(),
                }),
                None => skipped.push(id.clone()),
            }
        }

        RunSummary {
            mode: request.mode,
            range: request.span,
            started_at,
            instruments_total: request.instruments.len(),
            instruments_processed: reports.len(),
            rows_written: reports.iter().map(|r| r.rows_written).sum(),
            reports,
            failures,
            skipped,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn run_instrument(
        &self,
        instrument_id: &str,
        request: &RunRequest,
    ) -> Result<InstrumentReport, UnitError> {
        debug!(instrument_id = %instrument_id, stage = ?Stage::Pending, "Instrument dispatched");
        let started = Instant::now();
        let result = self.process(instrument_id, request).await;

        if let Some(m) = &self.metrics {
            m.instrument_duration_seconds
                .observe(started.elapsed().as_secs_f64());
            match &result {
                Ok(report) => {
                    m.instruments_processed_total.inc();
                    m.rows_written_total.inc_by(report.rows_written as u64);
                }
                Err(_) => m.instruments_failed_total.inc(),
            }
        }

        match &result {
            Ok(report) => debug!(
                instrument_id = %instrument_id,
                stage = ?Stage::Done,
                rows_written = report.rows_written,
                unfilled = report.unfilled_dates,
                "Instrument done"
            ),
            Err(err) => warn!(
                instrument_id = %instrument_id,
                stage = ?err.stage,
                kind = ?err.source.kind(),
                error = %err.source,
                "Instrument failed"
            ),
        }
        result
    }

    async fn process(
        &self,
        instrument_id: &str,
        request: &RunRequest,
    ) -> Result<InstrumentReport, UnitError> {
        debug!(instrument_id = %instrument_id, stage = ?Stage::Planning, "Stage transition");
        let plan = match request.mode {
            RunMode::Full => BackfillPlan::full(
                instrument_id,
                request.span,
                &self.calendar,
                self.config.lookback_bars,
            ),
            RunMode::Reconcile => GapReconciler::new(
                self.store.clone(),
                self.calendar.clone(),
                self.config.lookback_bars,
            )
            .plan(instrument_id, request.span)
            .await
            .at(Stage::Planning)?,
        };

        if plan.is_empty() {
            debug!(instrument_id = %instrument_id, "Nothing to write");
            return Ok(InstrumentReport::up_to_date(instrument_id));
        }

        let mut bars_fetched = 0;
        let mut unfilled_dates = 0;
        let mut to_write: Vec<IndicatorRow> = Vec::new();

        for segment in &plan.segments {
            debug!(
                instrument_id = %instrument_id,
                stage = ?Stage::Fetching,
                fetch = %segment.fetch,
                "Stage transition"
            );
            let bars = self
                .fetch_with_retry(instrument_id, segment.fetch)
                .await
                .at(Stage::Fetching)?;
            bars_fetched += bars.len();

            debug!(instrument_id = %instrument_id, stage = ?Stage::Computing, bars = bars.len(), "Stage transition");
            validate_bars(instrument_id, &bars, &self.calendar).at(Stage::Computing)?;
            let rows = self
                .compute(bars, request.computed_at)
                .await
                .at(Stage::Computing)?;

            let produced: BTreeSet<NaiveDate> = rows.iter().map(|r| r.trading_date).collect();
            unfilled_dates += segment
                .write_dates
                .iter()
                .filter(|d| !produced.contains(d))
                .count();
            to_write.extend(
                rows.into_iter()
                    .filter(|r| segment.write_dates.contains(&r.trading_date)),
            );
        }

        if unfilled_dates > 0 {
            debug!(
                instrument_id = %instrument_id,
                unfilled = unfilled_dates,
                "Provider returned no bar for some expected dates"
            );
        }

        debug!(instrument_id = %instrument_id, stage = ?Stage::Writing, rows = to_write.len(), "Stage transition");
        let rows_written = if to_write.is_empty() {
            0
        } else {
            self.write_with_retry(instrument_id, &to_write)
                .await
                .at(Stage::Writing)?
        };

        Ok(InstrumentReport {
            instrument_id: instrument_id.to_string(),
            bars_fetched,
            rows_written,
            unfilled_dates,
        })
    }

    async fn fetch_with_retry(
        &self,
        instrument_id: &str,
        span: DateSpan,
    ) -> Result<Vec<Bar>, FetchError> {
        let source = self.source.as_ref();
        let retries = AtomicUsize::new(0);
        let result = self
            .config
            .fetch_retry
            .run_with_hint(
                || async move { source.fetch(instrument_id, span.start, span.end).await },
                |e: &FetchError| e.is_transient(),
                FetchError::retry_after,
                |e: &FetchError, delay: Duration| {
                    retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        instrument_id = %instrument_id,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Fetch failed, retrying"
                    );
                },
            )
            .await;
        if let Some(m) = &self.metrics {
            m.fetch_retries_total
                .inc_by(retries.load(Ordering::Relaxed) as u64);
        }
        result
    }

    async fn write_with_retry(
        &self,
        instrument_id: &str,
        rows: &[IndicatorRow],
    ) -> Result<usize, StoreError> {
        let store = self.store.as_ref();
        let retries = AtomicUsize::new(0);
        // Every attempt re-upserts the full batch, so a retry after a conflict
        // lands on the same final state.
        let result = self
            .config
            .write_retry
            .run(
                || async move { store.upsert_batch(instrument_id, rows).await },
                |e: &StoreError| e.is_retryable(),
                |e: &StoreError, delay: Duration| {
                    retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        instrument_id = %instrument_id,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Write failed, re-upserting batch"
                    );
                },
            )
            .await;
        if let Some(m) = &self.metrics {
            m.write_retries_total
                .inc_by(retries.load(Ordering::Relaxed) as u64);
        }
        result
    }

    /// Indicators and signals, off the async runtime.
    async fn compute(
        &self,
        bars: Vec<Bar>,
        computed_at: DateTime<Utc>,
    ) -> Result<Vec<IndicatorRow>, PipelineError> {
        let engine = self.engine.clone();
        let classifier = self.classifier;
        tokio::task::spawn_blocking(move || {
            let mut rows = engine.compute(&bars, computed_at)?;
            classifier.apply(&mut rows);
            Ok::<_, PipelineError>(rows)
        })
        .await
        .map_err(|e| PipelineError::Compute(e.to_string()))?
    }
}
