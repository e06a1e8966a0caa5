//! Cron trigger for the daily reconcile run.

use chrono::{DateTime, NaiveDate, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::calendar::TradingCalendar;
use crate::config::ConfigurationError;
use crate::core::cancel::CancelHandle;
use crate::core::orchestrator::{BatchOrchestrator, RunRequest};
use crate::models::{DateSpan, RunMode};

/// Reconcile request for the run fired on `today`.
///
/// Targets the previous trading day (today's bar may still be partial) and
/// looks `lookback_days` sessions back so late or failed days get filled.
pub fn daily_request(
    calendar: &TradingCalendar,
    universe: &[String],
    lookback_days: usize,
    today: NaiveDate,
    computed_at: DateTime<Utc>,
) -> RunRequest {
    let target = calendar.previous_trading_day(today);
    let start = calendar.step_back(target, lookback_days);
    RunRequest::new(universe.to_vec(), DateSpan::new(start, target), RunMode::Reconcile)
        .computed_at(computed_at)
}

pub struct DailyScheduler {
    orchestrator: Arc<BatchOrchestrator>,
    universe: Vec<String>,
    schedule: Schedule,
    lookback_days: usize,
    cancel: CancelHandle,
    handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl DailyScheduler {
    /// `cron_expr` is a 6-field expression (seconds first), evaluated in UTC.
    pub fn new(
        orchestrator: Arc<BatchOrchestrator>,
        universe: Vec<String>,
        cron_expr: &str,
        lookback_days: usize,
    ) -> Result<Self, ConfigurationError> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| ConfigurationError::Parse {
            key: "RUN_SCHEDULE".to_string(),
            value: cron_expr.to_string(),
            reason: e.to_string(),
        })?;

        info!(
            cron = %cron_expr,
            instruments = universe.len(),
            lookback_days,
            "DailyScheduler: created"
        );

        Ok(Self {
            orchestrator,
            universe,
            schedule,
            lookback_days,
            cancel: CancelHandle::new(),
            handle: Arc::new(RwLock::new(None)),
        })
    }

    pub fn next_tick(&self) -> Option<DateTime<Utc>> {
        self.schedule.upcoming(Utc).next()
    }

    pub async fn start(&self) {
        let orchestrator = self.orchestrator.clone();
        let universe = self.universe.clone();
        let schedule = self.schedule.clone();
        let lookback_days = self.lookback_days;
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            let mut stop = cancel.signal();
            info!("DailyScheduler: started, waiting for cron schedule...");

            loop {
                let Some(next_tick) = schedule.upcoming(Utc).next() else {
                    warn!("DailyScheduler: schedule has no upcoming ticks");
                    return;
                };
                let wait = (next_tick - Utc::now()).to_std().unwrap_or_default();
                info!(next_tick = %next_tick, "DailyScheduler: sleeping until next run");

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = stop.cancelled() => {
                        info!("DailyScheduler: stop requested while idle");
                        return;
                    }
                }

                let now = Utc::now();
                let request = daily_request(
                    orchestrator.calendar(),
                    &universe,
                    lookback_days,
                    now.date_naive(),
                    now,
                );
                let summary = orchestrator.run(request, cancel.signal()).await;
                if !summary.is_clean() {
                    warn!(
                        failed = summary.instruments_failed(),
                        skipped = summary.skipped.len(),
                        "DailyScheduler: run finished with failures"
                    );
                }
                if cancel.is_cancelled() {
                    return;
                }
            }
        });

        *self.handle.write().await = Some(handle);
        info!("DailyScheduler: started successfully");
    }

    /// Stop after the in-flight run (if any) drains.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.write().await.take();
        if let Some(h) = handle {
            if let Err(e) = h.await {
                warn!(error = %e, "DailyScheduler: task ended abnormally");
            }
            info!("DailyScheduler: stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .read()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}
