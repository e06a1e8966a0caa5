//! Run-level bookkeeping: stages, modes, per-instrument outcomes and the summary.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

impl fmt::Display for DateSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Per-instrument pipeline stage.
///
/// `Pending -> Fetching -> Computing -> Writing -> Done`; a failure is recorded
/// together with the stage it happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Pending,
    Planning,
    Fetching,
    Computing,
    Writing,
    Done,
}

/// How a run decides which rows to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Recompute and overwrite every trading day in the range.
    Full,
    /// Only fill trading days that have no persisted row yet.
    Reconcile,
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "reconcile" => Ok(Self::Reconcile),
            other => Err(format!("unknown run mode '{other}' (expected full or reconcile)")),
        }
    }
}

/// Failure category surfaced in the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    DataIntegrity,
    Write,
    Compute,
}

/// Terminal FAILED state of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentFailure {
    pub instrument_id: String,
    pub stage: Stage,
    pub kind: FailureKind,
    pub reason: String,
}

/// Terminal DONE state of one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentReport {
    pub instrument_id: String,
    pub bars_fetched: usize,
    pub rows_written: usize,
    /// Dates that were expected but the provider did not return.
    pub unfilled_dates: usize,
}

impl InstrumentReport {
    pub fn up_to_date(instrument_id: impl Into<String>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            bars_fetched: 0,
            rows_written: 0,
            unfilled_dates: 0,
        }
    }
}

/// Single surface for everything that happened during one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub range: DateSpan,
    pub started_at: DateTime<Utc>,
    pub instruments_total: usize,
    pub instruments_processed: usize,
    pub rows_written: usize,
    pub reports: Vec<InstrumentReport>,
    pub failures: Vec<InstrumentFailure>,
    /// Instruments never dispatched because the run was cancelled or timed out.
    pub skipped: Vec<String>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn instruments_failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }

    pub fn failure_for(&self, instrument_id: &str) -> Option<&InstrumentFailure> {
        self.failures.iter().find(|f| f.instrument_id == instrument_id)
    }

    pub fn report_for(&self, instrument_id: &str) -> Option<&InstrumentReport> {
        self.reports.iter().find(|r| r.instrument_id == instrument_id)
    }
}
