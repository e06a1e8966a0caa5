//! Backfill planning: which dates to recompute and which bars that needs.
//!
//! Persisted dates are compared with the trading calendar. Each run of
//! consecutive missing days becomes a segment whose fetch span also reaches
//! `context_bars` sessions back, so the rolling windows are warm again by the
//! first missing day. Overlapping segments are merged.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::calendar::TradingCalendar;
use crate::db::{IndicatorStore, StoreError};
use crate::models::DateSpan;

/// One contiguous fetch and the dates from it that get written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub fetch: DateSpan,
    pub write_dates: BTreeSet<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillPlan {
    pub instrument_id: String,
    pub segments: Vec<Segment>,
}

impl BackfillPlan {
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.write_dates.is_empty())
    }

    /// Every date the plan will write, ascending.
    pub fn missing(&self) -> Vec<NaiveDate> {
        let all: BTreeSet<NaiveDate> = self
            .segments
            .iter()
            .flat_map(|s| s.write_dates.iter().copied())
            .collect();
        all.into_iter().collect()
    }

    /// Recompute every trading day of `span`, with trailing context.
    pub fn full(
        instrument_id: &str,
        span: DateSpan,
        calendar: &TradingCalendar,
        context_bars: usize,
    ) -> Self {
        let write_dates: BTreeSet<NaiveDate> =
            calendar.trading_days(span.start, span.end).into_iter().collect();
        let segments = match (write_dates.first(), write_dates.last()) {
            (Some(&first), Some(&last)) => vec![Segment {
                fetch: DateSpan::new(calendar.step_back(first, context_bars), last),
                write_dates,
            }],
            _ => Vec::new(),
        };
        Self {
            instrument_id: instrument_id.to_string(),
            segments,
        }
    }
}

pub struct GapReconciler {
    store: Arc<dyn IndicatorStore>,
    calendar: TradingCalendar,
    context_bars: usize,
}

impl GapReconciler {
    pub fn new(store: Arc<dyn IndicatorStore>, calendar: TradingCalendar, context_bars: usize) -> Self {
        Self {
            store,
            calendar,
            context_bars,
        }
    }

    /// Trading days in `span` with no persisted row.
    pub async fn missing_dates(
        &self,
        instrument_id: &str,
        span: DateSpan,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        if span.is_empty() {
            return Ok(Vec::new());
        }
        let persisted = self
            .store
            .persisted_dates(instrument_id, span.start, span.end)
            .await?;
        Ok(self
            .calendar
            .trading_days(span.start, span.end)
            .into_iter()
            .filter(|d| !persisted.contains(d))
            .collect())
    }

    pub async fn plan(&self, instrument_id: &str, span: DateSpan) -> Result<BackfillPlan, StoreError> {
        let missing = self.missing_dates(instrument_id, span).await?;
        let segments = self.segments_for(&missing);
        debug!(
            instrument_id = %instrument_id,
            range = %span,
            missing = missing.len(),
            segments = segments.len(),
            "Planned backfill"
        );
        Ok(BackfillPlan {
            instrument_id: instrument_id.to_string(),
            segments,
        })
    }

    /// Group ascending missing dates into merged fetch segments.
    pub fn segments_for(&self, missing: &[NaiveDate]) -> Vec<Segment> {
        let mut runs: Vec<(NaiveDate, NaiveDate)> = Vec::new();
        for &date in missing {
            match runs.last_mut() {
                Some((_, end)) if self.calendar.next_trading_day(*end) >= date => *end = date,
                _ => runs.push((date, date)),
            }
        }

        let mut segments: Vec<Segment> = Vec::new();
        for (first, last) in runs {
            let fetch = DateSpan::new(self.calendar.step_back(first, self.context_bars), last);
            let dates = missing
                .iter()
                .copied()
                .filter(|d| *d >= first && *d <= last);

            match segments.last_mut() {
                Some(prev) if fetch.start <= self.calendar.next_trading_day(prev.fetch.end) => {
                    prev.fetch.end = prev.fetch.end.max(fetch.end);
                    prev.write_dates.extend(dates);
                }
                _ => segments.push(Segment {
                    fetch,
                    write_dates: dates.collect(),
                }),
            }
        }
        segments
    }
}
