//! Keyed indicator store: one row per (instrument, trading date).

pub mod memory;
pub mod postgres;

pub use memory::InMemoryIndicatorStore;
pub use postgres::PostgresIndicatorStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::models::IndicatorRow;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("corrupt stored row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// A re-upsert of the same rows may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Conflict(_))
    }
}

#[async_trait]
pub trait IndicatorStore: Send + Sync {
    fn name(&self) -> &str;

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert(&self, row: &IndicatorRow) -> Result<(), StoreError> {
        self.upsert_batch(&row.instrument_id, std::slice::from_ref(row))
            .await
            .map(|_| ())
    }

    /// Insert or fully replace every row, all or nothing. Returns rows written.
    async fn upsert_batch(
        &self,
        instrument_id: &str,
        rows: &[IndicatorRow],
    ) -> Result<usize, StoreError>;

    /// Rows in `start..=end`, ascending by date.
    async fn read(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IndicatorRow>, StoreError>;

    async fn read_one(
        &self,
        instrument_id: &str,
        date: NaiveDate,
    ) -> Result<Option<IndicatorRow>, StoreError> {
        Ok(self.read(instrument_id, date, date).await?.into_iter().next())
    }

    async fn exists(&self, instrument_id: &str, date: NaiveDate) -> Result<bool, StoreError>;

    /// Dates in `start..=end` that already have a row.
    async fn persisted_dates(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>, StoreError> {
        let mut found = BTreeSet::new();
        for date in start.iter_days().take_while(|d| *d <= end) {
            if self.exists(instrument_id, date).await? {
                found.insert(date);
            }
        }
        Ok(found)
    }
}

/// Reject a batch that mixes instruments or repeats a date.
pub fn check_batch(instrument_id: &str, rows: &[IndicatorRow]) -> Result<(), StoreError> {
    let mut dates = BTreeSet::new();
    for row in rows {
        if row.instrument_id != instrument_id {
            return Err(StoreError::ConstraintViolation(format!(
                "row for {} in batch for {instrument_id}",
                row.instrument_id
            )));
        }
        if !dates.insert(row.trading_date) {
            return Err(StoreError::ConstraintViolation(format!(
                "duplicate key ({instrument_id}, {})",
                row.trading_date
            )));
        }
    }
    Ok(())
}
