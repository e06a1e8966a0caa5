//! In-process store with the same all-or-nothing batch semantics.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};

use super::{check_batch, IndicatorStore, StoreError};
use crate::models::IndicatorRow;

#[derive(Debug, Default)]
pub struct InMemoryIndicatorStore {
    rows: RwLock<BTreeMap<(String, NaiveDate), IndicatorRow>>,
    injected_failures: Mutex<VecDeque<StoreError>>,
    batch_calls: AtomicUsize,
}

impl InMemoryIndicatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `errors.len()` batch writes fail with these errors, in order.
    pub async fn inject_write_failures<I>(&self, errors: I)
    where
        I: IntoIterator<Item = StoreError>,
    {
        self.injected_failures.lock().await.extend(errors);
    }

    /// Number of `upsert_batch` calls, including failed ones.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::Relaxed)
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Every stored row ordered by (instrument, date).
    pub async fn all(&self) -> Vec<IndicatorRow> {
        self.rows.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl IndicatorStore for InMemoryIndicatorStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert_batch(
        &self,
        instrument_id: &str,
        rows: &[IndicatorRow],
    ) -> Result<usize, StoreError> {
        self.batch_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = self.injected_failures.lock().await.pop_front() {
            return Err(err);
        }
        check_batch(instrument_id, rows)?;

        let mut map = self.rows.write().await;
        for row in rows {
            map.insert((row.instrument_id.clone(), row.trading_date), row.clone());
        }
        Ok(rows.len())
    }

    async fn read(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IndicatorRow>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        let map = self.rows.read().await;
        let lo = (instrument_id.to_string(), start);
        let hi = (instrument_id.to_string(), end);
        Ok(map.range(lo..=hi).map(|(_, row)| row.clone()).collect())
    }

    async fn exists(&self, instrument_id: &str, date: NaiveDate) -> Result<bool, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .contains_key(&(instrument_id.to_string(), date)))
    }
}
