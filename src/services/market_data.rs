//! Bar source interface and the in-memory implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::models::Bar;

/// Typed failure from a market-data provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("instrument {instrument} not found at provider")]
    NotFound { instrument: String },

    #[error("rate limited by provider")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    /// Network blips and rate limits are worth retrying; the rest are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::TransientNetwork(_))
    }

    /// Wait requested by the provider before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

#[async_trait]
pub trait BarSource: Send + Sync {
    fn name(&self) -> &str;

    /// Daily bars for `instrument_id` in `start..=end`, in the order the
    /// provider returned them.
    async fn fetch(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, FetchError>;
}

/// Serves bars from memory. Used by tests and offline replays.
#[derive(Debug, Clone, Default)]
pub struct StaticBarSource {
    bars: HashMap<String, Vec<Bar>>,
    failures: HashMap<String, FetchError>,
}

impl StaticBarSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, instrument_id: impl Into<String>, bars: Vec<Bar>) -> Self {
        self.bars.insert(instrument_id.into(), bars);
        self
    }

    /// Make every fetch for `instrument_id` fail with `error`.
    pub fn with_failure(mut self, instrument_id: impl Into<String>, error: FetchError) -> Self {
        self.failures.insert(instrument_id.into(), error);
        self
    }
}

#[async_trait]
impl BarSource for StaticBarSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, FetchError> {
        if let Some(err) = self.failures.get(instrument_id) {
            return Err(err.clone());
        }
        let bars = self
            .bars
            .get(instrument_id)
            .ok_or_else(|| FetchError::NotFound {
                instrument: instrument_id.to_string(),
            })?;
        // Order is left as stored so validation sees what a provider sent.
        Ok(bars
            .iter()
            .filter(|b| b.trading_date >= start && b.trading_date <= end)
            .cloned()
            .collect())
    }
}
