//! Daily OHLCV bar, the unit of input for the pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One trading day of prices for one instrument.
///
/// Bars are immutable once fetched; `(instrument_id, trading_date)` is unique
/// and `trading_date` is the ordering key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub instrument_id: String,
    pub trading_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub fn new(
        instrument_id: impl Into<String>,
        trading_date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            trading_date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Describe why this bar cannot be used, if it cannot.
    pub fn defect(&self) -> Option<&'static str> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return Some("non-finite price");
        }
        if prices.iter().any(|p| *p <= 0.0) {
            return Some("non-positive price");
        }
        if self.high < self.low {
            return Some("high below low");
        }
        if self.close > self.high || self.close < self.low {
            return Some("close outside high/low range");
        }
        None
    }
}
