use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::bar::Bar;

/// Bollinger band triple for one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
}

/// MACD line, signal line and histogram for one bar.
///
/// The MACD line warms up before its signal line, so the signal and the
/// histogram stay `None` for the first `signal_period - 1` MACD values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacdPoint {
    pub macd: Option<f64>,
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
}

/// Indicator vector produced by one engine step.
///
/// `None` marks a window that is not warm yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValues {
    pub sma: Option<f64>,
    pub ema: Option<f64>,
    pub bollinger: Option<BollingerBands>,
    pub rsi: Option<f64>,
    pub macd: MacdPoint,
}

/// Persisted artifact: one row per (instrument, trading date).
///
/// Rows are always replaced as a whole, never partially updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub instrument_id: String,
    pub trading_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub sma: Option<f64>,
    pub ema: Option<f64>,
    pub bollinger_middle: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_lower: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub buy_signal: bool,
    pub sell_signal: bool,
    pub computed_at: DateTime<Utc>,
}

impl IndicatorRow {
    /// Build an unclassified row; signals start out false.
    pub fn from_values(bar: &Bar, values: IndicatorValues, computed_at: DateTime<Utc>) -> Self {
        Self {
            instrument_id: bar.instrument_id.clone(),
            trading_date: bar.trading_date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            sma: values.sma,
            ema: values.ema,
            bollinger_middle: values.bollinger.map(|b| b.middle),
            bollinger_upper: values.bollinger.map(|b| b.upper),
            bollinger_lower: values.bollinger.map(|b| b.lower),
            rsi: values.rsi,
            macd: values.macd.macd,
            macd_signal: values.macd.signal,
            macd_histogram: values.macd.histogram,
            buy_signal: false,
            sell_signal: false,
            computed_at,
        }
    }

    /// True once every indicator column carries a value.
    pub fn is_warm(&self) -> bool {
        [
            self.sma,
            self.ema,
            self.bollinger_middle,
            self.bollinger_upper,
            self.bollinger_lower,
            self.rsi,
            self.macd,
            self.macd_signal,
            self.macd_histogram,
        ]
        .iter()
        .all(Option::is_some)
    }
}
