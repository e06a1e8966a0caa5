//! MACD (Moving Average Convergence Divergence) indicator
//!
//! MACD = EMA(fast) - EMA(slow)
//! Signal = EMA(signal) of the MACD line
//! Histogram = MACD - Signal

use crate::indicators::trend::EmaState;
use crate::models::MacdPoint;

#[derive(Debug, Clone)]
pub struct MacdState {
    fast: EmaState,
    slow: EmaState,
    signal: EmaState,
}

impl MacdState {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: EmaState::new(fast),
            slow: EmaState::new(slow),
            signal: EmaState::new(signal),
        }
    }

    pub fn update(&mut self, close: f64) -> MacdPoint {
        let fast = self.fast.update(close);
        let slow = self.slow.update(close);
        let Some(macd) = fast.zip(slow).map(|(f, s)| f - s) else {
            return MacdPoint::default();
        };
        let signal = self.signal.update(macd);
        MacdPoint {
            macd: Some(macd),
            signal,
            histogram: signal.map(|s| macd - s),
        }
    }
}

pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Vec<MacdPoint> {
    let mut state = MacdState::new(fast, slow, signal);
    closes.iter().map(|&c| state.update(c)).collect()
}
