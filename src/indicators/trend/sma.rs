//! SMA (Simple Moving Average) indicator

use std::collections::VecDeque;

use crate::common::math::CompensatedSum;

/// Fixed-length trailing window with a running sum.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    len: usize,
    values: VecDeque<f64>,
    sum: CompensatedSum,
}

impl RollingWindow {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            values: VecDeque::with_capacity(len + 1),
            sum: CompensatedSum::new(),
        }
    }

    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        self.sum.add(value);
        if self.values.len() > self.len {
            if let Some(old) = self.values.pop_front() {
                self.sum.subtract(old);
            }
        }
    }

    pub fn is_full(&self) -> bool {
        self.len > 0 && self.values.len() == self.len
    }

    /// Mean of the window once it holds `len` values.
    pub fn mean(&self) -> Option<f64> {
        self.is_full().then(|| self.sum.value() / self.len as f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.values.iter()
    }
}

#[derive(Debug, Clone)]
pub struct SmaState {
    window: RollingWindow,
}

impl SmaState {
    pub fn new(window: usize) -> Self {
        Self {
            window: RollingWindow::new(window),
        }
    }

    pub fn update(&mut self, close: f64) -> Option<f64> {
        self.window.push(close);
        self.window.mean()
    }
}

/// SMA for every position of `closes`; `None` until the window is warm.
pub fn calculate_sma(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut state = SmaState::new(window);
    closes.iter().map(|&c| state.update(c)).collect()
}
