//! EMA (Exponential Moving Average) indicator

use crate::common::math::{self, CompensatedSum};

/// EMA seeded with the simple average of the first `period` values.
#[derive(Debug, Clone)]
pub struct EmaState {
    period: usize,
    seen: usize,
    seed: CompensatedSum,
    value: Option<f64>,
}

impl EmaState {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            seen: 0,
            seed: CompensatedSum::new(),
            value: None,
        }
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        self.value = match self.value {
            Some(prev) => Some(math::ema_from_previous(value, prev, self.period)),
            None => {
                self.seen += 1;
                self.seed.add(value);
                (self.seen == self.period).then(|| self.seed.value() / self.period as f64)
            }
        };
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// EMA for every position of `values`.
pub fn calculate_ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut state = EmaState::new(period);
    values.iter().map(|&v| state.update(v)).collect()
}
