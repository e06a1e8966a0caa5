//! RSI (Relative Strength Index) indicator
//!
//! RSI = 100 - 100 / (1 + RS), RS = average gain / average loss.
//! An average loss of zero maps to 100.

use std::collections::VecDeque;

use crate::common::math::{self, CompensatedSum};
use crate::config::RsiSmoothing;

#[derive(Debug, Clone)]
pub struct RsiState {
    period: usize,
    smoothing: RsiSmoothing,
    prev_close: Option<f64>,
    changes: usize,
    gain_sum: CompensatedSum,
    loss_sum: CompensatedSum,
    // Simple smoothing only: trailing (gain, loss) pairs.
    window: VecDeque<(f64, f64)>,
    averages: Option<(f64, f64)>,
}

impl RsiState {
    pub fn new(period: usize, smoothing: RsiSmoothing) -> Self {
        Self {
            period,
            smoothing,
            prev_close: None,
            changes: 0,
            gain_sum: CompensatedSum::new(),
            loss_sum: CompensatedSum::new(),
            window: VecDeque::with_capacity(period + 1),
            averages: None,
        }
    }

    pub fn update(&mut self, close: f64) -> Option<f64> {
        let prev = self.prev_close.replace(close)?;
        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        self.changes += 1;

        self.averages = match self.smoothing {
            RsiSmoothing::Wilder => self.wilder_step(gain, loss),
            RsiSmoothing::Simple => self.simple_step(gain, loss),
        };

        self.averages.map(|(g, l)| rsi_from_averages(g, l))
    }

    fn wilder_step(&mut self, gain: f64, loss: f64) -> Option<(f64, f64)> {
        if let Some((avg_gain, avg_loss)) = self.averages {
            return Some((
                math::wilder_from_previous(gain, avg_gain, self.period),
                math::wilder_from_previous(loss, avg_loss, self.period),
            ));
        }
        self.gain_sum.add(gain);
        self.loss_sum.add(loss);
        let p = self.period as f64;
        (self.changes == self.period)
            .then(|| (self.gain_sum.value() / p, self.loss_sum.value() / p))
    }

    fn simple_step(&mut self, gain: f64, loss: f64) -> Option<(f64, f64)> {
        self.window.push_back((gain, loss));
        self.gain_sum.add(gain);
        self.loss_sum.add(loss);
        if self.window.len() > self.period {
            if let Some((g, l)) = self.window.pop_front() {
                self.gain_sum.subtract(g);
                self.loss_sum.subtract(l);
            }
        }
        let p = self.period as f64;
        (self.window.len() == self.period)
            .then(|| (self.gain_sum.value() / p, self.loss_sum.value() / p))
    }
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss <= 0.0 {
        return 100.0;
    }
    let rs = avg_gain.max(0.0) / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

pub fn calculate_rsi(closes: &[f64], period: usize, smoothing: RsiSmoothing) -> Vec<Option<f64>> {
    let mut state = RsiState::new(period, smoothing);
    closes.iter().map(|&c| state.update(c)).collect()
}
