//! Bollinger Bands indicator
//!
//! Middle Band = SMA(window)
//! Upper Band = Middle + z * stddev(window)
//! Lower Band = Middle - z * stddev(window)

use crate::common::math;
use crate::config::StdDevMode;
use crate::indicators::trend::RollingWindow;
use crate::models::BollingerBands;

#[derive(Debug, Clone)]
pub struct BollingerState {
    window: RollingWindow,
    z: f64,
    mode: StdDevMode,
}

impl BollingerState {
    pub fn new(window: usize, z: f64, mode: StdDevMode) -> Self {
        Self {
            window: RollingWindow::new(window),
            z,
            mode,
        }
    }

    pub fn update(&mut self, close: f64) -> Option<BollingerBands> {
        self.window.push(close);
        let middle = self.window.mean()?;
        let sample = self.mode == StdDevMode::Sample;
        let std = math::standard_deviation(self.window.iter(), middle, sample)?;
        Some(BollingerBands {
            middle,
            upper: middle + self.z * std,
            lower: middle - self.z * std,
        })
    }
}

pub fn calculate_bollinger_bands(
    closes: &[f64],
    window: usize,
    z: f64,
    mode: StdDevMode,
) -> Vec<Option<BollingerBands>> {
    let mut state = BollingerState::new(window, z, mode);
    closes.iter().map(|&c| state.update(c)).collect()
}
