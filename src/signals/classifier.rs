//! Threshold and crossover rules.
//!
//! Buy: RSI crosses up through the oversold level while close sits at or
//! below the lower band, or MACD crosses above its signal line.
//! Sell mirrors it with the overbought level, the upper band and a MACD
//! cross below. A bar that satisfies both sides gets neither.

use serde::{Deserialize, Serialize};

use crate::config::SignalThresholds;
use crate::models::IndicatorRow;

/// Direction of a line crossing a reference between two consecutive bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossoverType {
    Above,
    Below,
}

/// Strict crossing test. Any missing value means no crossover.
pub fn crossover(
    prev: Option<f64>,
    prev_reference: Option<f64>,
    cur: Option<f64>,
    cur_reference: Option<f64>,
) -> Option<CrossoverType> {
    let (p, pr, c, cr) = (prev?, prev_reference?, cur?, cur_reference?);
    if p < pr && c > cr {
        Some(CrossoverType::Above)
    } else if p > pr && c < cr {
        Some(CrossoverType::Below)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalDecision {
    pub buy: bool,
    pub sell: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SignalClassifier {
    thresholds: SignalThresholds,
}

impl SignalClassifier {
    pub fn new(thresholds: SignalThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> SignalThresholds {
        self.thresholds
    }

    /// Signals for `current` given the bar before it. The first bar of a
    /// history has no predecessor and never signals.
    pub fn classify(&self, current: &IndicatorRow, previous: Option<&IndicatorRow>) -> SignalDecision {
        let Some(previous) = previous else {
            return SignalDecision::default();
        };

        let oversold = Some(self.thresholds.rsi_oversold);
        let overbought = Some(self.thresholds.rsi_overbought);

        let rsi_up = crossover(previous.rsi, oversold, current.rsi, oversold)
            == Some(CrossoverType::Above);
        let rsi_down = crossover(previous.rsi, overbought, current.rsi, overbought)
            == Some(CrossoverType::Below);

        let macd_cross = crossover(
            previous.macd,
            previous.macd_signal,
            current.macd,
            current.macd_signal,
        );

        let at_lower = current
            .bollinger_lower
            .is_some_and(|lower| current.close <= lower);
        let at_upper = current
            .bollinger_upper
            .is_some_and(|upper| current.close >= upper);

        let buy = (rsi_up && at_lower) || macd_cross == Some(CrossoverType::Above);
        let sell = (rsi_down && at_upper) || macd_cross == Some(CrossoverType::Below);

        if buy && sell {
            return SignalDecision::default();
        }
        SignalDecision { buy, sell }
    }

    /// Classify a date-ordered run of rows in place.
    pub fn apply(&self, rows: &mut [IndicatorRow]) {
        let mut decisions = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let previous = i.checked_sub(1).map(|p| &rows[p]);
            decisions.push(self.classify(row, previous));
        }
        for (row, decision) in rows.iter_mut().zip(decisions) {
            row.buy_signal = decision.buy;
            row.sell_signal = decision.sell;
        }
    }
}
