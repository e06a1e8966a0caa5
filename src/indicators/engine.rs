//! Per-instrument indicator computation.
//!
//! All rolling state lives in an `EngineState` threaded through a fold over the
//! bar sequence. Nothing is shared between invocations, so replays and parallel
//! instruments cannot interfere.

use chrono::{DateTime, Utc};

use crate::config::{ConfigurationError, IndicatorConfig};
use crate::core::validation::DataIntegrityError;
use crate::indicators::momentum::{MacdState, RsiState};
use crate::indicators::trend::{EmaState, SmaState};
use crate::indicators::volatility::BollingerState;
use crate::models::{Bar, IndicatorRow, IndicatorValues};

/// Rolling accumulators for one instrument, carried at full precision.
#[derive(Debug, Clone)]
pub struct EngineState {
    sma: SmaState,
    ema: EmaState,
    bollinger: BollingerState,
    rsi: RsiState,
    macd: MacdState,
}

impl EngineState {
    pub fn new(config: &IndicatorConfig) -> Self {
        Self {
            sma: SmaState::new(config.sma_window),
            ema: EmaState::new(config.ema_window),
            bollinger: BollingerState::new(
                config.bollinger_window,
                config.bollinger_z,
                config.bollinger_std,
            ),
            rsi: RsiState::new(config.rsi_period, config.rsi_smoothing),
            macd: MacdState::new(config.macd_fast, config.macd_slow, config.macd_signal_period),
        }
    }

    pub fn step(&mut self, close: f64) -> IndicatorValues {
        IndicatorValues {
            sma: self.sma.update(close),
            ema: self.ema.update(close),
            bollinger: self.bollinger.update(close),
            rsi: self.rsi.update(close),
            macd: self.macd.update(close),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    pub fn warmup_len(&self) -> usize {
        self.config.warmup_len()
    }

    /// One unclassified row per input bar.
    ///
    /// Bars must belong to a single instrument and be strictly ascending by
    /// date. Calendar gaps are checked by the caller before this point.
    pub fn compute(
        &self,
        bars: &[Bar],
        computed_at: DateTime<Utc>,
    ) -> Result<Vec<IndicatorRow>, DataIntegrityError> {
        if let Some(first) = bars.first() {
            for pair in bars.windows(2) {
                let (prev, cur) = (&pair[0], &pair[1]);
                if cur.instrument_id != first.instrument_id {
                    return Err(DataIntegrityError::ForeignInstrument {
                        expected: first.instrument_id.clone(),
                        found: cur.instrument_id.clone(),
                        date: cur.trading_date,
                    });
                }
                if cur.trading_date == prev.trading_date {
                    return Err(DataIntegrityError::DuplicateDate {
                        date: cur.trading_date,
                    });
                }
                if cur.trading_date < prev.trading_date {
                    return Err(DataIntegrityError::OutOfOrder {
                        previous: prev.trading_date,
                        found: cur.trading_date,
                    });
                }
            }
        }

        let rows = bars
            .iter()
            .scan(EngineState::new(&self.config), |state, bar| {
                let values = state.step(bar.close);
                Some(IndicatorRow::from_values(bar, values, computed_at))
            })
            .collect();
        Ok(rows)
    }
}
