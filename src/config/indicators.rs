//! Indicator window parameters and signal thresholds.

use serde::{Deserialize, Serialize};

use super::ConfigurationError;

/// Standard deviation convention for Bollinger Bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdDevMode {
    /// Divide by `n`.
    Population,
    /// Divide by `n - 1`.
    Sample,
}

impl std::str::FromStr for StdDevMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "population" => Ok(Self::Population),
            "sample" => Ok(Self::Sample),
            other => Err(format!("expected population or sample, got '{other}'")),
        }
    }
}

/// Averaging of gains and losses inside RSI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsiSmoothing {
    /// Running average `(prev * (n - 1) + x) / n`, seeded with the simple mean.
    Wilder,
    /// Plain mean of the trailing `n` changes, recomputed every bar.
    Simple,
}

impl std::str::FromStr for RsiSmoothing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wilder" => Ok(Self::Wilder),
            "simple" => Ok(Self::Simple),
            other => Err(format!("expected wilder or simple, got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub sma_window: usize,
    pub ema_window: usize,
    pub bollinger_window: usize,
    pub bollinger_z: f64,
    pub bollinger_std: StdDevMode,
    pub rsi_period: usize,
    pub rsi_smoothing: RsiSmoothing,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma_window: 20,
            ema_window: 20,
            bollinger_window: 20,
            bollinger_z: 2.0,
            bollinger_std: StdDevMode::Population,
            rsi_period: 14,
            rsi_smoothing: RsiSmoothing::Wilder,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal_period: 9,
        }
    }
}

impl IndicatorConfig {
    /// Bars needed before every column of a row carries a value.
    pub fn warmup_len(&self) -> usize {
        [
            self.sma_window,
            self.ema_window,
            self.bollinger_window,
            self.rsi_period + 1,
            self.macd_slow + self.macd_signal_period - 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(1)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let windows = [
            ("sma_window", self.sma_window),
            ("ema_window", self.ema_window),
            ("bollinger_window", self.bollinger_window),
            ("rsi_period", self.rsi_period),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal_period", self.macd_signal_period),
        ];
        for (name, value) in windows {
            if value == 0 {
                return Err(ConfigurationError::invalid(name, "window must be >= 1"));
            }
        }
        if self.macd_fast >= self.macd_slow {
            return Err(ConfigurationError::invalid(
                "macd_fast",
                format!(
                    "fast period ({}) must be shorter than slow period ({})",
                    self.macd_fast, self.macd_slow
                ),
            ));
        }
        if !self.bollinger_z.is_finite() || self.bollinger_z <= 0.0 {
            return Err(ConfigurationError::invalid(
                "bollinger_z",
                "band width must be a positive finite number",
            ));
        }
        if self.bollinger_std == StdDevMode::Sample && self.bollinger_window < 2 {
            return Err(ConfigurationError::invalid(
                "bollinger_window",
                "sample standard deviation needs a window of at least 2",
            ));
        }
        Ok(())
    }
}

/// Thresholds for the RSI side of the buy/sell rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalThresholds {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
        }
    }
}

impl SignalThresholds {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let ordered = 0.0 < self.rsi_oversold
            && self.rsi_oversold < self.rsi_overbought
            && self.rsi_overbought < 100.0;
        if !ordered {
            return Err(ConfigurationError::invalid(
                "rsi_oversold",
                format!(
                    "thresholds must satisfy 0 < oversold ({}) < overbought ({}) < 100",
                    self.rsi_oversold, self.rsi_overbought
                ),
            ));
        }
        Ok(())
    }
}
