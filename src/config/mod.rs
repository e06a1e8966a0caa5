//! Pipeline configuration, read from environment variables.
//!
//! Every variable has a default; a variable that is set but does not parse is
//! a `ConfigurationError`, never a silent fallback.

pub mod indicators;

pub use indicators::{IndicatorConfig, RsiSmoothing, SignalThresholds, StdDevMode};

use chrono::NaiveDate;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::calendar::HolidayRules;
use crate::core::retry::RetryPolicy;

pub const DEFAULT_TICKERS: &str = "AAPL,META,AMZN,NVDA,MSFT,NIO,XPEV,LI,ZK,PYPL,AXP,MA,GPN,V,FUTU,HOOD,TIGR,IBKR,GS,JPM,BLK,C,BX,KO,WMT,MCD,NKE,SBUX,COIN,BCS,AMD,BABA,PINS,BA,AVGO,JD,PDD,SNAP,FVRR,DJT,SHOP,SE";
pub const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_RUN_SCHEDULE: &str = "0 30 22 * * Mon-Fri";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("invalid configuration for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("missing required setting {0}")]
    Missing(String),

    #[error("cannot parse {key}={value}: {reason}")]
    Parse {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigurationError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Get the current environment (production, sandbox, etc.)
pub fn get_environment() -> String {
    env::var("ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string())
}

pub fn is_production() -> bool {
    matches!(get_environment().as_str(), "production" | "prod")
}

/// Orchestrator knobs: parallelism, history depth, retries and deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub concurrency: usize,
    /// History bars fetched ahead of the target range so indicators are warm.
    pub lookback_bars: usize,
    pub fetch_retry: RetryPolicy,
    pub write_retry: RetryPolicy,
    pub run_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            lookback_bars: 180,
            fetch_retry: RetryPolicy::default(),
            write_retry: RetryPolicy::default(),
            run_timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub indicators: IndicatorConfig,
    pub thresholds: SignalThresholds,
    pub orchestrator: OrchestratorConfig,
    pub universe: Vec<String>,
    pub market_calendar: HolidayRules,
    pub holidays: Vec<NaiveDate>,
    pub reconcile_lookback_days: usize,
    pub database_url: Option<String>,
    pub database_pool_size: usize,
    pub yahoo_base_url: String,
    pub run_schedule: String,
    pub port: u16,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            indicators: IndicatorConfig::default(),
            thresholds: SignalThresholds::default(),
            orchestrator: OrchestratorConfig::default(),
            universe: parse_list(DEFAULT_TICKERS),
            market_calendar: HolidayRules::UsEquities,
            holidays: Vec::new(),
            reconcile_lookback_days: 30,
            database_url: None,
            database_pool_size: 4,
            yahoo_base_url: DEFAULT_YAHOO_BASE_URL.to_string(),
            run_schedule: DEFAULT_RUN_SCHEDULE.to_string(),
            port: 8080,
        }
    }
}

impl PipelineConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup, so tests never touch process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reader = EnvReader { lookup };
        let defaults = Self::default();
        let ind = &defaults.indicators;
        let orch = &defaults.orchestrator;

        let indicators = IndicatorConfig {
            sma_window: reader.parse_or("SMA_WINDOW", ind.sma_window)?,
            ema_window: reader.parse_or("EMA_WINDOW", ind.ema_window)?,
            bollinger_window: reader.parse_or("BOLLINGER_WINDOW", ind.bollinger_window)?,
            bollinger_z: reader.parse_or("BOLLINGER_Z", ind.bollinger_z)?,
            bollinger_std: reader.parse_or("BOLLINGER_STD", ind.bollinger_std)?,
            rsi_period: reader.parse_or("RSI_PERIOD", ind.rsi_period)?,
            rsi_smoothing: reader.parse_or("RSI_SMOOTHING", ind.rsi_smoothing)?,
            macd_fast: reader.parse_or("MACD_FAST", ind.macd_fast)?,
            macd_slow: reader.parse_or("MACD_SLOW", ind.macd_slow)?,
            macd_signal_period: reader.parse_or("MACD_SIGNAL", ind.macd_signal_period)?,
        };

        let thresholds = SignalThresholds {
            rsi_oversold: reader.parse_or("RSI_OVERSOLD", defaults.thresholds.rsi_oversold)?,
            rsi_overbought: reader
                .parse_or("RSI_OVERBOUGHT", defaults.thresholds.rsi_overbought)?,
        };

        let base_delay_ms: u64 = reader.parse_or(
            "RETRY_BASE_DELAY_MS",
            orch.fetch_retry.base_delay.as_millis() as u64,
        )?;
        let base_delay = Duration::from_millis(base_delay_ms);
        let run_timeout_secs: Option<u64> = reader.parse_opt("RUN_TIMEOUT_SECONDS")?;

        let orchestrator = OrchestratorConfig {
            concurrency: reader.parse_or("WORKER_CONCURRENCY", orch.concurrency)?,
            lookback_bars: reader.parse_or("LOOKBACK_BARS", orch.lookback_bars)?,
            fetch_retry: RetryPolicy::new(
                reader.parse_or("FETCH_MAX_RETRIES", orch.fetch_retry.max_retries)?,
                base_delay,
            ),
            write_retry: RetryPolicy::new(
                reader.parse_or("WRITE_MAX_RETRIES", orch.write_retry.max_retries)?,
                base_delay,
            ),
            run_timeout: run_timeout_secs.map(Duration::from_secs),
        };

        let universe = match reader.get("TICKERS") {
            Some(raw) => parse_list(&raw),
            None => defaults.universe,
        };

        let market_calendar = reader.parse_or("MARKET_CALENDAR", defaults.market_calendar)?;

        let holidays = match reader.get("MARKET_HOLIDAYS") {
            Some(raw) => parse_dates("MARKET_HOLIDAYS", &raw)?,
            None => Vec::new(),
        };

        let config = Self {
            indicators,
            thresholds,
            orchestrator,
            universe,
            market_calendar,
            holidays,
            reconcile_lookback_days: reader
                .parse_or("RECONCILE_LOOKBACK_DAYS", defaults.reconcile_lookback_days)?,
            database_url: reader.get("DATABASE_URL"),
            database_pool_size: reader.parse_or("DATABASE_POOL_SIZE", defaults.database_pool_size)?,
            yahoo_base_url: reader.get("YAHOO_BASE_URL").unwrap_or(defaults.yahoo_base_url),
            run_schedule: reader.get("RUN_SCHEDULE").unwrap_or(defaults.run_schedule),
            port: reader.parse_or("PORT", defaults.port)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.indicators.validate()?;
        self.thresholds.validate()?;
        if self.orchestrator.concurrency == 0 {
            return Err(ConfigurationError::invalid(
                "WORKER_CONCURRENCY",
                "must be >= 1",
            ));
        }
        let warmup = self.indicators.warmup_len();
        if self.orchestrator.lookback_bars < warmup {
            return Err(ConfigurationError::invalid(
                "LOOKBACK_BARS",
                format!(
                    "lookback ({}) is shorter than the indicator warm-up ({warmup})",
                    self.orchestrator.lookback_bars
                ),
            ));
        }
        if self.database_pool_size == 0 {
            return Err(ConfigurationError::invalid(
                "DATABASE_POOL_SIZE",
                "must be >= 1",
            ));
        }
        if self.universe.is_empty() {
            return Err(ConfigurationError::invalid(
                "TICKERS",
                "instrument universe is empty",
            ));
        }
        Ok(())
    }

    /// The database URL, or `Missing` when the store is not configured.
    pub fn require_database_url(&self) -> Result<&str, ConfigurationError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigurationError::Missing("DATABASE_URL".to_string()))
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_opt<T>(&self, key: &str) -> Result<Option<T>, ConfigurationError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigurationError::Parse {
                    key: key.to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                }),
        }
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigurationError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse_opt(key)?.unwrap_or(default))
    }
}

/// Comma-separated instrument list, upper-cased and de-duplicated in order.
pub fn parse_list(raw: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

fn parse_dates(key: &str, raw: &str) -> Result<Vec<NaiveDate>, ConfigurationError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| ConfigurationError::Parse {
                key: key.to_string(),
                value: s.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}
