//! Yahoo Finance v8 chart API bar source.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::DEFAULT_YAHOO_BASE_URL;
use crate::models::Bar;
use crate::services::market_data::{BarSource, FetchError};

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

pub struct YahooBarSource {
    client: reqwest::Client,
    base_url: String,
}

impl YahooBarSource {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(DEFAULT_YAHOO_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()
            .map_err(|e| FetchError::TransientNetwork(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start.and_hms_opt(0, 0, 0).map_or(0, |t| t.and_utc().timestamp());
        let end_ts = end
            .and_hms_opt(23, 59, 59)
            .map_or(0, |t| t.and_utc().timestamp());
        format!(
            "{}/v8/finance/chart/{symbol}?period1={start_ts}&period2={end_ts}&interval=1d",
            self.base_url
        )
    }
}

fn parse_chart(symbol: &str, resp: ChartResponse) -> Result<Vec<Bar>, FetchError> {
    let result = match resp.chart.result {
        Some(result) => result,
        None => {
            return Err(match resp.chart.error {
                Some(err) if err.code == "Not Found" => FetchError::NotFound {
                    instrument: symbol.to_string(),
                },
                Some(err) => {
                    FetchError::MalformedResponse(format!("{}: {}", err.code, err.description))
                }
                None => FetchError::MalformedResponse("empty result with no error".into()),
            })
        }
    };

    let data = result
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::MalformedResponse("result array is empty".into()))?;

    // No timestamps means no sessions in the requested window.
    let Some(timestamps) = data.timestamp else {
        return Ok(Vec::new());
    };

    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::MalformedResponse("no quote data".into()))?;

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let date = DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| FetchError::MalformedResponse(format!("invalid timestamp: {ts}")))?;

        let open = quote.open.get(i).copied().flatten();
        let high = quote.high.get(i).copied().flatten();
        let low = quote.low.get(i).copied().flatten();
        let close = quote.close.get(i).copied().flatten();
        let volume = quote.volume.get(i).copied().flatten();

        if open.is_none() && high.is_none() && low.is_none() && close.is_none() {
            continue;
        }

        // Partially null rows stay in as NaN and fail validation downstream.
        bars.push(Bar::new(
            symbol,
            date,
            open.unwrap_or(f64::NAN),
            high.unwrap_or(f64::NAN),
            low.unwrap_or(f64::NAN),
            close.unwrap_or(f64::NAN),
            volume.unwrap_or(0),
        ));
    }
    Ok(bars)
}

#[async_trait]
impl BarSource for YahooBarSource {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn fetch(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, FetchError> {
        let url = self.chart_url(instrument_id, start, end);
        debug!(instrument_id = %instrument_id, %start, %end, "Fetching bars from Yahoo");

        let response = self.client.get(&url).send().await.map_err(|e| {
            FetchError::TransientNetwork(format!("request to {} failed: {e}", self.base_url))
        })?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => {
                return Err(FetchError::NotFound {
                    instrument: instrument_id.to_string(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                return Err(FetchError::RateLimited { retry_after_secs });
            }
            s if s.is_server_error() => {
                return Err(FetchError::TransientNetwork(format!("provider returned {s}")))
            }
            s if !s.is_success() => {
                return Err(FetchError::MalformedResponse(format!(
                    "unexpected status {s}"
                )))
            }
            _ => {}
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::TransientNetwork(format!("reading body: {e}")))?;
        let chart: ChartResponse = serde_json::from_str(&body)
            .map_err(|e| FetchError::MalformedResponse(format!("decoding chart: {e}")))?;

        // Provider order is kept; validation rejects out-of-order sessions.
        let mut bars = parse_chart(instrument_id, chart)?;
        bars.retain(|b| b.trading_date >= start && b.trading_date <= end);
        Ok(bars)
    }
}
