//! Postgres-backed indicator store.
//!
//! Each instrument batch runs in one transaction with an
//! `INSERT ... ON CONFLICT DO UPDATE` per row, so a batch commits whole or not
//! at all. A few connections are kept so instruments can write concurrently.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{error, info};

use super::{check_batch, IndicatorStore, StoreError};
use crate::models::IndicatorRow;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS indicator_rows (
    instrument_id TEXT NOT NULL,
    trading_date DATE NOT NULL,
    open DOUBLE PRECISION NOT NULL,
    high DOUBLE PRECISION NOT NULL,
    low DOUBLE PRECISION NOT NULL,
    close DOUBLE PRECISION NOT NULL,
    volume BIGINT NOT NULL,
    sma DOUBLE PRECISION,
    ema DOUBLE PRECISION,
    bollinger_middle DOUBLE PRECISION,
    bollinger_upper DOUBLE PRECISION,
    bollinger_lower DOUBLE PRECISION,
    rsi DOUBLE PRECISION,
    macd DOUBLE PRECISION,
    macd_signal DOUBLE PRECISION,
    macd_histogram DOUBLE PRECISION,
    buy_signal BOOLEAN NOT NULL,
    sell_signal BOOLEAN NOT NULL,
    computed_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (instrument_id, trading_date)
)";

const UPSERT: &str = "INSERT INTO indicator_rows (
    instrument_id, trading_date, open, high, low, close, volume,
    sma, ema, bollinger_middle, bollinger_upper, bollinger_lower,
    rsi, macd, macd_signal, macd_histogram, buy_signal, sell_signal, computed_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
ON CONFLICT (instrument_id, trading_date) DO UPDATE SET
    open = EXCLUDED.open,
    high = EXCLUDED.high,
    low = EXCLUDED.low,
    close = EXCLUDED.close,
    volume = EXCLUDED.volume,
    sma = EXCLUDED.sma,
    ema = EXCLUDED.ema,
    bollinger_middle = EXCLUDED.bollinger_middle,
    bollinger_upper = EXCLUDED.bollinger_upper,
    bollinger_lower = EXCLUDED.bollinger_lower,
    rsi = EXCLUDED.rsi,
    macd = EXCLUDED.macd,
    macd_signal = EXCLUDED.macd_signal,
    macd_histogram = EXCLUDED.macd_histogram,
    buy_signal = EXCLUDED.buy_signal,
    sell_signal = EXCLUDED.sell_signal,
    computed_at = EXCLUDED.computed_at";

const SELECT_COLUMNS: &str = "instrument_id, trading_date, open, high, low, close, volume,
    sma, ema, bollinger_middle, bollinger_upper, bollinger_lower,
    rsi, macd, macd_signal, macd_histogram, buy_signal, sell_signal, computed_at";

pub struct PostgresIndicatorStore {
    clients: Vec<Mutex<Client>>,
    next: AtomicUsize,
}

impl PostgresIndicatorStore {
    /// Open `pool_size` connections to `database_url`.
    pub async fn connect(database_url: &str, pool_size: usize) -> Result<Self, StoreError> {
        let mut clients = Vec::with_capacity(pool_size.max(1));
        for _ in 0..pool_size.max(1) {
            let (client, connection) = tokio_postgres::connect(database_url, NoTls)
                .await
                .map_err(|e| StoreError::Unavailable(format!("failed to connect: {e}")))?;

            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!(error = %e, "Postgres connection error");
                }
            });
            clients.push(Mutex::new(client));
        }
        info!(pool_size = clients.len(), "Connected to Postgres");

        Ok(Self {
            clients,
            next: AtomicUsize::new(0),
        })
    }

    fn pick(&self) -> &Mutex<Client> {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        &self.clients[i]
    }
}

fn map_pg_error(context: &str, e: tokio_postgres::Error) -> StoreError {
    let message = format!("{context}: {e}");
    match e.code() {
        Some(code)
            if *code == SqlState::T_R_SERIALIZATION_FAILURE
                || *code == SqlState::T_R_DEADLOCK_DETECTED =>
        {
            StoreError::Conflict(message)
        }
        Some(code) if code.code().starts_with("23") => StoreError::ConstraintViolation(message),
        _ => StoreError::Unavailable(message),
    }
}

fn volume_to_sql(row: &IndicatorRow) -> Result<i64, StoreError> {
    i64::try_from(row.volume).map_err(|_| {
        StoreError::ConstraintViolation(format!(
            "volume {} for ({}, {}) exceeds BIGINT",
            row.volume, row.instrument_id, row.trading_date
        ))
    })
}

fn row_from_sql(row: &Row) -> Result<IndicatorRow, StoreError> {
    let corrupt = |e: tokio_postgres::Error| StoreError::Corrupt(e.to_string());
    let volume: i64 = row.try_get("volume").map_err(corrupt)?;
    let computed_at: DateTime<Utc> = row.try_get("computed_at").map_err(corrupt)?;
    Ok(IndicatorRow {
        instrument_id: row.try_get("instrument_id").map_err(corrupt)?,
        trading_date: row.try_get("trading_date").map_err(corrupt)?,
        open: row.try_get("open").map_err(corrupt)?,
        high: row.try_get("high").map_err(corrupt)?,
        low: row.try_get("low").map_err(corrupt)?,
        close: row.try_get("close").map_err(corrupt)?,
        volume: u64::try_from(volume)
            .map_err(|_| StoreError::Corrupt(format!("negative volume {volume}")))?,
        sma: row.try_get("sma").map_err(corrupt)?,
        ema: row.try_get("ema").map_err(corrupt)?,
        bollinger_middle: row.try_get("bollinger_middle").map_err(corrupt)?,
        bollinger_upper: row.try_get("bollinger_upper").map_err(corrupt)?,
        bollinger_lower: row.try_get("bollinger_lower").map_err(corrupt)?,
        rsi: row.try_get("rsi").map_err(corrupt)?,
        macd: row.try_get("macd").map_err(corrupt)?,
        macd_signal: row.try_get("macd_signal").map_err(corrupt)?,
        macd_histogram: row.try_get("macd_histogram").map_err(corrupt)?,
        buy_signal: row.try_get("buy_signal").map_err(corrupt)?,
        sell_signal: row.try_get("sell_signal").map_err(corrupt)?,
        computed_at,
    })
}

#[async_trait]
impl IndicatorStore for PostgresIndicatorStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let client = self.pick().lock().await;
        client
            .batch_execute(CREATE_TABLE)
            .await
            .map_err(|e| map_pg_error("failed to create indicator_rows", e))
    }

    async fn upsert_batch(
        &self,
        instrument_id: &str,
        rows: &[IndicatorRow],
    ) -> Result<usize, StoreError> {
        check_batch(instrument_id, rows)?;
        if rows.is_empty() {
            return Ok(0);
        }

        let mut client = self.pick().lock().await;
        let tx = client
            .transaction()
            .await
            .map_err(|e| map_pg_error("begin", e))?;
        let stmt = tx
            .prepare(UPSERT)
            .await
            .map_err(|e| map_pg_error("prepare upsert", e))?;

        for row in rows {
            let volume = volume_to_sql(row)?;
            tx.execute(
                &stmt,
                &[
                    &row.instrument_id,
                    &row.trading_date,
                    &row.open,
                    &row.high,
                    &row.low,
                    &row.close,
                    &volume,
                    &row.sma,
                    &row.ema,
                    &row.bollinger_middle,
                    &row.bollinger_upper,
                    &row.bollinger_lower,
                    &row.rsi,
                    &row.macd,
                    &row.macd_signal,
                    &row.macd_histogram,
                    &row.buy_signal,
                    &row.sell_signal,
                    &row.computed_at,
                ],
            )
            .await
            .map_err(|e| map_pg_error("upsert", e))?;
        }

        // Dropping an uncommitted transaction rolls it back.
        tx.commit().await.map_err(|e| map_pg_error("commit", e))?;
        Ok(rows.len())
    }

    async fn read(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IndicatorRow>, StoreError> {
        let client = self.pick().lock().await;
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM indicator_rows
             WHERE instrument_id = $1 AND trading_date BETWEEN $2 AND $3
             ORDER BY trading_date ASC"
        );
        let rows = client
            .query(&query, &[&instrument_id, &start, &end])
            .await
            .map_err(|e| map_pg_error("read", e))?;
        rows.iter().map(row_from_sql).collect()
    }

    async fn exists(&self, instrument_id: &str, date: NaiveDate) -> Result<bool, StoreError> {
        let client = self.pick().lock().await;
        let row = client
            .query_opt(
                "SELECT 1 FROM indicator_rows WHERE instrument_id = $1 AND trading_date = $2",
                &[&instrument_id, &date],
            )
            .await
            .map_err(|e| map_pg_error("exists", e))?;
        Ok(row.is_some())
    }

    async fn persisted_dates(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>, StoreError> {
        let client = self.pick().lock().await;
        let rows = client
            .query(
                "SELECT trading_date FROM indicator_rows
                 WHERE instrument_id = $1 AND trading_date BETWEEN $2 AND $3",
                &[&instrument_id, &start, &end],
            )
            .await
            .map_err(|e| map_pg_error("persisted dates", e))?;
        rows.iter()
            .map(|r| {
                r.try_get::<_, NaiveDate>(0)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))
            })
            .collect()
    }
}
