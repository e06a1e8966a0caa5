//! Unit tests for single-row writes on the in-memory store

use chrono::{NaiveDate, TimeZone, Utc};
use tickerlens::db::{InMemoryIndicatorStore, IndicatorStore};
use tickerlens::models::{Bar, IndicatorRow, IndicatorValues};

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

fn row(date: NaiveDate, close: f64, sma: Option<f64>) -> IndicatorRow {
    let bar = Bar::new("AAPL", date, close, close + 1.0, close - 1.0, close, 1_000);
    let values = IndicatorValues {
        sma,
        ..IndicatorValues::default()
    };
    IndicatorRow::from_values(&bar, values, Utc.with_ymd_and_hms(2024, 1, 10, 22, 0, 0).unwrap())
}

#[tokio::test]
async fn test_upsert_single_row_round_trip() {
    let store = InMemoryIndicatorStore::new();
    let written = row(d(3), 101.5, Some(100.0));

    store.upsert(&written).await.unwrap();

    assert_eq!(store.read_one("AAPL", d(3)).await.unwrap(), Some(written));
    assert!(store.exists("AAPL", d(3)).await.unwrap());
    assert!(!store.exists("AAPL", d(4)).await.unwrap());
    assert_eq!(store.batch_calls(), 1);
}

#[tokio::test]
async fn test_upsert_replaces_whole_row() {
    let store = InMemoryIndicatorStore::new();
    store.upsert(&row(d(3), 101.5, Some(100.0))).await.unwrap();

    let replacement = row(d(3), 99.0, None);
    store.upsert(&replacement).await.unwrap();

    assert_eq!(store.len().await, 1);
    let stored = store.read_one("AAPL", d(3)).await.unwrap().unwrap();
    assert_eq!(stored, replacement);
    assert_eq!(stored.sma, None);
}

#[tokio::test]
async fn test_single_rows_show_up_in_persisted_dates() {
    let store = InMemoryIndicatorStore::new();
    store.upsert(&row(d(2), 100.0, None)).await.unwrap();
    store.upsert(&row(d(4), 102.0, None)).await.unwrap();

    let dates = store.persisted_dates("AAPL", d(1), d(5)).await.unwrap();
    assert_eq!(dates.into_iter().collect::<Vec<_>>(), vec![d(2), d(4)]);
    assert!(store.read_one("MSFT", d(2)).await.unwrap().is_none());
}
