//! Unit tests for the signal classifier

use chrono::{NaiveDate, Utc};
use tickerlens::config::SignalThresholds;
use tickerlens::models::{Bar, IndicatorRow, IndicatorValues};
use tickerlens::signals::{crossover, CrossoverType, SignalClassifier, SignalDecision};

fn row(day: u32, close: f64) -> IndicatorRow {
    let date = NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
    let bar = Bar::new("AAPL", date, close, close + 1.0, close - 1.0, close, 100);
    IndicatorRow::from_values(&bar, IndicatorValues::default(), Utc::now())
}

fn with_rsi(mut r: IndicatorRow, rsi: f64) -> IndicatorRow {
    r.rsi = Some(rsi);
    r
}

fn with_macd(mut r: IndicatorRow, macd: f64, signal: f64) -> IndicatorRow {
    r.macd = Some(macd);
    r.macd_signal = Some(signal);
    r.macd_histogram = Some(macd - signal);
    r
}

fn with_bands(mut r: IndicatorRow, lower: f64, upper: f64) -> IndicatorRow {
    r.bollinger_lower = Some(lower);
    r.bollinger_upper = Some(upper);
    r.bollinger_middle = Some((lower + upper) / 2.0);
    r
}

fn classifier() -> SignalClassifier {
    SignalClassifier::new(SignalThresholds::default())
}

#[test]
fn test_first_bar_never_signals() {
    let cur = with_macd(with_rsi(row(2, 10.0), 35.0), 1.0, 0.0);
    assert_eq!(classifier().classify(&cur, None), SignalDecision::default());
}

#[test]
fn test_macd_cross_above_is_buy() {
    let prev = with_macd(row(2, 10.0), -1.0, 0.0);
    let cur = with_macd(row(3, 10.0), 1.0, 0.0);
    let d = classifier().classify(&cur, Some(&prev));
    assert!(d.buy);
    assert!(!d.sell);
}

#[test]
fn test_macd_cross_below_is_sell() {
    let prev = with_macd(row(2, 10.0), 1.0, 0.5);
    let cur = with_macd(row(3, 10.0), 0.2, 0.5);
    let d = classifier().classify(&cur, Some(&prev));
    assert!(d.sell);
    assert!(!d.buy);
}

#[test]
fn test_macd_touching_signal_is_not_a_cross() {
    let prev = with_macd(row(2, 10.0), 0.0, 0.0);
    let cur = with_macd(row(3, 10.0), 1.0, 0.0);
    assert_eq!(
        classifier().classify(&cur, Some(&prev)),
        SignalDecision::default()
    );
}

#[test]
fn test_rsi_cross_up_needs_close_at_lower_band() {
    let prev = with_rsi(row(2, 10.0), 25.0);

    let at_band = with_bands(with_rsi(row(3, 9.0), 32.0), 9.0, 12.0);
    assert!(classifier().classify(&at_band, Some(&prev)).buy);

    let inside = with_bands(with_rsi(row(3, 10.0), 32.0), 9.0, 12.0);
    assert!(!classifier().classify(&inside, Some(&prev)).buy);
}

#[test]
fn test_rsi_cross_down_with_close_above_upper_is_sell() {
    let prev = with_rsi(row(2, 12.0), 75.0);
    let cur = with_bands(with_rsi(row(3, 12.5), 68.0), 9.0, 12.0);
    let d = classifier().classify(&cur, Some(&prev));
    assert!(d.sell);
    assert!(!d.buy);
}

#[test]
fn test_rsi_staying_oversold_is_not_a_cross() {
    let prev = with_rsi(row(2, 9.0), 20.0);
    let cur = with_bands(with_rsi(row(3, 8.0), 25.0), 9.0, 12.0);
    assert!(!classifier().classify(&cur, Some(&prev)).buy);
}

#[test]
fn test_conflicting_rules_yield_neither() {
    // RSI buy path and a bearish MACD cross on the same bar
    let prev = with_macd(with_rsi(row(2, 9.0), 25.0), 1.0, 0.5);
    let cur = with_bands(with_macd(with_rsi(row(3, 9.0), 31.0), 0.2, 0.5), 9.0, 12.0);
    let d = classifier().classify(&cur, Some(&prev));
    assert!(!d.buy && !d.sell);
}

#[test]
fn test_missing_values_never_signal() {
    let prev = row(2, 10.0);
    let cur = with_macd(row(3, 10.0), 1.0, 0.0);
    assert_eq!(
        classifier().classify(&cur, Some(&prev)),
        SignalDecision::default()
    );
}

#[test]
fn test_custom_thresholds() {
    let c = SignalClassifier::new(SignalThresholds {
        rsi_oversold: 20.0,
        rsi_overbought: 80.0,
    });
    let prev = with_rsi(row(2, 9.0), 25.0);
    let cur = with_bands(with_rsi(row(3, 9.0), 32.0), 9.0, 12.0);
    assert!(!c.classify(&cur, Some(&prev)).buy);
}

#[test]
fn test_apply_uses_previous_row() {
    let mut rows = vec![
        with_macd(row(2, 10.0), -1.0, 0.0),
        with_macd(row(3, 10.0), 1.0, 0.0),
        with_macd(row(4, 10.0), 2.0, 0.5),
        with_macd(row(5, 10.0), 0.1, 0.5),
    ];
    classifier().apply(&mut rows);
    let signals: Vec<(bool, bool)> = rows.iter().map(|r| (r.buy_signal, r.sell_signal)).collect();
    assert_eq!(
        signals,
        vec![(false, false), (true, false), (false, false), (false, true)]
    );
}

#[test]
fn test_crossover_helper() {
    assert_eq!(
        crossover(Some(1.0), Some(2.0), Some(3.0), Some(2.0)),
        Some(CrossoverType::Above)
    );
    assert_eq!(
        crossover(Some(3.0), Some(2.0), Some(1.0), Some(2.0)),
        Some(CrossoverType::Below)
    );
    assert_eq!(crossover(None, Some(2.0), Some(3.0), Some(2.0)), None);
}
