//! Unit tests for Bollinger Bands

use tickerlens::config::StdDevMode;
use tickerlens::indicators::volatility::calculate_bollinger_bands;

const CLOSES: [f64; 8] = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];

#[test]
fn test_bollinger_population_std() {
    let bands = calculate_bollinger_bands(&CLOSES, 8, 2.0, StdDevMode::Population);
    assert!(bands[..7].iter().all(Option::is_none));

    let b = bands[7].unwrap();
    assert!((b.middle - 5.0).abs() < 1e-12);
    assert!((b.upper - 9.0).abs() < 1e-12);
    assert!((b.lower - 1.0).abs() < 1e-12);
}

#[test]
fn test_bollinger_sample_std_is_wider() {
    let b = calculate_bollinger_bands(&CLOSES, 8, 2.0, StdDevMode::Sample)[7].unwrap();
    let std = (32.0f64 / 7.0).sqrt();
    assert!((b.upper - (5.0 + 2.0 * std)).abs() < 1e-12);
    assert!((b.lower - (5.0 - 2.0 * std)).abs() < 1e-12);
}

#[test]
fn test_bollinger_flat_series_collapses_bands() {
    let b = calculate_bollinger_bands(&[10.0; 5], 5, 2.0, StdDevMode::Population)[4].unwrap();
    assert_eq!(b.upper, b.middle);
    assert_eq!(b.lower, b.middle);
}
