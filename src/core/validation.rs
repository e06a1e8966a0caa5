//! Pre-compute checks on a fetched bar sequence.
//!
//! Broken histories are never repaired. The instrument fails with a
//! `DataIntegrityError` instead.

use chrono::NaiveDate;
use thiserror::Error;

use crate::calendar::TradingCalendar;
use crate::models::Bar;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataIntegrityError {
    #[error("duplicate bar for {date}")]
    DuplicateDate { date: NaiveDate },

    #[error("bar for {found} arrived after {previous}")]
    OutOfOrder {
        previous: NaiveDate,
        found: NaiveDate,
    },

    #[error("gap after {after}: missing trading day {missing}")]
    Gap { after: NaiveDate, missing: NaiveDate },

    #[error("malformed bar for {date}: {reason}")]
    MalformedBar { date: NaiveDate, reason: String },

    #[error("bar for {date} belongs to {found}, expected {expected}")]
    ForeignInstrument {
        expected: String,
        found: String,
        date: NaiveDate,
    },
}

/// Check that `bars` is a clean, contiguous history for `instrument_id`.
///
/// Contiguity is judged against `calendar`: each bar after the first must fall
/// on the next trading day after its predecessor. Bars dated on non-trading
/// days are accepted and treated as extra sessions.
pub fn validate_bars(
    instrument_id: &str,
    bars: &[Bar],
    calendar: &TradingCalendar,
) -> Result<(), DataIntegrityError> {
    for bar in bars {
        if bar.instrument_id != instrument_id {
            return Err(DataIntegrityError::ForeignInstrument {
                expected: instrument_id.to_string(),
                found: bar.instrument_id.clone(),
                date: bar.trading_date,
            });
        }
        if let Some(reason) = bar.defect() {
            return Err(DataIntegrityError::MalformedBar {
                date: bar.trading_date,
                reason: reason.to_string(),
            });
        }
    }

    for pair in bars.windows(2) {
        let (prev, cur) = (pair[0].trading_date, pair[1].trading_date);
        if cur == prev {
            return Err(DataIntegrityError::DuplicateDate { date: cur });
        }
        if cur < prev {
            return Err(DataIntegrityError::OutOfOrder {
                previous: prev,
                found: cur,
            });
        }
        let expected = calendar.next_trading_day(prev);
        if cur > expected {
            return Err(DataIntegrityError::Gap {
                after: prev,
                missing: expected,
            });
        }
    }
    Ok(())
}
