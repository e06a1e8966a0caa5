//! Expected trading calendar: weekdays minus exchange holidays.
//!
//! Gap detection and the backfill reconciler both compare fetched or persisted
//! dates against this calendar, so a closure the provider skips must be known
//! here or the instrument fails with a gap. The US equities rule set covers
//! the regular NYSE/Nasdaq holidays; one-off closures go in as extra dates.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Rule-based holidays applied on top of weekends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolidayRules {
    /// Weekends only.
    #[default]
    None,
    /// NYSE regular holidays with observed-date shifts.
    UsEquities,
}

impl FromStr for HolidayRules {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "us" | "us_equities" | "nyse" => Ok(Self::UsEquities),
            "weekdays" | "none" => Ok(Self::None),
            other => Err(format!(
                "unknown market calendar '{other}' (expected us or weekdays)"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradingCalendar {
    rules: HolidayRules,
    holidays: BTreeSet<NaiveDate>,
}

impl TradingCalendar {
    /// Weekdays only, no holidays.
    pub fn weekdays() -> Self {
        Self::default()
    }

    /// Weekdays minus the US exchange holidays.
    pub fn us_equities() -> Self {
        Self::from_rules(HolidayRules::UsEquities)
    }

    pub fn from_rules(rules: HolidayRules) -> Self {
        Self {
            rules,
            holidays: BTreeSet::new(),
        }
    }

    /// Weekdays minus exactly `holidays`.
    pub fn with_holidays<I>(holidays: I) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        Self::weekdays().with_extra_holidays(holidays)
    }

    /// Add one-off closures on top of the rule set.
    pub fn with_extra_holidays<I>(mut self, holidays: I) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        self.holidays.extend(holidays);
        self
    }

    pub fn rules(&self) -> HolidayRules {
        self.rules
    }

    /// Extra closures configured on top of the rule set.
    pub fn holidays(&self) -> &BTreeSet<NaiveDate> {
        &self.holidays
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        if self.holidays.contains(&date) {
            return true;
        }
        match self.rules {
            HolidayRules::None => false,
            HolidayRules::UsEquities => us_equities_holidays(date.year()).contains(&date),
        }
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }

    /// First trading day strictly after `date`.
    pub fn next_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut d = date + Duration::days(1);
        while !self.is_trading_day(d) {
            d += Duration::days(1);
        }
        d
    }

    /// Last trading day strictly before `date`.
    pub fn previous_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut d = date - Duration::days(1);
        while !self.is_trading_day(d) {
            d -= Duration::days(1);
        }
        d
    }

    /// The trading day `n` sessions before `date` (`n == 0` returns `date`).
    pub fn step_back(&self, date: NaiveDate, n: usize) -> NaiveDate {
        (0..n).fold(date, |d, _| self.previous_trading_day(d))
    }

    /// All trading days in `start..=end`, ascending.
    pub fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| self.is_trading_day(*d))
            .collect()
    }

    /// Trading days starting at `start` (inclusive when it is a trading day).
    pub fn trading_days_from(&self, start: NaiveDate) -> impl Iterator<Item = NaiveDate> + '_ {
        start.iter_days().filter(move |d| self.is_trading_day(*d))
    }
}

/// Regular NYSE holidays for `year`, as observed.
///
/// Saturday holidays move to Friday and Sunday holidays to Monday, except New
/// Year's Day on a Saturday, which is not made up.
pub fn us_equities_holidays(year: i32) -> Vec<NaiveDate> {
    let fixed = |month: u32, day: u32| NaiveDate::from_ymd_opt(year, month, day);
    let nth = |month: u32, weekday: Weekday, n: u8| {
        NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
    };

    let mut days = Vec::with_capacity(10);

    if let Some(new_year) = fixed(1, 1) {
        match new_year.weekday() {
            Weekday::Sat => {}
            Weekday::Sun => days.push(new_year + Duration::days(1)),
            _ => days.push(new_year),
        }
    }
    days.extend(nth(1, Weekday::Mon, 3));
    days.extend(nth(2, Weekday::Mon, 3));
    days.extend(easter_sunday(year).map(|e| e - Duration::days(2)));
    days.extend(last_weekday_of_month(year, 5, Weekday::Mon));
    if year >= 2022 {
        days.extend(fixed(6, 19).map(observed));
    }
    days.extend(fixed(7, 4).map(observed));
    days.extend(nth(9, Weekday::Mon, 1));
    days.extend(nth(11, Weekday::Thu, 4));
    days.extend(fixed(12, 25).map(observed));

    days
}

fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let mut d = first_of_next - Duration::days(1);
    while d.weekday() != weekday {
        d -= Duration::days(1);
    }
    Some(d)
}

/// Gregorian Easter Sunday (anonymous computus).
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year.rem_euclid(19);
    let b = year.div_euclid(100);
    let c = year.rem_euclid(100);
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15).rem_euclid(30);
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k).rem_euclid(7);
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}
