//! Calendar helpers for simulation timestamps
//!
//! Timestamps are milliseconds since the Unix epoch. Whole-year ages and
//! calendar years go through `chrono` so that birthdays land on the right
//! day; the coarser units use fixed lengths.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::types::Timestamp;

pub const MS_PER_SECOND: i64 = 1_000;
pub const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
pub const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
pub const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;
pub const MS_PER_WEEK: i64 = 7 * MS_PER_DAY;
pub const MS_PER_MONTH: i64 = 30 * MS_PER_DAY;
pub const MS_PER_YEAR: i64 = 365 * MS_PER_DAY;

/// Units accepted by delays, ages and `within` windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl TimeUnit {
    pub fn millis(self) -> i64 {
        match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => MS_PER_SECOND,
            TimeUnit::Minutes => MS_PER_MINUTE,
            TimeUnit::Hours => MS_PER_HOUR,
            TimeUnit::Days => MS_PER_DAY,
            TimeUnit::Weeks => MS_PER_WEEK,
            TimeUnit::Months => MS_PER_MONTH,
            TimeUnit::Years => MS_PER_YEAR,
        }
    }

    /// Convert a (possibly fractional) quantity of this unit to milliseconds
    pub fn to_millis(self, quantity: f64) -> i64 {
        (quantity * self.millis() as f64).round() as i64
    }
}

/// A quantity of time as written in module files: `{"quantity": 2, "unit": "years"}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub quantity: f64,
    pub unit: TimeUnit,
}

impl TimeSpan {
    pub fn to_millis(&self) -> i64 {
        self.unit.to_millis(self.quantity)
    }
}

fn date_of(ts: Timestamp) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(ts)
        .map(|dt| dt.date_naive())
        .unwrap_or(NaiveDate::MIN)
}

/// Calendar year (UTC) containing the timestamp
pub fn year_of(ts: Timestamp) -> i32 {
    date_of(ts).year()
}

/// Completed years between `birth` and `now`. Zero before birth.
pub fn age_in_years(birth: Timestamp, now: Timestamp) -> u32 {
    if now <= birth {
        return 0;
    }
    let b = date_of(birth);
    let n = date_of(now);
    let mut years = n.year() - b.year();
    if (n.month(), n.day()) < (b.month(), b.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

/// Elapsed time between two timestamps expressed in `unit`.
///
/// Years use calendar birthdays; every other unit divides by its fixed length.
pub fn elapsed_in(unit: TimeUnit, from: Timestamp, to: Timestamp) -> f64 {
    match unit {
        TimeUnit::Years => age_in_years(from, to) as f64,
        _ => (to - from) as f64 / unit.millis() as f64,
    }
}

/// Timestamp for midnight UTC on the given date
pub fn timestamp(year: i32, month: u32, day: u32) -> Timestamp {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversion() {
        assert_eq!(TimeUnit::Days.to_millis(2.0), 2 * MS_PER_DAY);
        assert_eq!(TimeUnit::Weeks.to_millis(0.5), MS_PER_WEEK / 2);
        assert_eq!(TimeUnit::Years.millis(), 365 * MS_PER_DAY);
    }

    #[test]
    fn test_year_of() {
        assert_eq!(year_of(timestamp(1980, 6, 15)), 1980);
        assert_eq!(year_of(timestamp(1955, 1, 1)), 1955);
    }

    #[test]
    fn test_age_respects_birthday() {
        let birth = timestamp(2000, 6, 15);
        assert_eq!(age_in_years(birth, timestamp(2010, 6, 14)), 9);
        assert_eq!(age_in_years(birth, timestamp(2010, 6, 15)), 10);
        assert_eq!(age_in_years(birth, timestamp(1999, 1, 1)), 0);
    }

    #[test]
    fn test_elapsed_in_days() {
        let start = timestamp(2020, 1, 1);
        let end = timestamp(2020, 1, 11);
        assert_eq!(elapsed_in(TimeUnit::Days, start, end), 10.0);
        assert_eq!(elapsed_in(TimeUnit::Years, start, end), 0.0);
    }

    #[test]
    fn test_unit_deserialize() {
        let unit: TimeUnit = serde_json::from_str("\"years\"").unwrap();
        assert_eq!(unit, TimeUnit::Years);
    }
}
