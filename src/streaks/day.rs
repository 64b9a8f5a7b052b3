use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("Not a calendar date: '{0}' (expected YYYY-MM-DD)")]
    Unparseable(String),
    #[error("Date out of range: day number {0}")]
    OutOfRange(i32),
}

/// A calendar day as an integer day number (days since 0001-01-01 = 1).
///
/// Gap arithmetic between two days is plain integer subtraction, so a
/// difference of exactly 1 always means "consecutive calendar days".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Day(i32);

impl Day {
    pub fn from_date(date: NaiveDate) -> Self {
        Day(date.num_days_from_ce())
    }

    pub fn to_date(self) -> Result<NaiveDate, DateError> {
        NaiveDate::from_num_days_from_ce_opt(self.0).ok_or(DateError::OutOfRange(self.0))
    }

    pub fn pred(self) -> Self {
        Day(self.0 - 1)
    }

    pub fn succ(self) -> Self {
        Day(self.0 + 1)
    }

    pub fn minus_days(self, days: i32) -> Self {
        Day(self.0 - days)
    }

    /// Signed distance in days from `earlier` to `self`.
    pub fn days_since(self, earlier: Day) -> i32 {
        self.0 - earlier.0
    }

    /// Parse a calendar date, accepting a bare `YYYY-MM-DD` or a timestamp
    /// whose date part is taken as-is. Anything else is rejected.
    pub fn parse(s: &str) -> Result<Self, DateError> {
        let s = s.trim();
        if let Ok(d) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
            return Ok(Self::from_date(d));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::from_date(dt.date_naive()));
        }
        for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(Self::from_date(dt.date()));
            }
        }
        Err(DateError::Unparseable(s.to_string()))
    }
}

impl From<NaiveDate> for Day {
    fn from(date: NaiveDate) -> Self {
        Day::from_date(date)
    }
}

impl FromStr for Day {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Day::parse(s)
    }
}

impl TryFrom<String> for Day {
    type Error = DateError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Day::parse(&s)
    }
}

impl From<Day> for String {
    fn from(day: Day) -> Self {
        day.to_string()
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_date() {
            Ok(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Err(_) => write!(f, "day#{}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_dates() {
        let d = Day::parse("2024-01-03").unwrap();
        assert_eq!(d.to_string(), "2024-01-03");
    }

    #[test]
    fn timestamps_on_the_same_day_are_identical() {
        let a = Day::parse("2024-03-10T00:00:01Z").unwrap();
        let b = Day::parse("2024-03-10 23:59:59").unwrap();
        let c = Day::parse("2024-03-10").unwrap();
        assert_eq!(a, c);
        assert_eq!(b, c);
    }

    #[test]
    fn consecutive_days_across_month_and_year_boundaries() {
        let nye = Day::parse("2023-12-31").unwrap();
        let ny = Day::parse("2024-01-01").unwrap();
        assert_eq!(ny.days_since(nye), 1);
        assert_eq!(nye.succ(), ny);

        let feb28 = Day::parse("2024-02-28").unwrap();
        let mar1 = Day::parse("2024-03-01").unwrap();
        assert_eq!(mar1.days_since(feb28), 2);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            Day::parse("yesterday"),
            Err(DateError::Unparseable("yesterday".to_string()))
        );
        assert!(Day::parse("2024-13-01").is_err());
        assert!(Day::parse("").is_err());
    }

    #[test]
    fn serde_uses_calendar_strings() {
        let d = Day::parse("2024-01-05").unwrap();
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, "\"2024-01-05\"");
        let back: Day = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
        assert!(serde_json::from_str::<Day>("\"nope\"").is_err());
    }
}
