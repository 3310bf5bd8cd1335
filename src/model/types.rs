//! Auxiliary value types of the data model: service-day times and the
//! date conventions shared by the SQL and GTFS codecs.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::Error;

/// The date stored on calendars which have no regular weekday service and
/// signal all activity through exceptions.
pub fn signals_exceptions() -> NaiveDate {
    NaiveDate::from_ymd_opt(1111, 11, 11).unwrap()
}

/// Parses a date in the `YYYY-MM-DD` format used in SQL columns.
pub fn parse_sql_date(x: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(x, "%Y-%m-%d").map_err(|_| Error::InvalidDate(x.to_string()))
}

pub fn format_sql_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parses a date in the `YYYYMMDD` format used in GTFS columns.
pub fn parse_gtfs_date(x: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(x, "%Y%m%d").map_err(|_| Error::InvalidDate(x.to_string()))
}

pub fn format_gtfs_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// A non-negative duration in whole seconds since the service midnight.
///
/// Unlike a wall-clock time, a TimePoint may exceed 24 hours - trips
/// departing before midnight continue with times like `25:30:00`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimePoint(u64);

impl TimePoint {
    pub fn from_seconds(seconds: u64) -> Self {
        Self(seconds)
    }

    pub fn from_hms(hours: u64, minutes: u64, seconds: u64) -> Self {
        Self(hours * 3600 + minutes * 60 + seconds)
    }

    pub fn total_seconds(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0 / 3600,
            self.0 % 3600 / 60,
            self.0 % 60
        )
    }
}

impl FromStr for TimePoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim_start().split(':').collect();
        if parts.len() != 3 {
            return Err(Error::InvalidTime(s.to_string()));
        }
        let parse = |part: &str| {
            part.parse::<u64>()
                .map_err(|_| Error::InvalidTime(s.to_string()))
        };
        Ok(Self::from_hms(
            parse(parts[0])?,
            parse(parts[1])?,
            parse(parts[2])?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_point_round_trip() {
        let t: TimePoint = "08:05:30".parse().unwrap();
        assert_eq!(t.total_seconds(), 8 * 3600 + 5 * 60 + 30);
        assert_eq!(t.to_string(), "08:05:30");
    }

    #[test]
    fn time_point_past_midnight() {
        let t: TimePoint = "25:30:00".parse().unwrap();
        assert_eq!(t.total_seconds(), 91800);
        assert_eq!(t.to_string(), "25:30:00");
    }

    #[test]
    fn time_point_rejects_garbage() {
        assert!("8:05".parse::<TimePoint>().is_err());
        assert!("a:b:c".parse::<TimePoint>().is_err());
    }

    #[test]
    fn sql_date_round_trip() {
        let date = parse_sql_date("2020-05-01").unwrap();
        assert_eq!(format_sql_date(date), "2020-05-01");
        assert!(parse_sql_date("20200501").is_err());
    }

    #[test]
    fn gtfs_date_round_trip() {
        let date = parse_gtfs_date("20200501").unwrap();
        assert_eq!(format_gtfs_date(date), "20200501");
        assert!(parse_gtfs_date("2020-05-01").is_err());
    }
}
