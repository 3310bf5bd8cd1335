use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use super::meta::{Entity, GtfsEntity, GtfsRow, RowReader, SqlValue};
use super::types::{format_gtfs_date, format_sql_date, parse_gtfs_date};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionType {
    Added = 1,
    Removed = 2,
}

impl ExceptionType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Added),
            2 => Some(Self::Removed),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

/// A single-date adjustment to a [Calendar](super::Calendar),
/// equivalent to GTFS's `calendar_dates.txt` entries.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarException {
    pub calendar_id: String,
    pub date: NaiveDate,
    pub exception_type: ExceptionType,
}

impl CalendarException {
    /// Applies a set of exceptions onto the regular active dates of a
    /// calendar, producing the concrete set of dates with service.
    pub fn reflect_in_active_dates<'a>(
        mut dates: BTreeSet<NaiveDate>,
        exceptions: impl IntoIterator<Item = &'a CalendarException>,
    ) -> BTreeSet<NaiveDate> {
        for exception in exceptions {
            match exception.exception_type {
                ExceptionType::Added => {
                    dates.insert(exception.date);
                }
                ExceptionType::Removed => {
                    dates.remove(&exception.date);
                }
            }
        }
        dates
    }
}

impl Entity for CalendarException {
    const NAME: &'static str = "CalendarException";
    const TABLE: &'static str = "calendar_exceptions";
    const CREATE_TABLE: &'static str = "CREATE TABLE calendar_exceptions (
        calendar_id TEXT NOT NULL REFERENCES calendars(calendar_id)
            ON DELETE CASCADE ON UPDATE CASCADE,
        date TEXT NOT NULL CHECK (date LIKE '____-__-__'),
        exception_type INTEGER NOT NULL CHECK (exception_type IN (1, 2)),
        PRIMARY KEY (calendar_id, date)
    ) STRICT;";
    const COLUMNS: &'static str = "(calendar_id, date, exception_type)";
    const PLACEHOLDERS: &'static str = "(?, ?, ?)";
    const WHERE_PK: &'static str = "calendar_id = ? AND date = ?";
    const SET_COLS: &'static str = "calendar_id = ?, date = ?, exception_type = ?";

    fn marshall(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.calendar_id.clone()),
            SqlValue::Text(format_sql_date(self.date)),
            SqlValue::Integer(self.exception_type.code()),
        ]
    }

    fn primary_key(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.calendar_id.clone()),
            SqlValue::Text(format_sql_date(self.date)),
        ]
    }

    fn unmarshall(row: &[SqlValue]) -> Result<Self> {
        let mut r = RowReader::new(Self::NAME, row);
        let exception = Self {
            calendar_id: r.text("calendar_id")?,
            date: r.date("date")?,
            exception_type: r.enum_field("exception_type", ExceptionType::from_code)?,
        };
        r.finish()?;
        Ok(exception)
    }
}

impl GtfsEntity for CalendarException {
    const GTFS_TABLE: &'static str = "calendar_dates";

    fn gtfs_marshall(&self) -> HashMap<String, String> {
        HashMap::from([
            ("service_id".to_string(), self.calendar_id.clone()),
            ("date".to_string(), format_gtfs_date(self.date)),
            (
                "exception_type".to_string(),
                self.exception_type.code().to_string(),
            ),
        ])
    }

    fn gtfs_unmarshall(row: &HashMap<String, String>) -> Result<Self> {
        let r = GtfsRow::new(Self::NAME, row);
        Ok(Self {
            calendar_id: r.required("service_id")?.to_string(),
            date: parse_gtfs_date(r.required("date")?)?,
            exception_type: r.enum_field("exception_type", ExceptionType::from_code)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> CalendarException {
        CalendarException {
            calendar_id: "C".to_string(),
            date: NaiveDate::from_ymd_opt(2020, 5, 3).unwrap(),
            exception_type: ExceptionType::Added,
        }
    }

    #[test]
    fn sql_round_trip() {
        let exception = fixture();
        assert_eq!(
            CalendarException::unmarshall(&exception.marshall()).unwrap(),
            exception
        );
    }

    #[test]
    fn gtfs_round_trip() {
        let exception = fixture();
        assert_eq!(
            CalendarException::gtfs_unmarshall(&exception.gtfs_marshall()).unwrap(),
            exception
        );
    }

    #[test]
    fn reflect_adds_and_removes_dates() {
        let base: BTreeSet<NaiveDate> = [4, 5]
            .into_iter()
            .map(|d| NaiveDate::from_ymd_opt(2020, 5, d).unwrap())
            .collect();
        let exceptions = [
            CalendarException {
                calendar_id: "C".to_string(),
                date: NaiveDate::from_ymd_opt(2020, 5, 3).unwrap(),
                exception_type: ExceptionType::Added,
            },
            CalendarException {
                calendar_id: "C".to_string(),
                date: NaiveDate::from_ymd_opt(2020, 5, 4).unwrap(),
                exception_type: ExceptionType::Removed,
            },
        ];
        let result = CalendarException::reflect_in_active_dates(base, exceptions.iter());
        let expected: BTreeSet<NaiveDate> = [3, 5]
            .into_iter()
            .map(|d| NaiveDate::from_ymd_opt(2020, 5, d).unwrap())
            .collect();
        assert_eq!(result, expected);
    }
}
