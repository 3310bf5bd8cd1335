use std::collections::BTreeSet;
use std::collections::HashMap;

use chrono::{Datelike, Days, NaiveDate, Weekday};

use super::meta::{bool_to_gtfs, Entity, GtfsEntity, GtfsRow, RowReader, SqlValue};
use super::types::{
    format_gtfs_date, format_sql_date, parse_gtfs_date, signals_exceptions,
};
use crate::error::Result;

/// A set of dates on which [Trip](super::Trip)s operate,
/// equivalent to GTFS's `calendar.txt` entries.
///
/// The weekday bits select the active dates between `start_date` and
/// `end_date` inclusive; [CalendarException](super::CalendarException)s then
/// add or remove individual dates. A calendar with both dates set to the
/// [signals_exceptions] sentinel has no regular service at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Calendar {
    pub id: String,
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub desc: String,
}

impl Calendar {
    /// A calendar with no weekday bits set and sentinel dates,
    /// signalling that all activity comes from exceptions.
    pub fn exceptions_only(id: &str) -> Self {
        Self {
            id: id.to_string(),
            monday: false,
            tuesday: false,
            wednesday: false,
            thursday: false,
            friday: false,
            saturday: false,
            sunday: false,
            start_date: signals_exceptions(),
            end_date: signals_exceptions(),
            desc: String::new(),
        }
    }

    pub fn runs_on(&self, weekday: Weekday) -> bool {
        match weekday {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }

    /// Computes the dates on which this calendar is active, before any
    /// exceptions are taken into account.
    pub fn active_dates(&self) -> BTreeSet<NaiveDate> {
        let mut dates = BTreeSet::new();
        if self.start_date == signals_exceptions() && self.end_date == signals_exceptions() {
            return dates;
        }
        let mut date = self.start_date;
        while date <= self.end_date {
            if self.runs_on(date.weekday()) {
                dates.insert(date);
            }
            match date.checked_add_days(Days::new(1)) {
                Some(next) => date = next,
                None => break,
            }
        }
        dates
    }
}

impl Entity for Calendar {
    const NAME: &'static str = "Calendar";
    const TABLE: &'static str = "calendars";
    const CREATE_TABLE: &'static str = "CREATE TABLE calendars (
        calendar_id TEXT PRIMARY KEY,
        monday INTEGER NOT NULL CHECK (monday IN (0, 1)),
        tuesday INTEGER NOT NULL CHECK (tuesday IN (0, 1)),
        wednesday INTEGER NOT NULL CHECK (wednesday IN (0, 1)),
        thursday INTEGER NOT NULL CHECK (thursday IN (0, 1)),
        friday INTEGER NOT NULL CHECK (friday IN (0, 1)),
        saturday INTEGER NOT NULL CHECK (saturday IN (0, 1)),
        sunday INTEGER NOT NULL CHECK (sunday IN (0, 1)),
        start_date TEXT NOT NULL CHECK (start_date LIKE '____-__-__'),
        end_date TEXT NOT NULL CHECK (end_date LIKE '____-__-__'),
        desc TEXT NOT NULL DEFAULT ''
    ) STRICT;";
    const COLUMNS: &'static str = "(calendar_id, monday, tuesday, wednesday, thursday, friday, \
         saturday, sunday, start_date, end_date, desc)";
    const PLACEHOLDERS: &'static str = "(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
    const WHERE_PK: &'static str = "calendar_id = ?";
    const SET_COLS: &'static str = "calendar_id = ?, monday = ?, tuesday = ?, wednesday = ?, \
         thursday = ?, friday = ?, saturday = ?, sunday = ?, start_date = ?, end_date = ?, \
         desc = ?";

    fn marshall(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.id.clone()),
            SqlValue::Integer(self.monday.into()),
            SqlValue::Integer(self.tuesday.into()),
            SqlValue::Integer(self.wednesday.into()),
            SqlValue::Integer(self.thursday.into()),
            SqlValue::Integer(self.friday.into()),
            SqlValue::Integer(self.saturday.into()),
            SqlValue::Integer(self.sunday.into()),
            SqlValue::Text(format_sql_date(self.start_date)),
            SqlValue::Text(format_sql_date(self.end_date)),
            SqlValue::Text(self.desc.clone()),
        ]
    }

    fn primary_key(&self) -> Vec<SqlValue> {
        vec![SqlValue::Text(self.id.clone())]
    }

    fn unmarshall(row: &[SqlValue]) -> Result<Self> {
        let mut r = RowReader::new(Self::NAME, row);
        let calendar = Self {
            id: r.text("id")?,
            monday: r.boolean("monday")?,
            tuesday: r.boolean("tuesday")?,
            wednesday: r.boolean("wednesday")?,
            thursday: r.boolean("thursday")?,
            friday: r.boolean("friday")?,
            saturday: r.boolean("saturday")?,
            sunday: r.boolean("sunday")?,
            start_date: r.date("start_date")?,
            end_date: r.date("end_date")?,
            desc: r.text("desc")?,
        };
        r.finish()?;
        Ok(calendar)
    }
}

impl GtfsEntity for Calendar {
    const GTFS_TABLE: &'static str = "calendar";

    fn gtfs_marshall(&self) -> HashMap<String, String> {
        HashMap::from([
            ("service_id".to_string(), self.id.clone()),
            ("monday".to_string(), bool_to_gtfs(self.monday).to_string()),
            ("tuesday".to_string(), bool_to_gtfs(self.tuesday).to_string()),
            (
                "wednesday".to_string(),
                bool_to_gtfs(self.wednesday).to_string(),
            ),
            (
                "thursday".to_string(),
                bool_to_gtfs(self.thursday).to_string(),
            ),
            ("friday".to_string(), bool_to_gtfs(self.friday).to_string()),
            (
                "saturday".to_string(),
                bool_to_gtfs(self.saturday).to_string(),
            ),
            ("sunday".to_string(), bool_to_gtfs(self.sunday).to_string()),
            ("start_date".to_string(), format_gtfs_date(self.start_date)),
            ("end_date".to_string(), format_gtfs_date(self.end_date)),
            ("service_desc".to_string(), self.desc.clone()),
        ])
    }

    fn gtfs_unmarshall(row: &HashMap<String, String>) -> Result<Self> {
        let r = GtfsRow::new(Self::NAME, row);
        Ok(Self {
            id: r.required("service_id")?.to_string(),
            monday: r.boolean("monday", false)?,
            tuesday: r.boolean("tuesday", false)?,
            wednesday: r.boolean("wednesday", false)?,
            thursday: r.boolean("thursday", false)?,
            friday: r.boolean("friday", false)?,
            saturday: r.boolean("saturday", false)?,
            sunday: r.boolean("sunday", false)?,
            start_date: parse_gtfs_date(r.required("start_date")?)?,
            end_date: parse_gtfs_date(r.required("end_date")?)?,
            desc: r.optional("service_desc"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workdays() -> Calendar {
        Calendar {
            id: "C".to_string(),
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: false,
            sunday: false,
            start_date: NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2020, 5, 10).unwrap(),
            desc: String::new(),
        }
    }

    #[test]
    fn sql_round_trip() {
        let calendar = workdays();
        assert_eq!(Calendar::unmarshall(&calendar.marshall()).unwrap(), calendar);
    }

    #[test]
    fn gtfs_round_trip() {
        let calendar = workdays();
        assert_eq!(
            Calendar::gtfs_unmarshall(&calendar.gtfs_marshall()).unwrap(),
            calendar
        );
    }

    #[test]
    fn active_dates_follow_weekday_bits() {
        let dates = workdays().active_dates();
        // 2020-05-01 was a Friday; workdays in [05-01, 05-10] are
        // 1st, 4th, 5th, 6th, 7th and 8th.
        let expected: BTreeSet<NaiveDate> = [1, 4, 5, 6, 7, 8]
            .into_iter()
            .map(|d| NaiveDate::from_ymd_opt(2020, 5, d).unwrap())
            .collect();
        assert_eq!(dates, expected);
    }

    #[test]
    fn sentinel_dates_mean_no_regular_service() {
        assert!(Calendar::exceptions_only("C").active_dates().is_empty());
    }
}
