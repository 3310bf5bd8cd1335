use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::db::Database;
use crate::error::{DataError, Result};
use crate::model::{Calendar, CalendarException};
use crate::model::types::format_sql_date;
use crate::task::{Task, TaskRuntime};
use crate::tools::temporal::DateRange;

/// Removes all service beyond the provided range.
///
/// For simplicity, every [Calendar] is converted to exception-based: the
/// weekday bits are cleared, the dates are set to the sentinel, and every
/// remaining active date is re-expressed as an ADDED
/// [CalendarException]. Calendars left without any active dates are
/// dropped.
pub struct TruncateCalendars {
    target: DateRange,
    fail_on_empty: bool,

    to_drop: BTreeSet<String>,
    to_update: BTreeMap<String, BTreeSet<NaiveDate>>,
}

impl TruncateCalendars {
    pub fn new(target: DateRange) -> Self {
        Self {
            target,
            fail_on_empty: true,
            to_drop: BTreeSet::new(),
            to_update: BTreeMap::new(),
        }
    }

    /// Log a warning instead of failing when the truncation removes
    /// every service.
    pub fn allow_empty(mut self) -> Self {
        self.fail_on_empty = false;
        self
    }

    fn clear_state(&mut self) {
        self.to_drop.clear();
        self.to_update.clear();
    }

    fn compute_changes(&mut self, db: &Database) -> Result<()> {
        log::info!("Computing changes to perform");
        for calendar in db.retrieve_all::<Calendar>()? {
            let truncated = self.truncated_days_of(&calendar, db)?;
            if truncated.is_empty() {
                self.to_drop.insert(calendar.id);
            } else {
                self.to_update.insert(calendar.id, truncated);
            }
        }
        Ok(())
    }

    fn truncated_days_of(
        &self,
        calendar: &Calendar,
        db: &Database,
    ) -> Result<BTreeSet<NaiveDate>> {
        let exceptions: Vec<CalendarException> = db
            .typed_query(
                "SELECT * FROM calendar_exceptions WHERE calendar_id = ?",
                [calendar.id.as_str()],
            )?
            .all();
        let active =
            CalendarException::reflect_in_active_dates(calendar.active_dates(), exceptions.iter());
        Ok(active
            .into_iter()
            .filter(|date| self.target.contains(*date))
            .collect())
    }

    fn check_if_empty(&self) -> Result<()> {
        if self.to_update.is_empty() {
            if self.fail_on_empty {
                return Err(DataError::NoServicesLeft(self.target.to_string()).into());
            }
            log::warn!("No services left after calendar truncation to {}", self.target);
        }
        Ok(())
    }

    fn apply_changes(&self, db: &Database) -> Result<()> {
        self.drop_calendars(db)?;
        self.make_all_calendars_use_exceptions(db)?;
        self.set_exceptions_on_calendars(db)
    }

    fn drop_calendars(&self, db: &Database) -> Result<()> {
        log::info!("Dropping {} calendar(s)", self.to_drop.len());
        db.raw_execute_many(
            "DELETE FROM calendars WHERE calendar_id = ?",
            self.to_drop.iter().map(|id| [id.as_str()]),
        )?;
        Ok(())
    }

    fn make_all_calendars_use_exceptions(&self, db: &Database) -> Result<()> {
        log::info!("Updating dates of {} calendar(s)", self.to_update.len());
        let sentinel = format_sql_date(crate::model::types::signals_exceptions());
        db.raw_execute(
            "UPDATE calendars SET monday=0, tuesday=0, wednesday=0, thursday=0, friday=0, \
             saturday=0, sunday=0, start_date=?, end_date=?",
            [sentinel.as_str(), sentinel.as_str()],
        )?;
        Ok(())
    }

    fn set_exceptions_on_calendars(&self, db: &Database) -> Result<()> {
        db.raw_execute("DELETE FROM calendar_exceptions", [])?;
        db.raw_execute_many(
            "INSERT INTO calendar_exceptions (calendar_id, date, exception_type) \
             VALUES (?, ?, 1)",
            self.to_update.iter().flat_map(|(calendar_id, dates)| {
                dates
                    .iter()
                    .map(move |date| (calendar_id.clone(), format_sql_date(*date)))
            }),
        )?;
        Ok(())
    }
}

impl Task for TruncateCalendars {
    fn name(&self) -> &str {
        "TruncateCalendars"
    }

    fn execute(&mut self, runtime: &mut TaskRuntime<'_>) -> Result<()> {
        self.clear_state();
        self.compute_changes(runtime.db)?;
        self.check_if_empty()?;
        runtime.db.transaction(|| self.apply_changes(runtime.db))
    }

    fn manages_own_transactions(&self) -> bool {
        true
    }
}
