use std::collections::HashMap;

use super::meta::{bool_to_gtfs, Entity, GtfsEntity, GtfsRow, RowReader, SqlValue};
use super::types::TimePoint;
use crate::error::Result;

/// Headway-based service over a [Trip](super::Trip) template,
/// equivalent to GTFS's `frequencies.txt` entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frequency {
    pub trip_id: String,
    pub start_time: TimePoint,
    pub end_time: TimePoint,
    pub headway: i64,
    pub exact_times: bool,
}

impl Entity for Frequency {
    const NAME: &'static str = "Frequency";
    const TABLE: &'static str = "frequencies";
    const CREATE_TABLE: &'static str = "CREATE TABLE frequencies (
        trip_id TEXT NOT NULL REFERENCES trips(trip_id) ON DELETE CASCADE ON UPDATE CASCADE,
        start_time INTEGER NOT NULL,
        end_time INTEGER NOT NULL,
        headway INTEGER NOT NULL CHECK (headway > 0),
        exact_times INTEGER DEFAULT 0 CHECK (exact_times IN (0, 1)),
        PRIMARY KEY (trip_id, start_time)
    ) STRICT;";
    const COLUMNS: &'static str = "(trip_id, start_time, end_time, headway, exact_times)";
    const PLACEHOLDERS: &'static str = "(?, ?, ?, ?, ?)";
    const WHERE_PK: &'static str = "trip_id = ? AND start_time = ?";
    const SET_COLS: &'static str =
        "trip_id = ?, start_time = ?, end_time = ?, headway = ?, exact_times = ?";

    fn marshall(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.trip_id.clone()),
            SqlValue::Integer(self.start_time.total_seconds() as i64),
            SqlValue::Integer(self.end_time.total_seconds() as i64),
            SqlValue::Integer(self.headway),
            SqlValue::Integer(self.exact_times.into()),
        ]
    }

    fn primary_key(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.trip_id.clone()),
            SqlValue::Integer(self.start_time.total_seconds() as i64),
        ]
    }

    fn unmarshall(row: &[SqlValue]) -> Result<Self> {
        let mut r = RowReader::new(Self::NAME, row);
        let frequency = Self {
            trip_id: r.text("trip_id")?,
            start_time: r.time("start_time")?,
            end_time: r.time("end_time")?,
            headway: r.integer("headway")?,
            exact_times: r.boolean("exact_times")?,
        };
        r.finish()?;
        Ok(frequency)
    }
}

impl GtfsEntity for Frequency {
    const GTFS_TABLE: &'static str = "frequencies";

    fn gtfs_marshall(&self) -> HashMap<String, String> {
        HashMap::from([
            ("trip_id".to_string(), self.trip_id.clone()),
            ("start_time".to_string(), self.start_time.to_string()),
            ("end_time".to_string(), self.end_time.to_string()),
            ("headway_secs".to_string(), self.headway.to_string()),
            (
                "exact_times".to_string(),
                bool_to_gtfs(self.exact_times).to_string(),
            ),
        ])
    }

    fn gtfs_unmarshall(row: &HashMap<String, String>) -> Result<Self> {
        let r = GtfsRow::new(Self::NAME, row);
        Ok(Self {
            trip_id: r.required("trip_id")?.to_string(),
            start_time: r.parse("start_time")?,
            end_time: r.parse("end_time")?,
            headway: r.parse("headway_secs")?,
            exact_times: r.boolean("exact_times", false)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Frequency {
        Frequency {
            trip_id: "C-303".to_string(),
            start_time: TimePoint::from_hms(6, 0, 0),
            end_time: TimePoint::from_hms(9, 0, 0),
            headway: 600,
            exact_times: false,
        }
    }

    #[test]
    fn sql_round_trip() {
        let frequency = fixture();
        assert_eq!(
            Frequency::unmarshall(&frequency.marshall()).unwrap(),
            frequency
        );
    }

    #[test]
    fn gtfs_round_trip() {
        let frequency = fixture();
        assert_eq!(
            Frequency::gtfs_unmarshall(&frequency.gtfs_marshall()).unwrap(),
            frequency
        );
    }
}
