use std::collections::HashMap;

use super::meta::{Entity, GtfsEntity, GtfsRow, RowReader, SqlValue};
use super::types::TimePoint;
use crate::error::Result;

/// How passengers may board or alight at a particular stop of a trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PassengerExchange {
    #[default]
    ScheduledStop = 0,
    None = 1,
    MustPhone = 2,
    OnRequest = 3,
}

impl PassengerExchange {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::ScheduledStop),
            1 => Some(Self::None),
            2 => Some(Self::MustPhone),
            3 => Some(Self::OnRequest),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

/// A scheduled call of a [Trip](super::Trip) at a [Stop](super::Stop),
/// equivalent to GTFS's `stop_times.txt` entries.
///
/// Times are stored as whole seconds since the service midnight and may
/// exceed 24 hours.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopTime {
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: i64,
    pub arrival_time: TimePoint,
    pub departure_time: TimePoint,
    pub pickup_type: PassengerExchange,
    pub drop_off_type: PassengerExchange,
    pub stop_headsign: String,
    pub shape_dist_traveled: Option<f64>,
    pub original_stop_id: String,
    pub platform: String,
}

impl Entity for StopTime {
    const NAME: &'static str = "StopTime";
    const TABLE: &'static str = "stop_times";
    const CREATE_TABLE: &'static str = "CREATE TABLE stop_times (
        trip_id TEXT NOT NULL REFERENCES trips(trip_id) ON DELETE CASCADE ON UPDATE CASCADE,
        stop_id TEXT NOT NULL REFERENCES stops(stop_id) ON DELETE CASCADE ON UPDATE CASCADE,
        stop_sequence INTEGER NOT NULL CHECK (stop_sequence >= 0),
        arrival_time INTEGER NOT NULL,
        departure_time INTEGER NOT NULL,
        pickup_type INTEGER NOT NULL DEFAULT 0 CHECK (pickup_type IN (0, 1, 2, 3)),
        drop_off_type INTEGER NOT NULL DEFAULT 0 CHECK (drop_off_type IN (0, 1, 2, 3)),
        stop_headsign TEXT NOT NULL DEFAULT '',
        shape_dist_traveled REAL DEFAULT NULL,
        original_stop_id TEXT NOT NULL DEFAULT '',
        platform TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (trip_id, stop_sequence)
    ) STRICT;
    CREATE INDEX idx_stop_times_stop_id ON stop_times(stop_id);";
    const COLUMNS: &'static str = "(trip_id, stop_id, stop_sequence, arrival_time, \
         departure_time, pickup_type, drop_off_type, stop_headsign, shape_dist_traveled, \
         original_stop_id, platform)";
    const PLACEHOLDERS: &'static str = "(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
    const WHERE_PK: &'static str = "trip_id = ? AND stop_sequence = ?";
    const SET_COLS: &'static str = "trip_id = ?, stop_id = ?, stop_sequence = ?, \
         arrival_time = ?, departure_time = ?, pickup_type = ?, drop_off_type = ?, \
         stop_headsign = ?, shape_dist_traveled = ?, original_stop_id = ?, platform = ?";

    fn marshall(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.trip_id.clone()),
            SqlValue::Text(self.stop_id.clone()),
            SqlValue::Integer(self.stop_sequence),
            SqlValue::Integer(self.arrival_time.total_seconds() as i64),
            SqlValue::Integer(self.departure_time.total_seconds() as i64),
            SqlValue::Integer(self.pickup_type.code()),
            SqlValue::Integer(self.drop_off_type.code()),
            SqlValue::Text(self.stop_headsign.clone()),
            self.shape_dist_traveled.map_or(SqlValue::Null, SqlValue::Real),
            SqlValue::Text(self.original_stop_id.clone()),
            SqlValue::Text(self.platform.clone()),
        ]
    }

    fn primary_key(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.trip_id.clone()),
            SqlValue::Integer(self.stop_sequence),
        ]
    }

    fn unmarshall(row: &[SqlValue]) -> Result<Self> {
        let mut r = RowReader::new(Self::NAME, row);
        let stop_time = Self {
            trip_id: r.text("trip_id")?,
            stop_id: r.text("stop_id")?,
            stop_sequence: r.integer("stop_sequence")?,
            arrival_time: r.time("arrival_time")?,
            departure_time: r.time("departure_time")?,
            pickup_type: r.enum_field("pickup_type", PassengerExchange::from_code)?,
            drop_off_type: r.enum_field("drop_off_type", PassengerExchange::from_code)?,
            stop_headsign: r.text("stop_headsign")?,
            shape_dist_traveled: r.nullable_real("shape_dist_traveled")?,
            original_stop_id: r.text("original_stop_id")?,
            platform: r.text("platform")?,
        };
        r.finish()?;
        Ok(stop_time)
    }
}

impl GtfsEntity for StopTime {
    const GTFS_TABLE: &'static str = "stop_times";

    fn gtfs_marshall(&self) -> HashMap<String, String> {
        HashMap::from([
            ("trip_id".to_string(), self.trip_id.clone()),
            ("stop_id".to_string(), self.stop_id.clone()),
            ("stop_sequence".to_string(), self.stop_sequence.to_string()),
            ("arrival_time".to_string(), self.arrival_time.to_string()),
            ("departure_time".to_string(), self.departure_time.to_string()),
            ("pickup_type".to_string(), self.pickup_type.code().to_string()),
            (
                "drop_off_type".to_string(),
                self.drop_off_type.code().to_string(),
            ),
            ("stop_headsign".to_string(), self.stop_headsign.clone()),
            (
                "shape_dist_traveled".to_string(),
                self.shape_dist_traveled
                    .map(|x| x.to_string())
                    .unwrap_or_default(),
            ),
            ("original_stop_id".to_string(), self.original_stop_id.clone()),
            ("platform".to_string(), self.platform.clone()),
        ])
    }

    fn gtfs_unmarshall(row: &HashMap<String, String>) -> Result<Self> {
        let r = GtfsRow::new(Self::NAME, row);
        Ok(Self {
            trip_id: r.required("trip_id")?.to_string(),
            stop_id: r.required("stop_id")?.to_string(),
            stop_sequence: r.parse("stop_sequence")?,
            arrival_time: r.parse("arrival_time")?,
            departure_time: r.parse("departure_time")?,
            pickup_type: r.enum_field_or(
                "pickup_type",
                PassengerExchange::from_code,
                PassengerExchange::ScheduledStop,
            )?,
            drop_off_type: r.enum_field_or(
                "drop_off_type",
                PassengerExchange::from_code,
                PassengerExchange::ScheduledStop,
            )?,
            stop_headsign: r.optional("stop_headsign"),
            shape_dist_traveled: r.parse_optional("shape_dist_traveled")?,
            original_stop_id: r.optional("original_stop_id"),
            platform: r.optional("platform"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> StopTime {
        StopTime {
            trip_id: "C-303".to_string(),
            stop_id: "wsrod".to_string(),
            stop_sequence: 0,
            arrival_time: TimePoint::from_hms(5, 5, 0),
            departure_time: TimePoint::from_hms(5, 5, 0),
            pickup_type: PassengerExchange::ScheduledStop,
            drop_off_type: PassengerExchange::ScheduledStop,
            stop_headsign: String::new(),
            shape_dist_traveled: None,
            original_stop_id: String::new(),
            platform: "1".to_string(),
        }
    }

    #[test]
    fn sql_round_trip() {
        let stop_time = fixture();
        assert_eq!(
            StopTime::unmarshall(&stop_time.marshall()).unwrap(),
            stop_time
        );
    }

    #[test]
    fn times_are_stored_as_seconds() {
        let stop_time = StopTime {
            departure_time: TimePoint::from_hms(25, 30, 0),
            ..fixture()
        };
        assert_eq!(stop_time.marshall()[4], SqlValue::Integer(91800));
    }

    #[test]
    fn gtfs_round_trip() {
        let stop_time = fixture();
        assert_eq!(
            StopTime::gtfs_unmarshall(&stop_time.gtfs_marshall()).unwrap(),
            stop_time
        );
    }

    #[test]
    fn gtfs_marshall_formats_times_as_clock_strings() {
        let row = fixture().gtfs_marshall();
        assert_eq!(row["arrival_time"], "05:05:00");
    }
}
