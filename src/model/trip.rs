use std::collections::HashMap;

use super::meta::{
    text_or_null, tri_state_to_gtfs, Entity, GtfsEntity, GtfsRow, RowReader, SqlValue,
};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Outbound = 0,
    Inbound = 1,
}

impl Direction {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Outbound),
            1 => Some(Self::Inbound),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

/// A single journey of a vehicle, equivalent to GTFS's `trips.txt` entries.
///
/// `block_id` and `shape_id` use the empty string for "not set", stored as
/// SQL NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trip {
    pub id: String,
    pub route_id: String,
    pub calendar_id: String,
    pub headsign: String,
    pub short_name: String,
    pub direction: Option<Direction>,
    pub block_id: String,
    pub shape_id: String,
    pub wheelchair_accessible: Option<bool>,
    pub bikes_allowed: Option<bool>,
    pub exceptional: Option<bool>,
}

impl Entity for Trip {
    const NAME: &'static str = "Trip";
    const TABLE: &'static str = "trips";
    const CREATE_TABLE: &'static str = "CREATE TABLE trips (
        trip_id TEXT PRIMARY KEY,
        route_id TEXT NOT NULL REFERENCES routes(route_id)
            ON DELETE CASCADE ON UPDATE CASCADE,
        calendar_id TEXT NOT NULL REFERENCES calendars(calendar_id)
            ON DELETE CASCADE ON UPDATE CASCADE,
        headsign TEXT NOT NULL DEFAULT '',
        short_name TEXT NOT NULL DEFAULT '',
        direction INTEGER DEFAULT NULL CHECK (direction IN (0, 1)),
        block_id TEXT DEFAULT NULL,
        shape_id TEXT DEFAULT NULL,
        wheelchair_accessible INTEGER DEFAULT NULL CHECK (wheelchair_accessible IN (0, 1)),
        bikes_allowed INTEGER DEFAULT NULL CHECK (bikes_allowed IN (0, 1)),
        exceptional INTEGER DEFAULT NULL CHECK (exceptional IN (0, 1))
    ) STRICT;
    CREATE INDEX idx_trips_route_id ON trips(route_id);
    CREATE INDEX idx_trips_calendar_id ON trips(calendar_id);
    CREATE INDEX idx_trips_block_id ON trips(block_id);";
    const COLUMNS: &'static str = "(trip_id, route_id, calendar_id, headsign, short_name, \
         direction, block_id, shape_id, wheelchair_accessible, bikes_allowed, exceptional)";
    const PLACEHOLDERS: &'static str = "(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
    const WHERE_PK: &'static str = "trip_id = ?";
    const SET_COLS: &'static str = "trip_id = ?, route_id = ?, calendar_id = ?, headsign = ?, \
         short_name = ?, direction = ?, block_id = ?, shape_id = ?, wheelchair_accessible = ?, \
         bikes_allowed = ?, exceptional = ?";

    fn marshall(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.id.clone()),
            SqlValue::Text(self.route_id.clone()),
            SqlValue::Text(self.calendar_id.clone()),
            SqlValue::Text(self.headsign.clone()),
            SqlValue::Text(self.short_name.clone()),
            self.direction
                .map_or(SqlValue::Null, |x| SqlValue::Integer(x.code())),
            text_or_null(&self.block_id),
            text_or_null(&self.shape_id),
            self.wheelchair_accessible
                .map_or(SqlValue::Null, |x| SqlValue::Integer(x.into())),
            self.bikes_allowed
                .map_or(SqlValue::Null, |x| SqlValue::Integer(x.into())),
            self.exceptional
                .map_or(SqlValue::Null, |x| SqlValue::Integer(x.into())),
        ]
    }

    fn primary_key(&self) -> Vec<SqlValue> {
        vec![SqlValue::Text(self.id.clone())]
    }

    fn unmarshall(row: &[SqlValue]) -> Result<Self> {
        let mut r = RowReader::new(Self::NAME, row);
        let trip = Self {
            id: r.text("id")?,
            route_id: r.text("route_id")?,
            calendar_id: r.text("calendar_id")?,
            headsign: r.text("headsign")?,
            short_name: r.text("short_name")?,
            direction: r.nullable_enum_field("direction", Direction::from_code)?,
            block_id: r.text_or_empty("block_id")?,
            shape_id: r.text_or_empty("shape_id")?,
            wheelchair_accessible: r.nullable_boolean("wheelchair_accessible")?,
            bikes_allowed: r.nullable_boolean("bikes_allowed")?,
            exceptional: r.nullable_boolean("exceptional")?,
        };
        r.finish()?;
        Ok(trip)
    }
}

impl GtfsEntity for Trip {
    const GTFS_TABLE: &'static str = "trips";

    fn gtfs_marshall(&self) -> HashMap<String, String> {
        HashMap::from([
            ("trip_id".to_string(), self.id.clone()),
            ("route_id".to_string(), self.route_id.clone()),
            ("service_id".to_string(), self.calendar_id.clone()),
            ("trip_headsign".to_string(), self.headsign.clone()),
            ("trip_short_name".to_string(), self.short_name.clone()),
            (
                "direction_id".to_string(),
                self.direction
                    .map(|x| x.code().to_string())
                    .unwrap_or_default(),
            ),
            ("block_id".to_string(), self.block_id.clone()),
            ("shape_id".to_string(), self.shape_id.clone()),
            (
                "wheelchair_accessible".to_string(),
                tri_state_to_gtfs(self.wheelchair_accessible),
            ),
            (
                "bikes_allowed".to_string(),
                tri_state_to_gtfs(self.bikes_allowed),
            ),
            (
                "exceptional".to_string(),
                self.exceptional
                    .map(|x| if x { "1" } else { "0" }.to_string())
                    .unwrap_or_default(),
            ),
        ])
    }

    fn gtfs_unmarshall(row: &HashMap<String, String>) -> Result<Self> {
        let r = GtfsRow::new(Self::NAME, row);
        let exceptional = match r.get("exceptional") {
            None => None,
            Some("0") => Some(false),
            Some("1") => Some(true),
            Some(other) => {
                return Err(crate::error::Error::InvalidValue {
                    entity: Self::NAME,
                    field: "exceptional",
                    value: other.to_string(),
                })
            }
        };
        Ok(Self {
            id: r.required("trip_id")?.to_string(),
            route_id: r.required("route_id")?.to_string(),
            calendar_id: r.required("service_id")?.to_string(),
            headsign: r.optional("trip_headsign"),
            short_name: r.optional("trip_short_name"),
            direction: r.optional_enum_field("direction_id", Direction::from_code)?,
            block_id: r.optional("block_id"),
            shape_id: r.optional("shape_id"),
            wheelchair_accessible: r.tri_state("wheelchair_accessible")?,
            bikes_allowed: r.tri_state("bikes_allowed")?,
            exceptional,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Trip {
        Trip {
            id: "C-303".to_string(),
            route_id: "A1".to_string(),
            calendar_id: "C".to_string(),
            headsign: "Grodzisk Mazowiecki Radońska".to_string(),
            short_name: String::new(),
            direction: Some(Direction::Outbound),
            block_id: String::new(),
            shape_id: String::new(),
            wheelchair_accessible: Some(true),
            bikes_allowed: None,
            exceptional: None,
        }
    }

    #[test]
    fn sql_round_trip() {
        let trip = fixture();
        assert_eq!(Trip::unmarshall(&trip.marshall()).unwrap(), trip);
    }

    #[test]
    fn empty_block_and_shape_stored_as_null() {
        let values = fixture().marshall();
        assert_eq!(values[6], SqlValue::Null);
        assert_eq!(values[7], SqlValue::Null);
    }

    #[test]
    fn gtfs_round_trip() {
        let trip = fixture();
        assert_eq!(Trip::gtfs_unmarshall(&trip.gtfs_marshall()).unwrap(), trip);
    }
}
