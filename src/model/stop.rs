use std::collections::HashMap;

use super::meta::{
    text_or_null, tri_state_to_gtfs, Entity, GtfsEntity, GtfsRow, RowReader, SqlValue,
};
use crate::error::Result;

/// Discriminates physical stops, stations grouping them and station exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LocationType {
    #[default]
    Stop = 0,
    Station = 1,
    Exit = 2,
}

impl LocationType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Stop),
            1 => Some(Self::Station),
            2 => Some(Self::Exit),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

/// A place where vehicles pick up or drop off passengers,
/// equivalent to GTFS's `stops.txt` entries.
///
/// `parent_station` references another Stop; the empty string means no parent
/// and is stored as SQL NULL so the foreign key only applies when meaningful.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub code: String,
    pub zone_id: String,
    pub location_type: LocationType,
    pub parent_station: String,
    pub wheelchair_boarding: Option<bool>,
    pub platform_code: String,
    pub pkpplk_code: String,
    pub ibnr_code: String,
}

impl Entity for Stop {
    const NAME: &'static str = "Stop";
    const TABLE: &'static str = "stops";
    const CREATE_TABLE: &'static str = "CREATE TABLE stops (
        stop_id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        lat REAL NOT NULL,
        lon REAL NOT NULL,
        code TEXT NOT NULL DEFAULT '',
        zone_id TEXT NOT NULL DEFAULT '',
        location_type INTEGER NOT NULL DEFAULT 0 CHECK (location_type IN (0, 1, 2)),
        parent_station TEXT REFERENCES stops(stop_id) ON DELETE CASCADE ON UPDATE CASCADE,
        wheelchair_boarding INTEGER DEFAULT NULL CHECK (wheelchair_boarding IN (0, 1)),
        platform_code TEXT NOT NULL DEFAULT '',
        pkpplk_code TEXT NOT NULL DEFAULT '',
        ibnr_code TEXT NOT NULL DEFAULT ''
    ) STRICT;
    CREATE INDEX idx_stops_zone ON stops(zone_id);
    CREATE INDEX idx_stops_parent_station ON stops(parent_station);";
    const COLUMNS: &'static str = "(stop_id, name, lat, lon, code, zone_id, location_type, \
         parent_station, wheelchair_boarding, platform_code, pkpplk_code, ibnr_code)";
    const PLACEHOLDERS: &'static str = "(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
    const WHERE_PK: &'static str = "stop_id = ?";
    const SET_COLS: &'static str = "stop_id = ?, name = ?, lat = ?, lon = ?, code = ?, \
         zone_id = ?, location_type = ?, parent_station = ?, wheelchair_boarding = ?, \
         platform_code = ?, pkpplk_code = ?, ibnr_code = ?";

    fn marshall(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.id.clone()),
            SqlValue::Text(self.name.clone()),
            SqlValue::Real(self.lat),
            SqlValue::Real(self.lon),
            SqlValue::Text(self.code.clone()),
            SqlValue::Text(self.zone_id.clone()),
            SqlValue::Integer(self.location_type.code()),
            text_or_null(&self.parent_station),
            self.wheelchair_boarding
                .map_or(SqlValue::Null, |x| SqlValue::Integer(x.into())),
            SqlValue::Text(self.platform_code.clone()),
            SqlValue::Text(self.pkpplk_code.clone()),
            SqlValue::Text(self.ibnr_code.clone()),
        ]
    }

    fn primary_key(&self) -> Vec<SqlValue> {
        vec![SqlValue::Text(self.id.clone())]
    }

    fn unmarshall(row: &[SqlValue]) -> Result<Self> {
        let mut r = RowReader::new(Self::NAME, row);
        let stop = Self {
            id: r.text("id")?,
            name: r.text("name")?,
            lat: r.real("lat")?,
            lon: r.real("lon")?,
            code: r.text("code")?,
            zone_id: r.text("zone_id")?,
            location_type: r.enum_field("location_type", LocationType::from_code)?,
            parent_station: r.text_or_empty("parent_station")?,
            wheelchair_boarding: r.nullable_boolean("wheelchair_boarding")?,
            platform_code: r.text("platform_code")?,
            pkpplk_code: r.text("pkpplk_code")?,
            ibnr_code: r.text("ibnr_code")?,
        };
        r.finish()?;
        Ok(stop)
    }
}

impl GtfsEntity for Stop {
    const GTFS_TABLE: &'static str = "stops";

    fn gtfs_marshall(&self) -> HashMap<String, String> {
        HashMap::from([
            ("stop_id".to_string(), self.id.clone()),
            ("stop_name".to_string(), self.name.clone()),
            ("stop_lat".to_string(), self.lat.to_string()),
            ("stop_lon".to_string(), self.lon.to_string()),
            ("stop_code".to_string(), self.code.clone()),
            ("zone_id".to_string(), self.zone_id.clone()),
            (
                "location_type".to_string(),
                self.location_type.code().to_string(),
            ),
            ("parent_station".to_string(), self.parent_station.clone()),
            (
                "wheelchair_boarding".to_string(),
                tri_state_to_gtfs(self.wheelchair_boarding),
            ),
            ("platform_code".to_string(), self.platform_code.clone()),
            ("stop_pkpplk".to_string(), self.pkpplk_code.clone()),
            ("stop_IBNR".to_string(), self.ibnr_code.clone()),
        ])
    }

    fn gtfs_unmarshall(row: &HashMap<String, String>) -> Result<Self> {
        let r = GtfsRow::new(Self::NAME, row);
        Ok(Self {
            id: r.required("stop_id")?.to_string(),
            name: r.required("stop_name")?.to_string(),
            lat: r.parse("stop_lat")?,
            lon: r.parse("stop_lon")?,
            code: r.optional("stop_code"),
            zone_id: r.optional("zone_id"),
            location_type: r.enum_field_or(
                "location_type",
                LocationType::from_code,
                LocationType::Stop,
            )?,
            parent_station: r.optional("parent_station"),
            wheelchair_boarding: r.tri_state("wheelchair_boarding")?,
            platform_code: r.optional("platform_code"),
            pkpplk_code: r.optional("stop_pkpplk"),
            ibnr_code: r.optional("stop_IBNR"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Stop {
        Stop {
            id: "wsrod".to_string(),
            name: "Warszawa Śródmieście WKD".to_string(),
            lat: 52.227687,
            lon: 21.000156,
            code: String::new(),
            zone_id: "1".to_string(),
            location_type: LocationType::Stop,
            parent_station: String::new(),
            wheelchair_boarding: Some(true),
            platform_code: String::new(),
            pkpplk_code: String::new(),
            ibnr_code: String::new(),
        }
    }

    #[test]
    fn sql_round_trip() {
        let stop = fixture();
        assert_eq!(Stop::unmarshall(&stop.marshall()).unwrap(), stop);
    }

    #[test]
    fn empty_parent_station_is_stored_as_null() {
        let stop = fixture();
        assert_eq!(stop.marshall()[7], SqlValue::Null);

        let child = Stop {
            parent_station: "wsrod".to_string(),
            ..fixture()
        };
        assert_eq!(
            child.marshall()[7],
            SqlValue::Text("wsrod".to_string())
        );
        assert_eq!(Stop::unmarshall(&child.marshall()).unwrap(), child);
    }

    #[test]
    fn gtfs_round_trip() {
        let stop = fixture();
        assert_eq!(Stop::gtfs_unmarshall(&stop.gtfs_marshall()).unwrap(), stop);
    }

    #[test]
    fn gtfs_unmarshall_applies_fallbacks() {
        let row = HashMap::from([
            ("stop_id".to_string(), "1".to_string()),
            ("stop_name".to_string(), "Foo".to_string()),
            ("stop_lat".to_string(), "52.1".to_string()),
            ("stop_lon".to_string(), "21.2".to_string()),
        ]);
        let stop = Stop::gtfs_unmarshall(&row).unwrap();
        assert_eq!(stop.location_type, LocationType::Stop);
        assert_eq!(stop.wheelchair_boarding, None);
        assert_eq!(stop.zone_id, "");
    }
}
