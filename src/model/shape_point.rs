use std::collections::HashMap;

use super::meta::{Entity, GtfsEntity, GtfsRow, RowReader, SqlValue};
use crate::error::Result;

/// A single vertex of the polyline a [Trip](super::Trip) travels along,
/// equivalent to GTFS's `shapes.txt` entries.
///
/// The parent `shapes` table exists solely to hold the foreign key target
/// for `shape_id` and is created alongside `shape_points`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapePoint {
    pub shape_id: String,
    pub sequence: i64,
    pub lat: f64,
    pub lon: f64,
    pub shape_dist_traveled: Option<f64>,
}

impl Entity for ShapePoint {
    const NAME: &'static str = "ShapePoint";
    const TABLE: &'static str = "shape_points";
    const CREATE_TABLE: &'static str = "CREATE TABLE shapes (shape_id TEXT PRIMARY KEY) STRICT;
    CREATE TABLE shape_points (
        shape_id TEXT NOT NULL REFERENCES shapes(shape_id) ON DELETE CASCADE ON UPDATE CASCADE,
        sequence INTEGER NOT NULL CHECK (sequence >= 0),
        lat REAL NOT NULL,
        lon REAL NOT NULL,
        shape_dist_traveled REAL DEFAULT NULL,
        PRIMARY KEY (shape_id, sequence)
    ) STRICT;";
    const COLUMNS: &'static str = "(shape_id, sequence, lat, lon, shape_dist_traveled)";
    const PLACEHOLDERS: &'static str = "(?, ?, ?, ?, ?)";
    const WHERE_PK: &'static str = "shape_id = ? AND sequence = ?";
    const SET_COLS: &'static str =
        "shape_id = ?, sequence = ?, lat = ?, lon = ?, shape_dist_traveled = ?";

    fn marshall(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.shape_id.clone()),
            SqlValue::Integer(self.sequence),
            SqlValue::Real(self.lat),
            SqlValue::Real(self.lon),
            self.shape_dist_traveled.map_or(SqlValue::Null, SqlValue::Real),
        ]
    }

    fn primary_key(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.shape_id.clone()),
            SqlValue::Integer(self.sequence),
        ]
    }

    fn unmarshall(row: &[SqlValue]) -> Result<Self> {
        let mut r = RowReader::new(Self::NAME, row);
        let point = Self {
            shape_id: r.text("shape_id")?,
            sequence: r.integer("sequence")?,
            lat: r.real("lat")?,
            lon: r.real("lon")?,
            shape_dist_traveled: r.nullable_real("shape_dist_traveled")?,
        };
        r.finish()?;
        Ok(point)
    }
}

impl GtfsEntity for ShapePoint {
    const GTFS_TABLE: &'static str = "shapes";

    fn gtfs_marshall(&self) -> HashMap<String, String> {
        HashMap::from([
            ("shape_id".to_string(), self.shape_id.clone()),
            ("shape_pt_sequence".to_string(), self.sequence.to_string()),
            ("shape_pt_lat".to_string(), self.lat.to_string()),
            ("shape_pt_lon".to_string(), self.lon.to_string()),
            (
                "shape_dist_traveled".to_string(),
                self.shape_dist_traveled
                    .map(|x| x.to_string())
                    .unwrap_or_default(),
            ),
        ])
    }

    fn gtfs_unmarshall(row: &HashMap<String, String>) -> Result<Self> {
        let r = GtfsRow::new(Self::NAME, row);
        Ok(Self {
            shape_id: r.required("shape_id")?.to_string(),
            sequence: r.parse("shape_pt_sequence")?,
            lat: r.parse("shape_pt_lat")?,
            lon: r.parse("shape_pt_lon")?,
            shape_dist_traveled: r.parse_optional("shape_dist_traveled")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> ShapePoint {
        ShapePoint {
            shape_id: "S1".to_string(),
            sequence: 3,
            lat: 52.2,
            lon: 21.0,
            shape_dist_traveled: Some(120.5),
        }
    }

    #[test]
    fn sql_round_trip() {
        let point = fixture();
        assert_eq!(ShapePoint::unmarshall(&point.marshall()).unwrap(), point);
    }

    #[test]
    fn gtfs_round_trip() {
        let point = fixture();
        assert_eq!(
            ShapePoint::gtfs_unmarshall(&point.gtfs_marshall()).unwrap(),
            point
        );
    }
}
