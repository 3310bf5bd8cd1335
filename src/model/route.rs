use std::collections::HashMap;

use super::meta::{Entity, GtfsEntity, GtfsRow, RowReader, SqlValue};
use crate::error::Result;

/// The mode of transport serving a [Route].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteType {
    Tram = 0,
    Metro = 1,
    Rail = 2,
    Bus = 3,
    Ferry = 4,
    CableTram = 5,
    Gondola = 6,
    Funicular = 7,
    Trolleybus = 11,
    Monorail = 12,
}

impl RouteType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Tram),
            1 => Some(Self::Metro),
            2 => Some(Self::Rail),
            3 => Some(Self::Bus),
            4 => Some(Self::Ferry),
            5 => Some(Self::CableTram),
            6 => Some(Self::Gondola),
            7 => Some(Self::Funicular),
            11 => Some(Self::Trolleybus),
            12 => Some(Self::Monorail),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

/// A line of service shown to passengers, equivalent to GTFS's `routes.txt` entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: String,
    pub agency_id: String,
    pub short_name: String,
    pub long_name: String,
    pub type_: RouteType,
    pub color: String,
    pub text_color: String,
    pub sort_order: Option<i64>,
}

impl Entity for Route {
    const NAME: &'static str = "Route";
    const TABLE: &'static str = "routes";
    const CREATE_TABLE: &'static str = "CREATE TABLE routes (
        route_id TEXT PRIMARY KEY,
        agency_id TEXT NOT NULL REFERENCES agencies(agency_id)
            ON DELETE CASCADE ON UPDATE CASCADE,
        short_name TEXT NOT NULL,
        long_name TEXT NOT NULL,
        type INTEGER NOT NULL CHECK (type IN (0, 1, 2, 3, 4, 5, 6, 7, 11, 12)),
        color TEXT NOT NULL DEFAULT '',
        text_color TEXT NOT NULL DEFAULT '',
        sort_order INTEGER
    ) STRICT;
    CREATE INDEX idx_routes_agency_id ON routes(agency_id);";
    const COLUMNS: &'static str =
        "(route_id, agency_id, short_name, long_name, type, color, text_color, sort_order)";
    const PLACEHOLDERS: &'static str = "(?, ?, ?, ?, ?, ?, ?, ?)";
    const WHERE_PK: &'static str = "route_id = ?";
    const SET_COLS: &'static str = "route_id = ?, agency_id = ?, short_name = ?, long_name = ?, \
         type = ?, color = ?, text_color = ?, sort_order = ?";

    fn marshall(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.id.clone()),
            SqlValue::Text(self.agency_id.clone()),
            SqlValue::Text(self.short_name.clone()),
            SqlValue::Text(self.long_name.clone()),
            SqlValue::Integer(self.type_.code()),
            SqlValue::Text(self.color.clone()),
            SqlValue::Text(self.text_color.clone()),
            self.sort_order.map_or(SqlValue::Null, SqlValue::Integer),
        ]
    }

    fn primary_key(&self) -> Vec<SqlValue> {
        vec![SqlValue::Text(self.id.clone())]
    }

    fn unmarshall(row: &[SqlValue]) -> Result<Self> {
        let mut r = RowReader::new(Self::NAME, row);
        let route = Self {
            id: r.text("id")?,
            agency_id: r.text("agency_id")?,
            short_name: r.text("short_name")?,
            long_name: r.text("long_name")?,
            type_: r.enum_field("type", RouteType::from_code)?,
            color: r.text("color")?,
            text_color: r.text("text_color")?,
            sort_order: r.nullable_integer("sort_order")?,
        };
        r.finish()?;
        Ok(route)
    }
}

impl GtfsEntity for Route {
    const GTFS_TABLE: &'static str = "routes";

    fn gtfs_marshall(&self) -> HashMap<String, String> {
        HashMap::from([
            ("route_id".to_string(), self.id.clone()),
            ("agency_id".to_string(), self.agency_id.clone()),
            ("route_short_name".to_string(), self.short_name.clone()),
            ("route_long_name".to_string(), self.long_name.clone()),
            ("route_type".to_string(), self.type_.code().to_string()),
            ("route_color".to_string(), self.color.clone()),
            ("route_text_color".to_string(), self.text_color.clone()),
            (
                "route_sort_order".to_string(),
                self.sort_order.map(|x| x.to_string()).unwrap_or_default(),
            ),
        ])
    }

    fn gtfs_unmarshall(row: &HashMap<String, String>) -> Result<Self> {
        let r = GtfsRow::new(Self::NAME, row);
        Ok(Self {
            id: r.required("route_id")?.to_string(),
            agency_id: r.required("agency_id")?.to_string(),
            short_name: r.optional("route_short_name"),
            long_name: r.optional("route_long_name"),
            type_: r.enum_field("route_type", RouteType::from_code)?,
            color: r.optional("route_color"),
            text_color: r.optional("route_text_color"),
            sort_order: r.parse_optional("route_sort_order")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Route {
        Route {
            id: "A1".to_string(),
            agency_id: "0".to_string(),
            short_name: "A1".to_string(),
            long_name: "Downtown - Airport".to_string(),
            type_: RouteType::Rail,
            color: "AA0000".to_string(),
            text_color: "FFFFFF".to_string(),
            sort_order: None,
        }
    }

    #[test]
    fn sql_round_trip() {
        let route = fixture();
        assert_eq!(Route::unmarshall(&route.marshall()).unwrap(), route);
    }

    #[test]
    fn sql_unmarshall_rejects_unknown_type() {
        let mut row = fixture().marshall();
        row[4] = SqlValue::Integer(8);
        let err = Route::unmarshall(&row).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for Route.type: 8"
        );
    }

    #[test]
    fn gtfs_round_trip() {
        let route = fixture();
        assert_eq!(
            Route::gtfs_unmarshall(&route.gtfs_marshall()).unwrap(),
            route
        );
    }

    #[test]
    fn gtfs_round_trip_with_sort_order() {
        let route = Route {
            sort_order: Some(12),
            ..fixture()
        };
        assert_eq!(
            Route::gtfs_unmarshall(&route.gtfs_marshall()).unwrap(),
            route
        );
    }
}
