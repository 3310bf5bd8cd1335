use std::collections::HashMap;

use super::meta::{text_or_null, Entity, GtfsEntity, GtfsRow, RowReader, SqlValue};
use crate::error::Result;

/// Associates a [FareAttribute](super::FareAttribute) with routes and zones,
/// equivalent to GTFS's `fare_rules.txt` entries.
///
/// The GTFS table has no usable primary key, hence the surrogate integer id,
/// assigned by the database on insert. Optional references use the empty
/// string in memory and NULL in SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FareRule {
    pub id: i64,
    pub fare_id: String,
    pub route_id: String,
    pub origin_id: String,
    pub destination_id: String,
    pub contains_id: String,
}

impl Entity for FareRule {
    const NAME: &'static str = "FareRule";
    const TABLE: &'static str = "fare_rules";
    const CREATE_TABLE: &'static str = "CREATE TABLE fare_rules (
        fare_rule_id INTEGER PRIMARY KEY,
        fare_id TEXT NOT NULL REFERENCES fare_attributes(fare_id)
            ON DELETE CASCADE ON UPDATE CASCADE,
        route_id TEXT DEFAULT NULL REFERENCES routes(route_id)
            ON DELETE CASCADE ON UPDATE CASCADE,
        origin_id TEXT DEFAULT NULL,
        destination_id TEXT DEFAULT NULL,
        contains_id TEXT DEFAULT NULL
    ) STRICT;
    CREATE INDEX idx_fare_rules_fare_id ON fare_rules(fare_id);
    CREATE INDEX idx_fare_rules_route_id ON fare_rules(route_id);";
    const COLUMNS: &'static str = "(fare_id, route_id, origin_id, destination_id, contains_id)";
    const PLACEHOLDERS: &'static str = "(?, ?, ?, ?, ?)";
    const WHERE_PK: &'static str = "fare_rule_id = ?";
    const SET_COLS: &'static str =
        "fare_id = ?, route_id = ?, origin_id = ?, destination_id = ?, contains_id = ?";

    fn marshall(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.fare_id.clone()),
            text_or_null(&self.route_id),
            text_or_null(&self.origin_id),
            text_or_null(&self.destination_id),
            text_or_null(&self.contains_id),
        ]
    }

    fn primary_key(&self) -> Vec<SqlValue> {
        vec![SqlValue::Integer(self.id)]
    }

    fn unmarshall(row: &[SqlValue]) -> Result<Self> {
        let mut r = RowReader::new(Self::NAME, row);
        let rule = Self {
            id: r.integer("id")?,
            fare_id: r.text("fare_id")?,
            route_id: r.text_or_empty("route_id")?,
            origin_id: r.text_or_empty("origin_id")?,
            destination_id: r.text_or_empty("destination_id")?,
            contains_id: r.text_or_empty("contains_id")?,
        };
        r.finish()?;
        Ok(rule)
    }
}

impl GtfsEntity for FareRule {
    const GTFS_TABLE: &'static str = "fare_rules";

    fn gtfs_marshall(&self) -> HashMap<String, String> {
        HashMap::from([
            ("fare_id".to_string(), self.fare_id.clone()),
            ("route_id".to_string(), self.route_id.clone()),
            ("origin_id".to_string(), self.origin_id.clone()),
            ("destination_id".to_string(), self.destination_id.clone()),
            ("contains_id".to_string(), self.contains_id.clone()),
        ])
    }

    fn gtfs_unmarshall(row: &HashMap<String, String>) -> Result<Self> {
        let r = GtfsRow::new(Self::NAME, row);
        Ok(Self {
            id: 0,
            fare_id: r.required("fare_id")?.to_string(),
            route_id: r.optional("route_id"),
            origin_id: r.optional("origin_id"),
            destination_id: r.optional("destination_id"),
            contains_id: r.optional("contains_id"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> FareRule {
        FareRule {
            id: 1,
            fare_id: "F1".to_string(),
            route_id: "A1".to_string(),
            origin_id: String::new(),
            destination_id: String::new(),
            contains_id: String::new(),
        }
    }

    #[test]
    fn sql_round_trip_ignores_surrogate_id() {
        let rule = fixture();
        let mut row = vec![SqlValue::Integer(rule.id)];
        row.extend(rule.marshall());
        assert_eq!(FareRule::unmarshall(&row).unwrap(), rule);
    }

    #[test]
    fn empty_references_are_stored_as_null() {
        let values = fixture().marshall();
        assert_eq!(values[2], SqlValue::Null);
        assert_eq!(values[3], SqlValue::Null);
        assert_eq!(values[4], SqlValue::Null);
    }

    #[test]
    fn gtfs_round_trip() {
        let rule = FareRule { id: 0, ..fixture() };
        assert_eq!(
            FareRule::gtfs_unmarshall(&rule.gtfs_marshall()).unwrap(),
            rule
        );
    }
}
