use std::collections::HashMap;

use super::meta::{text_or_null, Entity, GtfsEntity, GtfsRow, RowReader, SqlValue};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransferType {
    #[default]
    Recommended = 0,
    Timed = 1,
    MinTimeRequired = 2,
    Impossible = 3,
    InSeat = 4,
    ReBoard = 5,
}

impl TransferType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Recommended),
            1 => Some(Self::Timed),
            2 => Some(Self::MinTimeRequired),
            3 => Some(Self::Impossible),
            4 => Some(Self::InSeat),
            5 => Some(Self::ReBoard),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

/// A special rule for transferring between vehicles,
/// equivalent to GTFS's `transfers.txt` entries.
///
/// Stop-to-stop transfers (types 0-3) require both stop ids; in-seat
/// transfers (types 4-5) require both trip ids. The CHECK constraints
/// enforce this at the SQL level. The GTFS primary key clause contains
/// optional columns and is incompatible with SQL, hence the surrogate id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transfer {
    pub id: i64,
    pub from_stop_id: String,
    pub to_stop_id: String,
    pub from_route_id: String,
    pub to_route_id: String,
    pub from_trip_id: String,
    pub to_trip_id: String,
    pub type_: TransferType,
    pub min_transfer_time: Option<i64>,
}

impl Entity for Transfer {
    const NAME: &'static str = "Transfer";
    const TABLE: &'static str = "transfers";
    const CREATE_TABLE: &'static str = "CREATE TABLE transfers (
        transfer_id INTEGER PRIMARY KEY,
        from_stop_id TEXT DEFAULT NULL REFERENCES stops(stop_id)
            ON DELETE CASCADE ON UPDATE CASCADE
            CHECK (from_stop_id IS NOT NULL OR transfer_type IN (4, 5)),
        to_stop_id TEXT DEFAULT NULL REFERENCES stops(stop_id)
            ON DELETE CASCADE ON UPDATE CASCADE
            CHECK (to_stop_id IS NOT NULL OR transfer_type IN (4, 5)),
        from_route_id TEXT DEFAULT NULL REFERENCES routes(route_id)
            ON DELETE CASCADE ON UPDATE CASCADE,
        to_route_id TEXT DEFAULT NULL REFERENCES routes(route_id)
            ON DELETE CASCADE ON UPDATE CASCADE,
        from_trip_id TEXT DEFAULT NULL REFERENCES trips(trip_id)
            ON DELETE CASCADE ON UPDATE CASCADE
            CHECK (from_trip_id IS NOT NULL OR transfer_type IN (0, 1, 2, 3)),
        to_trip_id TEXT DEFAULT NULL REFERENCES trips(trip_id)
            ON DELETE CASCADE ON UPDATE CASCADE
            CHECK (to_trip_id IS NOT NULL OR transfer_type IN (0, 1, 2, 3)),
        transfer_type INTEGER NOT NULL DEFAULT 0 CHECK (transfer_type IN (0, 1, 2, 3, 4, 5)),
        min_transfer_time INTEGER DEFAULT NULL CHECK (min_transfer_time > 0)
    ) STRICT;
    CREATE INDEX idx_transfers_from_stop_id ON transfers(from_stop_id);
    CREATE INDEX idx_transfers_to_stop_id ON transfers(to_stop_id);
    CREATE INDEX idx_transfers_from_route_id ON transfers(from_route_id);
    CREATE INDEX idx_transfers_to_route_id ON transfers(to_route_id);
    CREATE INDEX idx_transfers_from_trip_id ON transfers(from_trip_id);
    CREATE INDEX idx_transfers_to_trip_id ON transfers(to_trip_id);";
    const COLUMNS: &'static str = "(from_stop_id, to_stop_id, from_route_id, to_route_id, \
         from_trip_id, to_trip_id, transfer_type, min_transfer_time)";
    const PLACEHOLDERS: &'static str = "(?, ?, ?, ?, ?, ?, ?, ?)";
    const WHERE_PK: &'static str = "transfer_id = ?";
    const SET_COLS: &'static str = "from_stop_id = ?, to_stop_id = ?, from_route_id = ?, \
         to_route_id = ?, from_trip_id = ?, to_trip_id = ?, transfer_type = ?, \
         min_transfer_time = ?";

    fn marshall(&self) -> Vec<SqlValue> {
        vec![
            text_or_null(&self.from_stop_id),
            text_or_null(&self.to_stop_id),
            text_or_null(&self.from_route_id),
            text_or_null(&self.to_route_id),
            text_or_null(&self.from_trip_id),
            text_or_null(&self.to_trip_id),
            SqlValue::Integer(self.type_.code()),
            self.min_transfer_time
                .map_or(SqlValue::Null, SqlValue::Integer),
        ]
    }

    fn primary_key(&self) -> Vec<SqlValue> {
        vec![SqlValue::Integer(self.id)]
    }

    fn unmarshall(row: &[SqlValue]) -> Result<Self> {
        let mut r = RowReader::new(Self::NAME, row);
        let transfer = Self {
            id: r.integer("id")?,
            from_stop_id: r.text_or_empty("from_stop_id")?,
            to_stop_id: r.text_or_empty("to_stop_id")?,
            from_route_id: r.text_or_empty("from_route_id")?,
            to_route_id: r.text_or_empty("to_route_id")?,
            from_trip_id: r.text_or_empty("from_trip_id")?,
            to_trip_id: r.text_or_empty("to_trip_id")?,
            type_: r.enum_field("type", TransferType::from_code)?,
            min_transfer_time: r.nullable_integer("min_transfer_time")?,
        };
        r.finish()?;
        Ok(transfer)
    }
}

impl GtfsEntity for Transfer {
    const GTFS_TABLE: &'static str = "transfers";

    fn gtfs_marshall(&self) -> HashMap<String, String> {
        HashMap::from([
            ("from_stop_id".to_string(), self.from_stop_id.clone()),
            ("to_stop_id".to_string(), self.to_stop_id.clone()),
            ("from_route_id".to_string(), self.from_route_id.clone()),
            ("to_route_id".to_string(), self.to_route_id.clone()),
            ("from_trip_id".to_string(), self.from_trip_id.clone()),
            ("to_trip_id".to_string(), self.to_trip_id.clone()),
            ("transfer_type".to_string(), self.type_.code().to_string()),
            (
                "min_transfer_time".to_string(),
                self.min_transfer_time
                    .map(|x| x.to_string())
                    .unwrap_or_default(),
            ),
        ])
    }

    fn gtfs_unmarshall(row: &HashMap<String, String>) -> Result<Self> {
        let r = GtfsRow::new(Self::NAME, row);
        Ok(Self {
            id: 0,
            from_stop_id: r.optional("from_stop_id"),
            to_stop_id: r.optional("to_stop_id"),
            from_route_id: r.optional("from_route_id"),
            to_route_id: r.optional("to_route_id"),
            from_trip_id: r.optional("from_trip_id"),
            to_trip_id: r.optional("to_trip_id"),
            type_: r.enum_field_or(
                "transfer_type",
                TransferType::from_code,
                TransferType::Recommended,
            )?,
            min_transfer_time: r.parse_optional("min_transfer_time")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Transfer {
        Transfer {
            id: 7,
            from_stop_id: "wsrod".to_string(),
            to_stop_id: "wocho".to_string(),
            type_: TransferType::MinTimeRequired,
            min_transfer_time: Some(180),
            ..Transfer::default()
        }
    }

    #[test]
    fn sql_round_trip_ignores_surrogate_id() {
        let transfer = fixture();
        let mut row = vec![SqlValue::Integer(transfer.id)];
        row.extend(transfer.marshall());
        assert_eq!(Transfer::unmarshall(&row).unwrap(), transfer);
    }

    #[test]
    fn gtfs_round_trip() {
        let transfer = Transfer { id: 0, ..fixture() };
        assert_eq!(
            Transfer::gtfs_unmarshall(&transfer.gtfs_marshall()).unwrap(),
            transfer
        );
    }
}
