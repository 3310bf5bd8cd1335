use std::collections::HashMap;

use super::meta::{Entity, GtfsEntity, GtfsRow, RowReader, SqlValue};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PaymentMethod {
    #[default]
    OnBoard = 0,
    BeforeBoarding = 1,
}

impl PaymentMethod {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::OnBoard),
            1 => Some(Self::BeforeBoarding),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

/// How many transfers a fare permits; absence means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferLimit {
    NoTransfers = 0,
    One = 1,
    Two = 2,
}

impl TransferLimit {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::NoTransfers),
            1 => Some(Self::One),
            2 => Some(Self::Two),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

/// A class of fares, equivalent to GTFS's `fare_attributes.txt` entries.
#[derive(Debug, Clone, PartialEq)]
pub struct FareAttribute {
    pub id: String,
    pub price: f64,
    pub currency_type: String,
    pub payment_method: PaymentMethod,
    pub transfers: Option<TransferLimit>,
    pub agency_id: String,
    pub transfer_duration: Option<i64>,
}

impl Entity for FareAttribute {
    const NAME: &'static str = "FareAttribute";
    const TABLE: &'static str = "fare_attributes";
    const CREATE_TABLE: &'static str = "CREATE TABLE fare_attributes (
        fare_id TEXT PRIMARY KEY,
        price REAL NOT NULL CHECK (price >= 0.0),
        currency_type TEXT NOT NULL CHECK (currency_type LIKE '___'),
        payment_method INTEGER NOT NULL CHECK (payment_method IN (0, 1)),
        transfers INTEGER DEFAULT NULL CHECK (transfers IN (0, 1, 2)),
        agency_id TEXT NOT NULL REFERENCES agencies(agency_id)
            ON DELETE CASCADE ON UPDATE CASCADE,
        transfer_duration INTEGER DEFAULT NULL CHECK (transfer_duration > 0)
    ) STRICT;
    CREATE INDEX idx_fare_attributes_agency_id ON fare_attributes(agency_id);";
    const COLUMNS: &'static str = "(fare_id, price, currency_type, payment_method, transfers, \
         agency_id, transfer_duration)";
    const PLACEHOLDERS: &'static str = "(?, ?, ?, ?, ?, ?, ?)";
    const WHERE_PK: &'static str = "fare_id = ?";
    const SET_COLS: &'static str = "fare_id = ?, price = ?, currency_type = ?, \
         payment_method = ?, transfers = ?, agency_id = ?, transfer_duration = ?";

    fn marshall(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.id.clone()),
            SqlValue::Real(self.price),
            SqlValue::Text(self.currency_type.clone()),
            SqlValue::Integer(self.payment_method.code()),
            self.transfers
                .map_or(SqlValue::Null, |x| SqlValue::Integer(x.code())),
            SqlValue::Text(self.agency_id.clone()),
            self.transfer_duration
                .map_or(SqlValue::Null, SqlValue::Integer),
        ]
    }

    fn primary_key(&self) -> Vec<SqlValue> {
        vec![SqlValue::Text(self.id.clone())]
    }

    fn unmarshall(row: &[SqlValue]) -> Result<Self> {
        let mut r = RowReader::new(Self::NAME, row);
        let fare = Self {
            id: r.text("id")?,
            price: r.real("price")?,
            currency_type: r.text("currency_type")?,
            payment_method: r.enum_field("payment_method", PaymentMethod::from_code)?,
            transfers: r.nullable_enum_field("transfers", TransferLimit::from_code)?,
            agency_id: r.text("agency_id")?,
            transfer_duration: r.nullable_integer("transfer_duration")?,
        };
        r.finish()?;
        Ok(fare)
    }
}

impl GtfsEntity for FareAttribute {
    const GTFS_TABLE: &'static str = "fare_attributes";

    fn gtfs_marshall(&self) -> HashMap<String, String> {
        HashMap::from([
            ("fare_id".to_string(), self.id.clone()),
            ("price".to_string(), self.price.to_string()),
            ("currency_type".to_string(), self.currency_type.clone()),
            (
                "payment_method".to_string(),
                self.payment_method.code().to_string(),
            ),
            (
                "transfers".to_string(),
                self.transfers
                    .map(|x| x.code().to_string())
                    .unwrap_or_default(),
            ),
            ("agency_id".to_string(), self.agency_id.clone()),
            (
                "transfer_duration".to_string(),
                self.transfer_duration
                    .map(|x| x.to_string())
                    .unwrap_or_default(),
            ),
        ])
    }

    fn gtfs_unmarshall(row: &HashMap<String, String>) -> Result<Self> {
        let r = GtfsRow::new(Self::NAME, row);
        Ok(Self {
            id: r.required("fare_id")?.to_string(),
            price: r.parse("price")?,
            currency_type: r.required("currency_type")?.to_string(),
            payment_method: r.enum_field("payment_method", PaymentMethod::from_code)?,
            transfers: r.optional_enum_field("transfers", TransferLimit::from_code)?,
            agency_id: r.required("agency_id")?.to_string(),
            transfer_duration: r.parse_optional("transfer_duration")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> FareAttribute {
        FareAttribute {
            id: "F1".to_string(),
            price: 4.40,
            currency_type: "PLN".to_string(),
            payment_method: PaymentMethod::OnBoard,
            transfers: None,
            agency_id: "0".to_string(),
            transfer_duration: None,
        }
    }

    #[test]
    fn sql_round_trip() {
        let fare = fixture();
        assert_eq!(FareAttribute::unmarshall(&fare.marshall()).unwrap(), fare);
    }

    #[test]
    fn sql_round_trip_with_transfers() {
        let fare = FareAttribute {
            transfers: Some(TransferLimit::Two),
            transfer_duration: Some(3600),
            ..fixture()
        };
        assert_eq!(FareAttribute::unmarshall(&fare.marshall()).unwrap(), fare);
    }

    #[test]
    fn gtfs_round_trip() {
        let fare = fixture();
        assert_eq!(
            FareAttribute::gtfs_unmarshall(&fare.gtfs_marshall()).unwrap(),
            fare
        );
    }
}
