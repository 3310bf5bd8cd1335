use std::collections::HashMap;

use super::meta::{Entity, GtfsEntity, GtfsRow, RowReader, SqlValue};
use crate::error::Result;

/// An operator of [Route](super::Route)s, equivalent to GTFS's `agency.txt` entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Agency {
    pub id: String,
    pub name: String,
    pub url: String,
    pub timezone: String,
    pub lang: String,
    pub phone: String,
    pub fare_url: String,
}

impl Entity for Agency {
    const NAME: &'static str = "Agency";
    const TABLE: &'static str = "agencies";
    const CREATE_TABLE: &'static str = "CREATE TABLE agencies (
        agency_id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        url TEXT NOT NULL,
        timezone TEXT NOT NULL,
        lang TEXT NOT NULL DEFAULT '',
        phone TEXT NOT NULL DEFAULT '',
        fare_url TEXT NOT NULL DEFAULT ''
    ) STRICT;";
    const COLUMNS: &'static str = "(agency_id, name, url, timezone, lang, phone, fare_url)";
    const PLACEHOLDERS: &'static str = "(?, ?, ?, ?, ?, ?, ?)";
    const WHERE_PK: &'static str = "agency_id = ?";
    const SET_COLS: &'static str =
        "agency_id = ?, name = ?, url = ?, timezone = ?, lang = ?, phone = ?, fare_url = ?";

    fn marshall(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.id.clone()),
            SqlValue::Text(self.name.clone()),
            SqlValue::Text(self.url.clone()),
            SqlValue::Text(self.timezone.clone()),
            SqlValue::Text(self.lang.clone()),
            SqlValue::Text(self.phone.clone()),
            SqlValue::Text(self.fare_url.clone()),
        ]
    }

    fn primary_key(&self) -> Vec<SqlValue> {
        vec![SqlValue::Text(self.id.clone())]
    }

    fn unmarshall(row: &[SqlValue]) -> Result<Self> {
        let mut r = RowReader::new(Self::NAME, row);
        let agency = Self {
            id: r.text("id")?,
            name: r.text("name")?,
            url: r.text("url")?,
            timezone: r.text("timezone")?,
            lang: r.text("lang")?,
            phone: r.text("phone")?,
            fare_url: r.text("fare_url")?,
        };
        r.finish()?;
        Ok(agency)
    }
}

impl GtfsEntity for Agency {
    const GTFS_TABLE: &'static str = "agency";

    fn gtfs_marshall(&self) -> HashMap<String, String> {
        HashMap::from([
            ("agency_id".to_string(), self.id.clone()),
            ("agency_name".to_string(), self.name.clone()),
            ("agency_url".to_string(), self.url.clone()),
            ("agency_timezone".to_string(), self.timezone.clone()),
            ("agency_lang".to_string(), self.lang.clone()),
            ("agency_phone".to_string(), self.phone.clone()),
            ("agency_fare_url".to_string(), self.fare_url.clone()),
        ])
    }

    fn gtfs_unmarshall(row: &HashMap<String, String>) -> Result<Self> {
        let r = GtfsRow::new(Self::NAME, row);
        Ok(Self {
            id: r.required("agency_id")?.to_string(),
            name: r.required("agency_name")?.to_string(),
            url: r.required("agency_url")?.to_string(),
            timezone: r.required("agency_timezone")?.to_string(),
            lang: r.optional("agency_lang"),
            phone: r.optional("agency_phone"),
            fare_url: r.optional("agency_fare_url"),
        })
    }
}
