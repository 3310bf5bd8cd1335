use std::collections::HashMap;

use super::meta::{Entity, GtfsEntity, GtfsRow, RowReader, SqlValue};
use crate::error::Result;

/// Metadata about the dataset itself, equivalent to GTFS's `feed_info.txt`.
///
/// The table holds at most one row, with the constant id `"0"`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedInfo {
    pub id: String,
    pub publisher_name: String,
    pub publisher_url: String,
    pub lang: String,
    pub version: String,
    pub contact_email: String,
    pub contact_url: String,
}

impl Default for FeedInfo {
    fn default() -> Self {
        Self {
            id: "0".to_string(),
            publisher_name: String::new(),
            publisher_url: String::new(),
            lang: String::new(),
            version: String::new(),
            contact_email: String::new(),
            contact_url: String::new(),
        }
    }
}

impl Entity for FeedInfo {
    const NAME: &'static str = "FeedInfo";
    const TABLE: &'static str = "feed_info";
    const CREATE_TABLE: &'static str = "CREATE TABLE feed_info (
        feed_info_id TEXT PRIMARY KEY CHECK (feed_info_id = '0'),
        publisher_name TEXT NOT NULL,
        publisher_url TEXT NOT NULL,
        lang TEXT NOT NULL,
        version TEXT NOT NULL DEFAULT '',
        contact_email TEXT NOT NULL DEFAULT '',
        contact_url TEXT NOT NULL DEFAULT ''
    ) STRICT;";
    const COLUMNS: &'static str = "(feed_info_id, publisher_name, publisher_url, lang, version, \
         contact_email, contact_url)";
    const PLACEHOLDERS: &'static str = "(?, ?, ?, ?, ?, ?, ?)";
    const WHERE_PK: &'static str = "feed_info_id = ?";
    const SET_COLS: &'static str = "feed_info_id = ?, publisher_name = ?, publisher_url = ?, \
         lang = ?, version = ?, contact_email = ?, contact_url = ?";

    fn marshall(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.id.clone()),
            SqlValue::Text(self.publisher_name.clone()),
            SqlValue::Text(self.publisher_url.clone()),
            SqlValue::Text(self.lang.clone()),
            SqlValue::Text(self.version.clone()),
            SqlValue::Text(self.contact_email.clone()),
            SqlValue::Text(self.contact_url.clone()),
        ]
    }

    fn primary_key(&self) -> Vec<SqlValue> {
        vec![SqlValue::Text(self.id.clone())]
    }

    fn unmarshall(row: &[SqlValue]) -> Result<Self> {
        let mut r = RowReader::new(Self::NAME, row);
        let feed_info = Self {
            id: r.text("id")?,
            publisher_name: r.text("publisher_name")?,
            publisher_url: r.text("publisher_url")?,
            lang: r.text("lang")?,
            version: r.text("version")?,
            contact_email: r.text("contact_email")?,
            contact_url: r.text("contact_url")?,
        };
        r.finish()?;
        Ok(feed_info)
    }
}

impl GtfsEntity for FeedInfo {
    const GTFS_TABLE: &'static str = "feed_info";

    fn gtfs_marshall(&self) -> HashMap<String, String> {
        HashMap::from([
            (
                "feed_publisher_name".to_string(),
                self.publisher_name.clone(),
            ),
            ("feed_publisher_url".to_string(), self.publisher_url.clone()),
            ("feed_lang".to_string(), self.lang.clone()),
            ("feed_version".to_string(), self.version.clone()),
            ("feed_contact_email".to_string(), self.contact_email.clone()),
            ("feed_contact_url".to_string(), self.contact_url.clone()),
        ])
    }

    fn gtfs_unmarshall(row: &HashMap<String, String>) -> Result<Self> {
        let r = GtfsRow::new(Self::NAME, row);
        Ok(Self {
            id: "0".to_string(),
            publisher_name: r.required("feed_publisher_name")?.to_string(),
            publisher_url: r.required("feed_publisher_url")?.to_string(),
            lang: r.required("feed_lang")?.to_string(),
            version: r.optional("feed_version"),
            contact_email: r.optional("feed_contact_email"),
            contact_url: r.optional("feed_contact_url"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> FeedInfo {
        FeedInfo {
            id: "0".to_string(),
            publisher_name: "Foo Transit".to_string(),
            publisher_url: "https://foo.example.com".to_string(),
            lang: "pl".to_string(),
            version: "2020-05-01".to_string(),
            contact_email: String::new(),
            contact_url: String::new(),
        }
    }

    #[test]
    fn sql_round_trip() {
        let feed_info = fixture();
        assert_eq!(
            FeedInfo::unmarshall(&feed_info.marshall()).unwrap(),
            feed_info
        );
    }

    #[test]
    fn gtfs_round_trip() {
        let feed_info = fixture();
        assert_eq!(
            FeedInfo::gtfs_unmarshall(&feed_info.gtfs_marshall()).unwrap(),
            feed_info
        );
    }
}
