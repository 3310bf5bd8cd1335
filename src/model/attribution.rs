use std::collections::HashMap;

use super::meta::{bool_to_gtfs, Entity, GtfsEntity, GtfsRow, RowReader, SqlValue};
use crate::error::Result;

/// Acknowledgment of an organization involved in producing the dataset,
/// equivalent to GTFS's `attributions.txt` entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attribution {
    pub id: String,
    pub organization_name: String,
    pub is_producer: bool,
    pub is_operator: bool,
    pub is_authority: bool,
    pub is_data_source: bool,
    pub url: String,
    pub email: String,
    pub phone: String,
}

impl Entity for Attribution {
    const NAME: &'static str = "Attribution";
    const TABLE: &'static str = "attributions";
    const CREATE_TABLE: &'static str = "CREATE TABLE attributions (
        attribution_id TEXT PRIMARY KEY,
        organization_name TEXT NOT NULL,
        is_producer INTEGER NOT NULL CHECK (is_producer IN (0, 1)),
        is_operator INTEGER NOT NULL CHECK (is_operator IN (0, 1)),
        is_authority INTEGER NOT NULL CHECK (is_authority IN (0, 1)),
        is_data_source INTEGER NOT NULL CHECK (is_data_source IN (0, 1)),
        url TEXT NOT NULL DEFAULT '',
        email TEXT NOT NULL DEFAULT '',
        phone TEXT NOT NULL DEFAULT ''
    ) STRICT;";
    const COLUMNS: &'static str = "(attribution_id, organization_name, is_producer, is_operator, \
         is_authority, is_data_source, url, email, phone)";
    const PLACEHOLDERS: &'static str = "(?, ?, ?, ?, ?, ?, ?, ?, ?)";
    const WHERE_PK: &'static str = "attribution_id = ?";
    const SET_COLS: &'static str = "attribution_id = ?, organization_name = ?, is_producer = ?, \
         is_operator = ?, is_authority = ?, is_data_source = ?, url = ?, email = ?, phone = ?";

    fn marshall(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.id.clone()),
            SqlValue::Text(self.organization_name.clone()),
            SqlValue::Integer(self.is_producer.into()),
            SqlValue::Integer(self.is_operator.into()),
            SqlValue::Integer(self.is_authority.into()),
            SqlValue::Integer(self.is_data_source.into()),
            SqlValue::Text(self.url.clone()),
            SqlValue::Text(self.email.clone()),
            SqlValue::Text(self.phone.clone()),
        ]
    }

    fn primary_key(&self) -> Vec<SqlValue> {
        vec![SqlValue::Text(self.id.clone())]
    }

    fn unmarshall(row: &[SqlValue]) -> Result<Self> {
        let mut r = RowReader::new(Self::NAME, row);
        let attribution = Self {
            id: r.text("id")?,
            organization_name: r.text("organization_name")?,
            is_producer: r.boolean("is_producer")?,
            is_operator: r.boolean("is_operator")?,
            is_authority: r.boolean("is_authority")?,
            is_data_source: r.boolean("is_data_source")?,
            url: r.text("url")?,
            email: r.text("email")?,
            phone: r.text("phone")?,
        };
        r.finish()?;
        Ok(attribution)
    }
}

impl GtfsEntity for Attribution {
    const GTFS_TABLE: &'static str = "attributions";

    fn gtfs_marshall(&self) -> HashMap<String, String> {
        HashMap::from([
            ("attribution_id".to_string(), self.id.clone()),
            (
                "organization_name".to_string(),
                self.organization_name.clone(),
            ),
            (
                "is_producer".to_string(),
                bool_to_gtfs(self.is_producer).to_string(),
            ),
            (
                "is_operator".to_string(),
                bool_to_gtfs(self.is_operator).to_string(),
            ),
            (
                "is_authority".to_string(),
                bool_to_gtfs(self.is_authority).to_string(),
            ),
            (
                "is_data_source".to_string(),
                bool_to_gtfs(self.is_data_source).to_string(),
            ),
            ("attribution_url".to_string(), self.url.clone()),
            ("attribution_email".to_string(), self.email.clone()),
            ("attribution_phone".to_string(), self.phone.clone()),
        ])
    }

    fn gtfs_unmarshall(row: &HashMap<String, String>) -> Result<Self> {
        let r = GtfsRow::new(Self::NAME, row);
        Ok(Self {
            id: r.required("attribution_id")?.to_string(),
            organization_name: r.required("organization_name")?.to_string(),
            is_producer: r.boolean("is_producer", false)?,
            is_operator: r.boolean("is_operator", false)?,
            is_authority: r.boolean("is_authority", false)?,
            is_data_source: r.boolean("is_data_source", false)?,
            url: r.optional("attribution_url"),
            email: r.optional("attribution_email"),
            phone: r.optional("attribution_phone"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Attribution {
        Attribution {
            id: "1".to_string(),
            organization_name: "Foo Data Works".to_string(),
            is_producer: true,
            is_operator: false,
            is_authority: false,
            is_data_source: true,
            url: "https://foo.example.com".to_string(),
            email: String::new(),
            phone: String::new(),
        }
    }

    #[test]
    fn sql_round_trip() {
        let attribution = fixture();
        assert_eq!(
            Attribution::unmarshall(&attribution.marshall()).unwrap(),
            attribution
        );
    }

    #[test]
    fn gtfs_round_trip() {
        let attribution = fixture();
        assert_eq!(
            Attribution::gtfs_unmarshall(&attribution.gtfs_marshall()).unwrap(),
            attribution
        );
    }
}
