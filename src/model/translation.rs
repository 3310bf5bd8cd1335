use std::collections::HashMap;

use super::meta::{Entity, GtfsEntity, GtfsRow, RowReader, SqlValue};
use crate::error::Result;

/// A translated value of a field in another table,
/// equivalent to GTFS's `translations.txt` entries.
///
/// A row is keyed either by record (`record_id`, optionally `record_sub_id`)
/// or by value (`field_value`), never both - the CHECK constraints enforce
/// the rule. For `stop_times` records, `record_id` is the trip_id and
/// `record_sub_id` is the stop_sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Translation {
    pub id: i64,
    pub table_name: String,
    pub field_name: String,
    pub language: String,
    pub translation: String,
    pub record_id: String,
    pub record_sub_id: String,
    pub field_value: String,
}

impl Entity for Translation {
    const NAME: &'static str = "Translation";
    const TABLE: &'static str = "translations";
    const CREATE_TABLE: &'static str = "CREATE TABLE translations (
        translation_id INTEGER PRIMARY KEY,
        table_name TEXT NOT NULL CHECK (table_name IN (
            'agency', 'stops', 'routes', 'trips', 'stop_times', 'feed_info', 'attributions'
        )),
        field_name TEXT NOT NULL,
        language TEXT NOT NULL,
        translation TEXT NOT NULL,
        record_id TEXT NOT NULL DEFAULT '',
        record_sub_id TEXT NOT NULL DEFAULT '',
        field_value TEXT NOT NULL DEFAULT '',
        UNIQUE (table_name, field_name, language, record_id, record_sub_id, field_value),
        CHECK (field_value = '' OR record_id = ''),
        CHECK (record_sub_id = '' OR record_id != '')
    ) STRICT;";
    const COLUMNS: &'static str = "(table_name, field_name, language, translation, record_id, \
         record_sub_id, field_value)";
    const PLACEHOLDERS: &'static str = "(?, ?, ?, ?, ?, ?, ?)";
    const WHERE_PK: &'static str = "translation_id = ?";
    const SET_COLS: &'static str = "table_name = ?, field_name = ?, language = ?, \
         translation = ?, record_id = ?, record_sub_id = ?, field_value = ?";

    fn marshall(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.table_name.clone()),
            SqlValue::Text(self.field_name.clone()),
            SqlValue::Text(self.language.clone()),
            SqlValue::Text(self.translation.clone()),
            SqlValue::Text(self.record_id.clone()),
            SqlValue::Text(self.record_sub_id.clone()),
            SqlValue::Text(self.field_value.clone()),
        ]
    }

    fn primary_key(&self) -> Vec<SqlValue> {
        vec![SqlValue::Integer(self.id)]
    }

    fn unmarshall(row: &[SqlValue]) -> Result<Self> {
        let mut r = RowReader::new(Self::NAME, row);
        let translation = Self {
            id: r.integer("id")?,
            table_name: r.text("table_name")?,
            field_name: r.text("field_name")?,
            language: r.text("language")?,
            translation: r.text("translation")?,
            record_id: r.text("record_id")?,
            record_sub_id: r.text("record_sub_id")?,
            field_value: r.text("field_value")?,
        };
        r.finish()?;
        Ok(translation)
    }
}

impl GtfsEntity for Translation {
    const GTFS_TABLE: &'static str = "translations";

    fn gtfs_marshall(&self) -> HashMap<String, String> {
        HashMap::from([
            ("table_name".to_string(), self.table_name.clone()),
            ("field_name".to_string(), self.field_name.clone()),
            ("language".to_string(), self.language.clone()),
            ("translation".to_string(), self.translation.clone()),
            ("record_id".to_string(), self.record_id.clone()),
            ("record_sub_id".to_string(), self.record_sub_id.clone()),
            ("field_value".to_string(), self.field_value.clone()),
        ])
    }

    fn gtfs_unmarshall(row: &HashMap<String, String>) -> Result<Self> {
        let r = GtfsRow::new(Self::NAME, row);
        Ok(Self {
            id: 0,
            table_name: r.required("table_name")?.to_string(),
            field_name: r.required("field_name")?.to_string(),
            language: r.required("language")?.to_string(),
            translation: r.required("translation")?.to_string(),
            record_id: r.optional("record_id"),
            record_sub_id: r.optional("record_sub_id"),
            field_value: r.optional("field_value"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Translation {
        Translation {
            id: 3,
            table_name: "stops".to_string(),
            field_name: "stop_name".to_string(),
            language: "en".to_string(),
            translation: "Warsaw Central".to_string(),
            record_id: "wsrod".to_string(),
            record_sub_id: String::new(),
            field_value: String::new(),
        }
    }

    #[test]
    fn sql_round_trip_ignores_surrogate_id() {
        let translation = fixture();
        let mut row = vec![SqlValue::Integer(translation.id)];
        row.extend(translation.marshall());
        assert_eq!(Translation::unmarshall(&row).unwrap(), translation);
    }

    #[test]
    fn gtfs_round_trip() {
        let translation = Translation { id: 0, ..fixture() };
        assert_eq!(
            Translation::gtfs_unmarshall(&translation.gtfs_marshall()).unwrap(),
            translation
        );
    }
}
