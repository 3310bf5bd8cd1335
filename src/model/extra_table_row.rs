use super::meta::{Entity, RowReader, SqlValue};
use crate::error::Result;

/// A row of a table outside of the data model, carried round-trip so that
/// unknown tables and columns survive processing.
///
/// `fields_json` holds a JSON object mapping column names to values.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraTableRow {
    pub id: i64,
    pub table_name: String,
    pub fields_json: String,
    pub row_sort_order: Option<i64>,
}

impl ExtraTableRow {
    pub fn new(table_name: &str, fields_json: &str) -> Self {
        Self {
            id: 0,
            table_name: table_name.to_string(),
            fields_json: fields_json.to_string(),
            row_sort_order: None,
        }
    }

    /// Decodes `fields_json` into a column name to value mapping.
    pub fn fields(&self) -> Result<std::collections::HashMap<String, String>> {
        Ok(serde_json::from_str(&self.fields_json)?)
    }
}

impl Entity for ExtraTableRow {
    const NAME: &'static str = "ExtraTableRow";
    const TABLE: &'static str = "extra_table_rows";
    const CREATE_TABLE: &'static str = "CREATE TABLE extra_table_rows (
        extra_table_row_id INTEGER PRIMARY KEY,
        table_name TEXT NOT NULL,
        fields_json TEXT NOT NULL DEFAULT '{}',
        row_sort_order INTEGER
    ) STRICT;
    CREATE INDEX idx_extra_table_rows_table_name ON extra_table_rows(table_name);";
    const COLUMNS: &'static str = "(table_name, fields_json, row_sort_order)";
    const PLACEHOLDERS: &'static str = "(?, ?, ?)";
    const WHERE_PK: &'static str = "extra_table_row_id = ?";
    const SET_COLS: &'static str = "table_name = ?, fields_json = ?, row_sort_order = ?";

    fn marshall(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.table_name.clone()),
            SqlValue::Text(self.fields_json.clone()),
            self.row_sort_order.map_or(SqlValue::Null, SqlValue::Integer),
        ]
    }

    fn primary_key(&self) -> Vec<SqlValue> {
        vec![SqlValue::Integer(self.id)]
    }

    fn unmarshall(row: &[SqlValue]) -> Result<Self> {
        let mut r = RowReader::new(Self::NAME, row);
        let extra = Self {
            id: r.integer("id")?,
            table_name: r.text("table_name")?,
            fields_json: r.text("fields_json")?,
            row_sort_order: r.nullable_integer("row_sort_order")?,
        };
        r.finish()?;
        Ok(extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_round_trip_ignores_surrogate_id() {
        let extra = ExtraTableRow {
            id: 42,
            table_name: "levels".to_string(),
            fields_json: r#"{"level_id":"L1","level_index":"0"}"#.to_string(),
            row_sort_order: Some(2),
        };
        let mut row = vec![SqlValue::Integer(extra.id)];
        row.extend(extra.marshall());
        assert_eq!(ExtraTableRow::unmarshall(&row).unwrap(), extra);
    }

    #[test]
    fn fields_decodes_the_json_object() {
        let extra = ExtraTableRow::new("levels", r#"{"level_id":"L1"}"#);
        let fields = extra.fields().unwrap();
        assert_eq!(fields["level_id"], "L1");
    }
}
