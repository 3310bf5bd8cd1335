//! Contracts shared by every entity of the data model, plus the helpers
//! used to implement their SQL and GTFS codecs.

use std::collections::HashMap;

use chrono::NaiveDate;

use super::types::{parse_sql_date, TimePoint};
use crate::error::{Error, Result};

/// The native value type exchanged with the SQL engine.
pub type SqlValue = rusqlite::types::Value;

/// An entity of the transit data model, storable in a [Database](crate::db::Database).
///
/// The constants describe the SQL schema of the entity; [Entity::marshall] and
/// [Entity::unmarshall] are exact inverses converting between an instance and
/// the ordered tuple of SQL primitives matching [Entity::COLUMNS].
pub trait Entity: Sized {
    /// Entity name used in error messages, e.g. `"Agency"`.
    const NAME: &'static str;

    /// SQL table name.
    const TABLE: &'static str;

    /// DDL creating the table, its constraints and its indexes.
    const CREATE_TABLE: &'static str;

    /// Parenthesised column list for INSERT statements. Excludes
    /// automatically-assigned surrogate keys.
    const COLUMNS: &'static str;

    /// Parenthesised `?` list matching [Entity::COLUMNS].
    const PLACEHOLDERS: &'static str;

    /// `col = ? AND …` clause selecting a row by its primary key.
    const WHERE_PK: &'static str;

    /// `col = ?, …` clause for UPDATE statements, matching [Entity::COLUMNS].
    const SET_COLS: &'static str;

    /// Converts the entity into SQL values, ordered as in [Entity::COLUMNS].
    fn marshall(&self) -> Vec<SqlValue>;

    /// Returns the values of the primary key, ordered as in [Entity::WHERE_PK].
    fn primary_key(&self) -> Vec<SqlValue>;

    /// Converts a `SELECT *` row back into an entity. Fails with
    /// [Error::InvalidValue] if the row shape does not match the schema.
    fn unmarshall(row: &[SqlValue]) -> Result<Self>;
}

/// An [Entity] which additionally round-trips through a GTFS CSV row.
pub trait GtfsEntity: Entity {
    /// GTFS table name, without the `.txt` suffix.
    const GTFS_TABLE: &'static str;

    /// Converts the entity into a GTFS row; optional fields map to `""`.
    fn gtfs_marshall(&self) -> HashMap<String, String>;

    /// Converts a GTFS row back into an entity, applying documented
    /// fallbacks for missing optional columns.
    fn gtfs_unmarshall(row: &HashMap<String, String>) -> Result<Self>;
}

/// Coalesces an in-memory empty string into SQL NULL.
///
/// Used for id-like optional fields, so that foreign key constraints apply
/// only when the reference is meaningful.
pub(crate) fn text_or_null(x: &str) -> SqlValue {
    if x.is_empty() {
        SqlValue::Null
    } else {
        SqlValue::Text(x.to_string())
    }
}

/// Sequential typed reader over a `SELECT *` row, tracking the entity and
/// field names for error reporting.
pub(crate) struct RowReader<'a> {
    entity: &'static str,
    row: &'a [SqlValue],
    at: usize,
}

impl<'a> RowReader<'a> {
    pub fn new(entity: &'static str, row: &'a [SqlValue]) -> Self {
        Self { entity, row, at: 0 }
    }

    fn invalid(&self, field: &'static str, value: &SqlValue) -> Error {
        Error::InvalidValue {
            entity: self.entity,
            field,
            value: format!("{value:?}"),
        }
    }

    fn next(&mut self, field: &'static str) -> Result<&'a SqlValue> {
        let value = self.row.get(self.at).ok_or(Error::InvalidValue {
            entity: self.entity,
            field,
            value: "<missing column>".to_string(),
        })?;
        self.at += 1;
        Ok(value)
    }

    pub fn text(&mut self, field: &'static str) -> Result<String> {
        match self.next(field)? {
            SqlValue::Text(x) => Ok(x.clone()),
            other => Err(self.invalid(field, other)),
        }
    }

    /// Reads a nullable TEXT column, coalescing NULL into `""`.
    pub fn text_or_empty(&mut self, field: &'static str) -> Result<String> {
        match self.next(field)? {
            SqlValue::Text(x) => Ok(x.clone()),
            SqlValue::Null => Ok(String::new()),
            other => Err(self.invalid(field, other)),
        }
    }

    pub fn integer(&mut self, field: &'static str) -> Result<i64> {
        match self.next(field)? {
            SqlValue::Integer(x) => Ok(*x),
            other => Err(self.invalid(field, other)),
        }
    }

    pub fn nullable_integer(&mut self, field: &'static str) -> Result<Option<i64>> {
        match self.next(field)? {
            SqlValue::Integer(x) => Ok(Some(*x)),
            SqlValue::Null => Ok(None),
            other => Err(self.invalid(field, other)),
        }
    }

    pub fn real(&mut self, field: &'static str) -> Result<f64> {
        match self.next(field)? {
            SqlValue::Real(x) => Ok(*x),
            SqlValue::Integer(x) => Ok(*x as f64),
            other => Err(self.invalid(field, other)),
        }
    }

    pub fn nullable_real(&mut self, field: &'static str) -> Result<Option<f64>> {
        match self.next(field)? {
            SqlValue::Real(x) => Ok(Some(*x)),
            SqlValue::Integer(x) => Ok(Some(*x as f64)),
            SqlValue::Null => Ok(None),
            other => Err(self.invalid(field, other)),
        }
    }

    pub fn boolean(&mut self, field: &'static str) -> Result<bool> {
        match self.next(field)? {
            SqlValue::Integer(0) => Ok(false),
            SqlValue::Integer(1) => Ok(true),
            other => Err(self.invalid(field, other)),
        }
    }

    pub fn nullable_boolean(&mut self, field: &'static str) -> Result<Option<bool>> {
        match self.next(field)? {
            SqlValue::Integer(0) => Ok(Some(false)),
            SqlValue::Integer(1) => Ok(Some(true)),
            SqlValue::Null => Ok(None),
            other => Err(self.invalid(field, other)),
        }
    }

    pub fn date(&mut self, field: &'static str) -> Result<NaiveDate> {
        let entity = self.entity;
        match self.next(field)? {
            SqlValue::Text(x) => parse_sql_date(x).map_err(|_| Error::InvalidValue {
                entity,
                field,
                value: x.clone(),
            }),
            other => Err(self.invalid(field, other)),
        }
    }

    pub fn time(&mut self, field: &'static str) -> Result<TimePoint> {
        match self.next(field)? {
            SqlValue::Integer(x) if *x >= 0 => Ok(TimePoint::from_seconds(*x as u64)),
            other => Err(self.invalid(field, other)),
        }
    }

    /// Reads an integer column and decodes it through the provided enum parser.
    pub fn enum_field<T>(
        &mut self,
        field: &'static str,
        parse: impl FnOnce(i64) -> Option<T>,
    ) -> Result<T> {
        let raw = self.integer(field)?;
        parse(raw).ok_or(Error::InvalidValue {
            entity: self.entity,
            field,
            value: raw.to_string(),
        })
    }

    pub fn nullable_enum_field<T>(
        &mut self,
        field: &'static str,
        parse: impl FnOnce(i64) -> Option<T>,
    ) -> Result<Option<T>> {
        match self.nullable_integer(field)? {
            None => Ok(None),
            Some(raw) => parse(raw).map(Some).ok_or(Error::InvalidValue {
                entity: self.entity,
                field,
                value: raw.to_string(),
            }),
        }
    }

    /// Verifies that every column of the row was consumed.
    pub fn finish(self) -> Result<()> {
        if self.at == self.row.len() {
            Ok(())
        } else {
            Err(Error::InvalidValue {
                entity: self.entity,
                field: "<row>",
                value: format!("expected {} columns, got {}", self.at, self.row.len()),
            })
        }
    }
}

/// Typed reader over a GTFS CSV row (a column name to string value mapping).
///
/// A column which is absent or holds an empty string is considered missing;
/// accessors taking a fallback return it in that case.
pub(crate) struct GtfsRow<'a> {
    entity: &'static str,
    row: &'a HashMap<String, String>,
}

impl<'a> GtfsRow<'a> {
    pub fn new(entity: &'static str, row: &'a HashMap<String, String>) -> Self {
        Self { entity, row }
    }

    fn invalid(&self, field: &'static str, value: &str) -> Error {
        Error::InvalidValue {
            entity: self.entity,
            field,
            value: value.to_string(),
        }
    }

    pub fn get(&self, column: &'static str) -> Option<&'a str> {
        match self.row.get(column).map(String::as_str) {
            None | Some("") => None,
            Some(x) => Some(x),
        }
    }

    pub fn required(&self, column: &'static str) -> Result<&'a str> {
        self.get(column)
            .ok_or_else(|| self.invalid(column, "<missing column>"))
    }

    pub fn optional(&self, column: &'static str) -> String {
        self.get(column).unwrap_or_default().to_string()
    }

    pub fn parse<T: std::str::FromStr>(&self, column: &'static str) -> Result<T> {
        let raw = self.required(column)?;
        raw.parse().map_err(|_| self.invalid(column, raw))
    }

    pub fn parse_optional<T: std::str::FromStr>(&self, column: &'static str) -> Result<Option<T>> {
        match self.get(column) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| self.invalid(column, raw)),
        }
    }

    /// Decodes a `"0"`/`"1"` column into a bool, using the fallback when missing.
    pub fn boolean(&self, column: &'static str, fallback: bool) -> Result<bool> {
        match self.get(column) {
            None => Ok(fallback),
            Some("0") => Ok(false),
            Some("1") => Ok(true),
            Some(other) => Err(self.invalid(column, other)),
        }
    }

    /// Decodes a GTFS tri-state column: `""`/`"0"` unknown, `"1"` yes, `"2"` no.
    pub fn tri_state(&self, column: &'static str) -> Result<Option<bool>> {
        match self.get(column) {
            None | Some("0") => Ok(None),
            Some("1") => Ok(Some(true)),
            Some("2") => Ok(Some(false)),
            Some(other) => Err(self.invalid(column, other)),
        }
    }

    pub fn enum_field<T>(
        &self,
        column: &'static str,
        parse: impl FnOnce(i64) -> Option<T>,
    ) -> Result<T> {
        let raw = self.required(column)?;
        raw.parse::<i64>()
            .ok()
            .and_then(parse)
            .ok_or_else(|| self.invalid(column, raw))
    }

    pub fn enum_field_or<T>(
        &self,
        column: &'static str,
        parse: impl FnOnce(i64) -> Option<T>,
        fallback: T,
    ) -> Result<T> {
        match self.get(column) {
            None => Ok(fallback),
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .and_then(parse)
                .ok_or_else(|| self.invalid(column, raw)),
        }
    }

    pub fn optional_enum_field<T>(
        &self,
        column: &'static str,
        parse: impl FnOnce(i64) -> Option<T>,
    ) -> Result<Option<T>> {
        match self.get(column) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .and_then(parse)
                .map(Some)
                .ok_or_else(|| self.invalid(column, raw)),
        }
    }
}

/// Encodes a GTFS tri-state column; the inverse of [GtfsRow::tri_state].
pub(crate) fn tri_state_to_gtfs(x: Option<bool>) -> String {
    match x {
        None => String::new(),
        Some(true) => "1".to_string(),
        Some(false) => "2".to_string(),
    }
}

pub(crate) fn bool_to_gtfs(x: bool) -> &'static str {
    if x {
        "1"
    } else {
        "0"
    }
}
