//! A thin ORM over an embedded SQLite database, exposing typed CRUD over
//! the entities of the [model](crate::model), transactions and raw SQL.

use std::path::{Path, PathBuf};

use rusqlite::functions::FunctionFlags;
use rusqlite::{params_from_iter, Connection};

use crate::error::{Error, Result};
use crate::model::{self, Entity, SqlValue};

/// A single row of an untyped query result.
pub type SqlRow = Vec<SqlValue>;

/// Result of an untyped SQL query.
///
/// Rows are materialised when the query executes; iteration,
/// [UntypedCursor::one], [UntypedCursor::many] and [UntypedCursor::all]
/// consume them in order.
pub struct UntypedCursor {
    rows: std::vec::IntoIter<SqlRow>,
    row_count: usize,
}

impl Iterator for UntypedCursor {
    type Item = SqlRow;

    fn next(&mut self) -> Option<SqlRow> {
        self.rows.next()
    }
}

impl UntypedCursor {
    /// Returns the next row, or None if there are no more rows.
    pub fn one(&mut self) -> Option<SqlRow> {
        self.rows.next()
    }

    /// Returns the next row, or fails with [Error::EmptyQueryResult]
    /// carrying the provided context.
    pub fn one_must(&mut self, context: &str) -> Result<SqlRow> {
        self.one()
            .ok_or_else(|| Error::EmptyQueryResult(context.to_string()))
    }

    /// Returns up to `count` rows. An empty result means the cursor
    /// is exhausted.
    pub fn many(&mut self, count: usize) -> Vec<SqlRow> {
        self.rows.by_ref().take(count).collect()
    }

    /// Returns all remaining rows.
    pub fn all(&mut self) -> Vec<SqlRow> {
        self.rows.by_ref().collect()
    }

    /// For SELECT statements, the number of returned rows;
    /// for data-modifying statements, the number of affected rows.
    pub fn row_count(&self) -> usize {
        self.row_count
    }
}

/// Result of a typed SQL query: rows already unmarshalled into entities.
pub struct TypedCursor<E> {
    rows: std::vec::IntoIter<E>,
}

impl<E> Iterator for TypedCursor<E> {
    type Item = E;

    fn next(&mut self) -> Option<E> {
        self.rows.next()
    }
}

impl<E: Entity> TypedCursor<E> {
    pub fn one(&mut self) -> Option<E> {
        self.rows.next()
    }

    pub fn one_must(&mut self, context: &str) -> Result<E> {
        self.one()
            .ok_or_else(|| Error::EmptyQueryResult(context.to_string()))
    }

    pub fn many(&mut self, count: usize) -> Vec<E> {
        self.rows.by_ref().take(count).collect()
    }

    pub fn all(&mut self) -> Vec<E> {
        self.rows.by_ref().collect()
    }
}

/// A connection to a database holding the transit data model.
///
/// The database runs in auto-commit mode; transactions must be managed
/// explicitly through [Database::begin]/[Database::commit]/
/// [Database::rollback] or the scoped [Database::transaction].
///
/// Apart from the built-in SQL functions, connections provide
/// `unicode_lower`, `unicode_upper`, `unicode_casefold`, `unicode_title`
/// and `re_sub(pattern, repl, input)`.
pub struct Database {
    // Always Some, except transiently inside released().
    conn: Option<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Opens a new database and executes DDL statements for every entity
    /// of the data model. Pass None to create an in-memory database.
    pub fn create_with_schema(path: Option<&Path>) -> Result<Self> {
        let db = Self::open_raw(path)?;
        let conn = db.conn();
        for statement in model::schema_statements() {
            conn.execute_batch(statement)?;
        }
        Ok(db)
    }

    /// Opens a database which already has the schema applied.
    pub fn open_existing(path: &Path) -> Result<Self> {
        Self::open_raw(Some(path))
    }

    /// Physically copies the database file at `from` to `to` and opens
    /// the copy. The source must not be written to concurrently.
    pub fn cloned(from: &Path, to: &Path) -> Result<Self> {
        std::fs::copy(from, to)?;
        Self::open_existing(to)
    }

    fn open_raw(path: Option<&Path>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)?,
            None => Connection::open_in_memory()?,
        };
        conn.execute_batch("PRAGMA foreign_keys=1; PRAGMA locking_mode=EXCLUSIVE;")?;
        install_functions(&conn)?;
        Ok(Self {
            conn: Some(conn),
            path: path.map(Path::to_path_buf),
        })
    }

    fn conn(&self) -> &Connection {
        self.conn.as_ref().expect("database connection is open")
    }

    /// Releases resources held by the connection. Any open transaction is
    /// **not** implicitly committed.
    pub fn close(mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| e)?;
        }
        Ok(())
    }

    /// Closes the connection, yields the on-disk path to the closure so
    /// external tools can operate on the file, and reopens on exit.
    pub fn released<T>(&mut self, f: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
        let path = self.path.clone().ok_or(Error::NoDatabaseFile)?;
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| e)?;
        }
        let result = f(&path);
        *self = Self::open_raw(Some(&path))?;
        result
    }

    // Transaction handling

    /// True if there is an ongoing transaction.
    pub fn in_transaction(&self) -> bool {
        !self.conn().is_autocommit()
    }

    pub fn begin(&self) -> Result<()> {
        self.conn().execute_batch("BEGIN TRANSACTION;")?;
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.conn().execute_batch("COMMIT;")?;
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        self.conn().execute_batch("ROLLBACK;")?;
        Ok(())
    }

    /// Runs the closure inside a transaction: committed if it returns Ok,
    /// rolled back on any Err. Nested transactions are not supported.
    pub fn transaction<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.begin()?;
        match f() {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(error) => {
                let _ = self.rollback();
                Err(error)
            }
        }
    }

    // Untyped SQL handling

    /// Executes a raw SQL statement. Parameters and results are exchanged
    /// with the engine unchanged.
    pub fn raw_execute(&self, sql: &str, params: impl rusqlite::Params) -> Result<UntypedCursor> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        if stmt.column_count() == 0 {
            let changes = stmt.execute(params)?;
            Ok(UntypedCursor {
                rows: Vec::new().into_iter(),
                row_count: changes,
            })
        } else {
            let column_count = stmt.column_count();
            let mut rows = stmt.query(params)?;
            let mut collected: Vec<SqlRow> = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    values.push(row.get::<_, SqlValue>(i)?);
                }
                collected.push(values);
            }
            let row_count = collected.len();
            Ok(UntypedCursor {
                rows: collected.into_iter(),
                row_count,
            })
        }
    }

    /// Executes a raw SQL statement once per parameter set. Only usable
    /// with statements that return no rows.
    pub fn raw_execute_many<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: impl IntoIterator<Item = P>,
    ) -> Result<UntypedCursor> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let mut changes = 0;
        for p in params {
            changes += stmt.execute(p)?;
        }
        Ok(UntypedCursor {
            rows: Vec::new().into_iter(),
            row_count: changes,
        })
    }

    // Typed SQL handling

    /// Executes a `SELECT *`-shaped query and unmarshalls every row into
    /// an entity of type E.
    pub fn typed_query<E: Entity>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<TypedCursor<E>> {
        let mut cursor = self.raw_execute(sql, params)?;
        let mut entities = Vec::with_capacity(cursor.row_count());
        for row in &mut cursor {
            entities.push(E::unmarshall(&row)?);
        }
        Ok(TypedCursor {
            rows: entities.into_iter(),
        })
    }

    /// Retrieves the entity with the given primary key, or None.
    pub fn retrieve<E: Entity>(&self, pk: &[SqlValue]) -> Result<Option<E>> {
        let sql = format!("SELECT * FROM {} WHERE {}", E::TABLE, E::WHERE_PK);
        Ok(self
            .typed_query(&sql, params_from_iter(pk.iter().cloned()))?
            .one())
    }

    /// Retrieves the entity with the given primary key, or fails with
    /// [Error::EmptyQueryResult].
    pub fn retrieve_must<E: Entity>(&self, pk: &[SqlValue]) -> Result<E> {
        let sql = format!("SELECT * FROM {} WHERE {}", E::TABLE, E::WHERE_PK);
        self.typed_query(&sql, params_from_iter(pk.iter().cloned()))?
            .one_must(&format!("No {} with primary key {:?}", E::NAME, pk))
    }

    /// Retrieves every entity of type E.
    pub fn retrieve_all<E: Entity>(&self) -> Result<TypedCursor<E>> {
        self.typed_query(&format!("SELECT * FROM {}", E::TABLE), [])
    }

    /// Persists a new entity.
    pub fn create<E: Entity>(&self, entity: &E) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} {} VALUES {}",
            E::TABLE,
            E::COLUMNS,
            E::PLACEHOLDERS
        );
        self.raw_execute(&sql, params_from_iter(entity.marshall()))?;
        Ok(())
    }

    /// Persists multiple new entities, preparing the INSERT only once.
    pub fn create_many<E: Entity>(&self, entities: impl IntoIterator<Item = E>) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} {} VALUES {}",
            E::TABLE,
            E::COLUMNS,
            E::PLACEHOLDERS
        );
        self.raw_execute_many(
            &sql,
            entities
                .into_iter()
                .map(|e| params_from_iter(e.marshall())),
        )?;
        Ok(())
    }

    /// Updates the attributes of an entity, matched by its primary key.
    pub fn update<E: Entity>(&self, entity: &E) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            E::TABLE,
            E::SET_COLS,
            E::WHERE_PK
        );
        let mut values = entity.marshall();
        values.extend(entity.primary_key());
        self.raw_execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    /// Updates the attributes of multiple entities.
    pub fn update_many<E: Entity>(&self, entities: impl IntoIterator<Item = E>) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            E::TABLE,
            E::SET_COLS,
            E::WHERE_PK
        );
        self.raw_execute_many(
            &sql,
            entities.into_iter().map(|e| {
                let mut values = e.marshall();
                values.extend(e.primary_key());
                params_from_iter(values)
            }),
        )?;
        Ok(())
    }

    /// Counts the entities of type E.
    pub fn count<E: Entity>(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row(&format!("SELECT COUNT(*) FROM {}", E::TABLE), [], |row| {
                row.get(0)
            })?;
        Ok(count as u64)
    }
}

fn install_functions(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("unicode_lower", 1, flags, |ctx| {
        Ok(ctx.get::<String>(0)?.to_lowercase())
    })?;
    conn.create_scalar_function("unicode_upper", 1, flags, |ctx| {
        Ok(ctx.get::<String>(0)?.to_uppercase())
    })?;
    // Rust has no separate casefolding; lowercase is the closest mapping.
    conn.create_scalar_function("unicode_casefold", 1, flags, |ctx| {
        Ok(ctx.get::<String>(0)?.to_lowercase())
    })?;
    conn.create_scalar_function("unicode_title", 1, flags, |ctx| {
        Ok(title_case(&ctx.get::<String>(0)?))
    })?;
    conn.create_scalar_function("re_sub", 3, flags, |ctx| {
        let pattern = ctx.get_or_create_aux(0, |vr| -> Result<regex::Regex, BoxedError> {
            Ok(regex::Regex::new(vr.as_str()?)?)
        })?;
        let repl = ctx.get::<String>(1)?;
        let input = ctx.get::<String>(2)?;
        Ok(pattern.replace_all(&input, repl.as_str()).into_owned())
    })?;
    Ok(())
}

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Uppercases the first letter of every run of cased characters and
/// lowercases the rest, the way Python's str.title does.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_cased = false;
    for c in s.chars() {
        let cased = c.is_alphabetic();
        if cased && !prev_cased {
            out.extend(c.to_uppercase());
        } else if cased {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
        prev_cased = cased;
    }
    out
}
