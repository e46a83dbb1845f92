mod associations;
mod contacts;
mod migration;
mod tags;

use std::path::Path;

use anyhow::Result;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, Row};
use time::OffsetDateTime;

use crate::store::Store;

/// SQLite-backed store.
///
/// Opening a database enables foreign keys, registers the `fold_case` SQL
/// function used for case-insensitive search and ordering, and applies any
/// pending migrations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens an in-memory SQLite database.
    pub fn in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    /// Opens a file-based SQLite database at the given path.
    ///
    /// Creates the database file if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "opening database");
        Self::initialize(Connection::open(path)?)
    }

    fn initialize(mut conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        register_fold_case(&conn)?;
        migration::apply_pending_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    /// Returns a reference to the underlying connection.
    ///
    /// Useful for executing custom queries in tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Returns the applied schema versions, ascending.
    pub fn schema_versions(&self) -> Result<Vec<u32>> {
        migration::applied_versions(&self.conn)
    }
}

impl Store for Database {
    fn atomically<T, E, F>(&self, work: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Self) -> std::result::Result<T, E>,
        E: From<anyhow::Error>,
    {
        // Already inside a transaction: join it, the outer unit commits.
        if !self.conn.is_autocommit() {
            return work(self);
        }

        self.conn
            .execute("BEGIN TRANSACTION", [])
            .map_err(|e| E::from(anyhow::Error::from(e)))?;

        match work(self) {
            Ok(value) => {
                if let Err(e) = self.conn.execute("COMMIT", []) {
                    self.conn.execute("ROLLBACK", []).ok();
                    return Err(E::from(anyhow::Error::from(e)));
                }
                Ok(value)
            }
            Err(e) => {
                self.conn.execute("ROLLBACK", []).ok();
                Err(e)
            }
        }
    }
}

/// Registers `fold_case(text)`: Unicode lowercase, NULL stays NULL.
///
/// SQLite's own `lower()` and `LIKE` only fold ASCII letters.
fn register_fold_case(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|v| v.to_lowercase()))
        },
    )
}

/// Reads a unix timestamp column.
fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let secs: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

/// Returns true if `error` is a UNIQUE constraint violation.
fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Renders `?N` placeholders for `count` parameters starting at `first`.
fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|n| format!("?{n}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests;
