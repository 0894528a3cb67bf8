//! Small SQLite database handle.
//!
//! [`Database`] runs SQL text and remembers the result code of the last
//! operation, the way agents that only keep a local state file need it.
//! Anything richer should use [`rusqlite`] directly through
//! [`Database::connection`].

use crate::error::{Error, Result};
use rusqlite::types::ValueRef;
use rusqlite::{ffi, Connection};
use std::path::Path;
use tracing::debug;

/// An open (or closed) SQLite database.
///
/// A `Default` database is closed; every operation on it fails with
/// `SQLITE_MISUSE`.
#[derive(Debug, Default)]
pub struct Database {
    connection: Option<Connection>,
    last_code: i32,
}

impl Database {
    /// Opens or creates the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let connection = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "database opened");
        Ok(Self::from_connection(connection))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(connection: Connection) -> Self {
        Self {
            connection: Some(connection),
            last_code: ffi::SQLITE_OK,
        }
    }

    /// Runs one or more `;`-separated statements, discarding any rows.
    pub fn exec(&mut self, sql: &str) -> Result<()> {
        let result = match &self.connection {
            Some(connection) => connection.execute_batch(sql),
            None => Err(closed()),
        };
        self.record(result)
    }

    /// Runs a single statement and hands every row to `callback` as column
    /// names and text values (`None` for NULL).
    ///
    /// Returning `false` from the callback stops the query with
    /// `SQLITE_ABORT`.
    pub fn exec_with<F>(&mut self, sql: &str, callback: F) -> Result<()>
    where
        F: FnMut(&[String], &[Option<String>]) -> bool,
    {
        let result = match &self.connection {
            Some(connection) => query_rows(connection, sql, callback),
            None => Err(closed()),
        };
        self.record(result)
    }

    /// Closes the database.
    ///
    /// If SQLite refuses, for example while a backup is running, the
    /// database stays open and the error is returned.
    pub fn close(&mut self) -> Result<()> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };
        match connection.close() {
            Ok(()) => {
                self.last_code = ffi::SQLITE_OK;
                Ok(())
            }
            Err((connection, e)) => {
                self.connection = Some(connection);
                self.record(Err(e))
            }
        }
    }

    /// Whether a connection is held.
    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Open and the last operation succeeded.
    pub fn is_valid(&self) -> bool {
        self.is_open() && self.last_code == ffi::SQLITE_OK
    }

    /// Primary result code of the last operation, `SQLITE_OK` (0) on success.
    pub fn last_error(&self) -> i32 {
        self.last_code
    }

    /// English description of [`last_error`](Self::last_error).
    pub fn last_error_message(&self) -> &'static str {
        ffi::code_to_str(self.last_code)
    }

    /// The underlying connection, if open.
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Whether the linked SQLite library was built thread-safe.
    pub fn is_threadsafe() -> bool {
        // SAFETY: sqlite3_threadsafe only reads a compile-time constant.
        unsafe { ffi::sqlite3_threadsafe() != 0 }
    }

    fn record<T>(&mut self, result: rusqlite::Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.last_code = ffi::SQLITE_OK;
                Ok(value)
            }
            Err(e) => {
                let err = Error::from(e);
                self.last_code = err.sqlite_code().unwrap_or(ffi::SQLITE_ERROR);
                debug!(code = self.last_code, error = %err, "sqlite operation failed");
                Err(err)
            }
        }
    }
}

fn failure(code: i32, message: &str) -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(ffi::Error::new(code), Some(message.to_string()))
}

fn closed() -> rusqlite::Error {
    failure(ffi::SQLITE_MISUSE, "database is closed")
}

fn query_rows<F>(connection: &Connection, sql: &str, mut callback: F) -> rusqlite::Result<()>
where
    F: FnMut(&[String], &[Option<String>]) -> bool,
{
    let mut statement = connection.prepare(sql)?;
    let columns: Vec<String> = statement
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut rows = statement.query([])?;
    while let Some(row) = rows.next()? {
        let values = (0..columns.len())
            .map(|index| row.get_ref(index).map(as_text))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if !callback(&columns, &values) {
            return Err(failure(ffi::SQLITE_ABORT, "query stopped by callback"));
        }
    }
    Ok(())
}

fn as_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
