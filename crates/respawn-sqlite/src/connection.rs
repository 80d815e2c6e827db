//! `Connection` implementation on top of rusqlite.

// Allow `impl Future` return types in trait methods - intentional for async trait compat
#![allow(clippy::manual_async_fn)]

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use respawn_core::{
    ColumnInfo, Connection, ConnectionError, ConnectionErrorKind, Cx, Error, Outcome, QueryError,
    QueryErrorKind, Row, Value,
};
use rusqlite::ErrorCode;
use rusqlite::types::ValueRef;

use crate::config::{SqliteConfig, SqliteLocation};

/// A SQLite connection.
///
/// rusqlite connections are `Send` but not `Sync`; the handle is kept behind a
/// mutex so one `SqliteConnection` can be shared by reference. Statements run
/// synchronously while the lock is held; nothing awaits under it.
pub struct SqliteConnection {
    inner: Mutex<rusqlite::Connection>,
    config: SqliteConfig,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    /// Open (or create) a database file with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open_with(SqliteConfig::file(path))
    }

    /// Open a private in-memory database.
    pub fn open_memory() -> Result<Self, Error> {
        Self::open_with(SqliteConfig::memory())
    }

    /// Open a database with explicit settings.
    pub fn open_with(config: SqliteConfig) -> Result<Self, Error> {
        let conn = match &config.location {
            SqliteLocation::Memory => rusqlite::Connection::open_in_memory(),
            SqliteLocation::File(path) => rusqlite::Connection::open(path),
        }
        .map_err(|e| connect_error(&config, e))?;

        conn.busy_timeout(config.busy_timeout)
            .map_err(|e| connect_error(&config, e))?;
        if config.foreign_keys {
            conn.execute_batch("PRAGMA foreign_keys = ON;")
                .map_err(|e| connect_error(&config, e))?;
        }

        tracing::debug!(
            database = %config.describe(),
            foreign_keys = config.foreign_keys,
            "Opened SQLite connection"
        );

        Ok(Self {
            inner: Mutex::new(conn),
            config,
        })
    }

    /// The settings this connection was opened with.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Run `f` against the underlying rusqlite connection (fixtures, pragmas).
    pub fn with_raw<T>(
        &self,
        f: impl FnOnce(&rusqlite::Connection) -> rusqlite::Result<T>,
    ) -> Result<T, Error> {
        let conn = self.lock()?;
        f(&conn).map_err(|e| query_error(e, None))
    }

    /// Run a query and collect every row.
    pub fn query_sync(&self, sql: &str) -> Result<Vec<Row>, Error> {
        tracing::trace!(sql = %sql, "SQLite query");
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(|e| query_error(e, Some(sql)))?;

        let columns = Arc::new(ColumnInfo::new(
            stmt.column_names().into_iter().map(String::from).collect(),
        ));
        let width = columns.len();

        let mut rows = stmt.query([]).map_err(|e| query_error(e, Some(sql)))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| query_error(e, Some(sql)))? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                let value = row.get_ref(i).map_err(|e| query_error(e, Some(sql)))?;
                values.push(convert_value(value));
            }
            out.push(Row::with_columns(Arc::clone(&columns), values));
        }
        Ok(out)
    }

    /// Run a `;`-separated script. Returns the changes made by its last statement.
    pub fn execute_sync(&self, sql: &str) -> Result<u64, Error> {
        tracing::trace!(sql = %sql, "SQLite execute");
        let conn = self.lock()?;
        conn.execute_batch(sql)
            .map_err(|e| query_error(e, Some(sql)))?;
        Ok(u64::try_from(conn.changes()).unwrap_or(u64::MAX))
    }

    fn lock(&self) -> Result<MutexGuard<'_, rusqlite::Connection>, Error> {
        self.inner.lock().map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Unavailable,
                message: "Failed to acquire connection lock".to_string(),
                source: None,
            })
        })
    }
}

impl Connection for SqliteConnection {
    fn query(&self, cx: &Cx, sql: &str) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            match self.query_sync(sql) {
                Ok(rows) => Outcome::Ok(rows),
                Err(e) => Outcome::Err(e),
            }
        }
    }

    fn execute(&self, cx: &Cx, sql: &str) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            match self.execute_sync(sql) {
                Ok(changes) => Outcome::Ok(changes),
                Err(e) => Outcome::Err(e),
            }
        }
    }
}

fn convert_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::BigInt(i),
        ValueRef::Real(f) => Value::Double(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

fn connect_error(config: &SqliteConfig, e: rusqlite::Error) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Connect,
        message: format!("Failed to open SQLite database {}: {e}", config.describe()),
        source: Some(Box::new(e)),
    })
}

fn query_error(e: rusqlite::Error, sql: Option<&str>) -> Error {
    let message = e.to_string();
    let code = match &e {
        rusqlite::Error::SqliteFailure(err, _) => Some(err.code),
        _ => None,
    };
    let kind = match code {
        Some(ErrorCode::ConstraintViolation) => QueryErrorKind::Constraint,
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => QueryErrorKind::Busy,
        Some(
            ErrorCode::PermissionDenied
            | ErrorCode::ReadOnly
            | ErrorCode::AuthorizationForStatementDenied,
        ) => QueryErrorKind::Permission,
        _ if message.contains("syntax error") => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    };
    Error::Query(QueryError {
        kind,
        message,
        sql: sql.map(str::to_string),
        source: Some(Box::new(e)),
    })
}
