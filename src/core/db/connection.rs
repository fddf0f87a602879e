/// Connection Module
///
/// Credentials, the driver seam the session talks through, and the
/// rusqlite-backed `SqliteDriver`.

use crate::core::db::query::{RowSet, Value};
use crate::core::{DriverError, DriverErrorKind};
use rusqlite::{Connection, OpenFlags};
use std::fmt;
use std::path::Path;
use tracing::warn;

/// Login details for one database server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    /// Database to select on connect. When absent, SQL must qualify objects.
    pub database: Option<String>,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        database: Option<String>,
    ) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
            host: host.into(),
            port,
            database,
        }
    }
}

// Keeps the password out of logs and panic messages.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}

/// Opens connections. Implemented once per database client library.
pub trait Driver {
    type Conn: DriverConnection;

    fn connect(&self, credentials: &Credentials) -> Result<Self::Conn, DriverError>;
}

/// An open connection. Each call runs one statement on a cursor scoped to
/// that call.
pub trait DriverConnection {
    /// Runs a row-producing statement and fetches the column names and every row.
    fn query(&mut self, sql: &str) -> Result<RowSet, DriverError>;

    /// Runs a statement that produces no rows.
    fn execute(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Commits the open transaction, if any.
    fn commit(&mut self) -> Result<(), DriverError>;

    /// Statement that removes every row of `table`. The name is not escaped.
    fn truncate_statement(&self, table: &str) -> String {
        format!("TRUNCATE {}", table)
    }
}

/// SQLite through rusqlite.
///
/// `host` names a directory and `database` a file inside it. The file is
/// opened read-write and never created, so a missing file reports
/// `UnknownDatabase`. Without a database the connection is in-memory and
/// files under `host` can be `ATTACH`ed. `username`, `password` and `port`
/// have no SQLite counterpart.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    type Conn = SqliteConnection;

    fn connect(&self, credentials: &Credentials) -> Result<SqliteConnection, DriverError> {
        let host = Path::new(&credentials.host);
        if !host.is_dir() {
            return Err(DriverError::other(format!(
                "host directory {} does not exist",
                credentials.host
            )));
        }

        let conn = match &credentials.database {
            Some(database) => {
                let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                Connection::open_with_flags(host.join(database), flags).map_err(|e| {
                    let err = DriverError::from(e);
                    if err.kind == DriverErrorKind::UnknownDatabase {
                        DriverError::new(
                            DriverErrorKind::UnknownDatabase,
                            format!("unknown database '{}': {}", database, err.message),
                        )
                    } else {
                        err
                    }
                })?
            }
            None => Connection::open_in_memory()?,
        };

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(SqliteConnection { conn })
    }
}

/// An open SQLite connection.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    /// The underlying rusqlite connection.
    pub fn inner(&self) -> &Connection {
        &self.conn
    }
}

impl DriverConnection for SqliteConnection {
    fn query(&mut self, sql: &str) -> Result<RowSet, DriverError> {
        let mut stmt = self.conn.prepare(sql)?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let decl_types: Vec<Option<String>> = stmt
            .columns()
            .iter()
            .map(|c| c.decl_type().map(str::to_owned))
            .collect();

        let rows = stmt
            .query_map([], |row| {
                decl_types
                    .iter()
                    .enumerate()
                    .map(|(i, decl)| Ok(Value::from_sqlite(row.get_ref(i)?, decl.as_deref())))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(RowSet::new(columns, rows))
    }

    fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        if let Err(err) = self.conn.execute_batch(sql) {
            // Partial work of a failed batch is never committed later.
            if !self.conn.is_autocommit() {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                    warn!("Rollback after failed statement also failed: {}", rollback_err);
                }
            }
            return Err(err.into());
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        // Outside an explicit transaction SQLite has already committed.
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn truncate_statement(&self, table: &str) -> String {
        format!("DELETE FROM {}", table)
    }
}
