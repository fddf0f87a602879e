/// # Test Utilities Module
///
/// Testing infrastructure shared by unit and integration tests:
/// - `ScriptedDriver`, a driver whose outcomes are scripted and whose calls are recorded
/// - `capture_logs`, to assert on the session's log output
/// - `seed_sample_schema`, a small realistic schema for SQLite-backed tests

use crate::core::db::{Credentials, Driver, DriverConnection, RowSet};
use crate::core::DriverError;
use rusqlite::Connection;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// One call a `ScriptedDriver` connection received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Query(String),
    Execute(String),
    Commit,
}

#[derive(Debug, Default)]
struct Script {
    connect_error: Option<DriverError>,
    outcomes: VecDeque<Result<RowSet, DriverError>>,
    calls: Vec<Call>,
}

/// Driver double. Every query or execute pops the next scripted outcome;
/// once the script is empty, queries return an empty row set and executes
/// succeed. Commits always succeed. Clones share one script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    script: Arc<Mutex<Script>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        // A test that panicked while holding the lock already failed.
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes the next `connect` fail with `err`.
    pub fn fail_connect(&self, err: DriverError) {
        self.script().connect_error = Some(err);
    }

    pub fn push_rows(&self, rows: RowSet) {
        self.script().outcomes.push_back(Ok(rows));
    }

    pub fn push_error(&self, err: DriverError) {
        self.script().outcomes.push_back(Err(err));
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.script().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.script().calls.iter().filter(|c| pred(c)).count()
    }
}

impl Driver for ScriptedDriver {
    type Conn = ScriptedConnection;

    fn connect(&self, _credentials: &Credentials) -> Result<ScriptedConnection, DriverError> {
        let mut script = self.script();
        script.calls.push(Call::Connect);
        match script.connect_error.take() {
            Some(err) => Err(err),
            None => Ok(ScriptedConnection {
                script: Arc::clone(&self.script),
            }),
        }
    }
}

/// Connection handed out by `ScriptedDriver`.
#[derive(Debug)]
pub struct ScriptedConnection {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnection {
    fn next(&self, call: Call) -> Result<RowSet, DriverError> {
        let mut script = self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        script.calls.push(call);
        script.outcomes.pop_front().unwrap_or_else(|| Ok(RowSet::default()))
    }
}

impl DriverConnection for ScriptedConnection {
    fn query(&mut self, sql: &str) -> Result<RowSet, DriverError> {
        self.next(Call::Query(sql.to_string()))
    }

    fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.next(Call::Execute(sql.to_string())).map(|_| ())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        let mut script = self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        script.calls.push(Call::Commit);
        Ok(())
    }
}

#[derive(Clone)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a DEBUG-level subscriber installed for the current thread
/// and returns its result with everything it logged.
pub fn capture_logs<F, R>(f: F) -> (R, String)
where
    F: FnOnce() -> R,
{
    let buf = Arc::new(Mutex::new(Vec::new()));
    let writer = SharedBuf(Arc::clone(&buf));
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .with_writer(move || writer.clone())
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    let bytes = buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone();
    (result, String::from_utf8_lossy(&bytes).into_owned())
}

/// Creates a small shop schema with sample rows.
pub fn seed_sample_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL,
            created_at DATETIME,
            avatar BLOB
        );

        CREATE TABLE orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            total REAL NOT NULL,
            placed_on DATE,
            FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
        );

        INSERT INTO users (username, email, created_at, avatar) VALUES
            ('alice', 'alice@example.com', '2024-01-15 09:30:00', X'89504E47'),
            ('bob', 'bob@example.com', '2024-02-01 17:05:12', NULL),
            ('charlie', 'charlie@example.com', NULL, NULL);

        INSERT INTO orders (user_id, total, placed_on) VALUES
            (1, 19.99, '2024-03-01'),
            (1, 5.5, '2024-03-02'),
            (2, 120.0, '2024-03-05');
        ",
    )
}

/// Asserts that a result is a specific `SqlHelperError` variant.
#[macro_export]
macro_rules! assert_sqlhelper_error {
    ($result:expr, $variant:pat, $context:expr) => {
        match $result {
            Err($variant) => {}
            Ok(_) => panic!("Expected {} error but got Ok in {}", stringify!($variant), $context),
            Err(other) => panic!("Expected {} but got {:?} in {}", stringify!($variant), other, $context),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Result, SqlHelperError};

    #[test]
    fn test_scripted_driver_records_calls() {
        let driver = ScriptedDriver::new();
        driver.push_error(DriverError::other("boom"));
        let creds = Credentials::new("u", "p", "h", 1, None);

        let mut conn = driver.connect(&creds).unwrap();
        assert!(conn.execute("UPDATE t SET x = 1").is_err());
        assert_eq!(conn.query("SELECT 1").unwrap(), RowSet::default());
        conn.commit().unwrap();

        assert_eq!(
            driver.calls(),
            vec![
                Call::Connect,
                Call::Execute("UPDATE t SET x = 1".to_string()),
                Call::Query("SELECT 1".to_string()),
                Call::Commit,
            ]
        );
    }

    #[test]
    fn test_fail_connect_applies_once() {
        let driver = ScriptedDriver::new();
        driver.fail_connect(DriverError::other("refused"));
        let creds = Credentials::new("u", "p", "h", 1, None);

        assert!(driver.connect(&creds).is_err());
        assert!(driver.connect(&creds).is_ok());
    }

    #[test]
    fn test_capture_logs() {
        let (value, logs) = capture_logs(|| {
            tracing::warn!("careful");
            tracing::debug!("details");
            42
        });
        assert_eq!(value, 42);
        assert!(logs.contains("WARN"));
        assert!(logs.contains("careful"));
        assert!(logs.contains("details"));
    }

    #[test]
    fn test_sample_schema() {
        let conn = Connection::open_in_memory().unwrap();
        seed_sample_schema(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_error_assertion_macro() {
        let result: Result<i32> = Err(SqlHelperError::Config("bad".to_string()));
        assert_sqlhelper_error!(result, SqlHelperError::Config(_), "macro test");
    }
}
