/// Session Module
///
/// `DatabaseSession` owns one open connection and runs queries and
/// statements on it with a bounded, fixed-cooldown retry policy.

use crate::core::db::connection::{Credentials, Driver, DriverConnection};
use crate::core::db::query::ResultRow;
use crate::core::{ConnectError, DriverError, DriverErrorKind, Result, SqlHelperError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn, Span};

/// Default delay between a failed attempt and the next retry.
pub const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(7);

/// How a single `query`/`execute` call handles failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Escalate to `Err` when every attempt failed. When false, `query`
    /// returns `Ok(None)` and `execute` returns `Ok(())`.
    pub exit_on_fail: bool,
    /// Additional attempts after the first failure.
    pub retries: u32,
    /// Sleep before each retry.
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            exit_on_fail: true,
            retries: 0,
            cooldown: DEFAULT_RETRY_COOLDOWN,
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn exit_on_fail(mut self, exit_on_fail: bool) -> Self {
        self.exit_on_fail = exit_on_fail;
        self
    }
}

#[derive(Clone, Copy)]
enum StatementKind {
    Query,
    Statement,
}

impl StatementKind {
    fn log_failure(self, err: &DriverError, sql: &str) {
        match self {
            StatementKind::Query => {
                error!("Error with query: {}", err);
                error!("Query was: \n\t{}", sql);
            }
            StatementKind::Statement => {
                error!("Error with statement: {}", err);
                error!("Statement: {}", sql);
            }
        }
    }
}

/// One open connection plus the credentials it was opened with.
///
/// Every operation takes `&mut self`: a session serves one caller at a time.
pub struct DatabaseSession<C: DriverConnection> {
    credentials: Credentials,
    conn: C,
    span: Span,
}

impl<C: DriverConnection> DatabaseSession<C> {
    /// Opens a session, logging inside a `db_session` span for the host.
    pub fn connect<D>(driver: &D, credentials: Credentials) -> Result<Self>
    where
        D: Driver<Conn = C>,
    {
        let span = tracing::info_span!("db_session", host = %credentials.host);
        Self::connect_with_span(driver, credentials, span)
    }

    /// Opens a session that logs every event inside `span`.
    pub fn connect_with_span<D>(driver: &D, credentials: Credentials, span: Span) -> Result<Self>
    where
        D: Driver<Conn = C>,
    {
        let host = credentials.host.clone();
        let connected = span.in_scope(|| match driver.connect(&credentials) {
            Ok(conn) => {
                debug!("Successfully connected to {}", host);
                Ok(conn)
            }
            Err(err) => {
                let connect_err = match err.kind {
                    DriverErrorKind::AccessDenied => {
                        error!(
                            "Something is wrong with your user name or password, when connecting to {}",
                            host
                        );
                        ConnectError::AccessDenied { host }
                    }
                    DriverErrorKind::UnknownDatabase => {
                        error!(
                            "Could not find database {} on {}",
                            credentials.database.as_deref().unwrap_or("<none>"),
                            host
                        );
                        ConnectError::UnknownDatabase {
                            host,
                            database: credentials.database.clone(),
                        }
                    }
                    DriverErrorKind::Other => {
                        error!("ERROR/CONNECTION: Details-> {}", err);
                        ConnectError::Other { host, source: err }
                    }
                };
                Err(SqlHelperError::Connect(connect_err))
            }
        });

        Ok(DatabaseSession {
            credentials,
            conn: connected?,
            span,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn host(&self) -> &str {
        &self.credentials.host
    }

    /// Direct access to the driver connection.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Runs a read query and returns every row as an ordered column map.
    ///
    /// `Ok(Some(rows))` on success (possibly empty). When every attempt
    /// fails: `Err(StatementFailed)` if `policy.exit_on_fail`, else `Ok(None)`.
    pub fn query(&mut self, sql: &str, policy: RetryPolicy) -> Result<Option<Vec<ResultRow>>> {
        let rows = self.run_with_retries(sql, policy, StatementKind::Query, |conn| conn.query(sql))?;
        Ok(rows.map(|set| set.into_result_rows()))
    }

    /// Runs a statement that returns no rows and commits it.
    pub fn execute(&mut self, sql: &str, policy: RetryPolicy) -> Result<()> {
        self.run_with_retries(sql, policy, StatementKind::Statement, |conn| {
            conn.execute(sql)?;
            conn.commit()
        })?;
        Ok(())
    }

    /// Removes every row of `table` with the default policy. The table name
    /// is interpolated as-is.
    pub fn clear_table(&mut self, table: &str) -> Result<()> {
        self.span.in_scope(|| {
            warn!("Truncating/Clearing table {}/{}", self.credentials.host, table);
        });
        let sql = self.conn.truncate_statement(table);
        self.execute(&sql, RetryPolicy::default())
    }

    fn run_with_retries<T, F>(
        &mut self,
        sql: &str,
        policy: RetryPolicy,
        kind: StatementKind,
        mut attempt: F,
    ) -> Result<Option<T>>
    where
        F: FnMut(&mut C) -> std::result::Result<T, DriverError>,
    {
        let _entered = self.span.enter();

        let mut last_err = match attempt(&mut self.conn) {
            Ok(value) => return Ok(Some(value)),
            Err(err) => err,
        };
        kind.log_failure(&last_err, sql);

        for attempt_no in 2..=policy.retries.saturating_add(1) {
            warn!("Attempt {}:", attempt_no);
            thread::sleep(policy.cooldown);
            match attempt(&mut self.conn) {
                Ok(value) => {
                    info!("Success!");
                    return Ok(Some(value));
                }
                Err(err) => {
                    kind.log_failure(&err, sql);
                    last_err = err;
                }
            }
        }

        if policy.exit_on_fail {
            Err(SqlHelperError::StatementFailed {
                attempts: policy.retries.saturating_add(1),
                sql: sql.to_string(),
                source: last_err,
            })
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::query::{RowSet, Value};
    use crate::test_utils::{capture_logs, Call, ScriptedDriver};
    use std::time::Instant;

    fn creds() -> Credentials {
        Credentials::new("app", "secret", "db1", 3306, Some("shop".to_string()))
    }

    fn fast(retries: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_retries(retries)
            .with_cooldown(Duration::from_millis(1))
    }

    fn users() -> RowSet {
        RowSet::new(
            vec!["id".to_string(), "name".to_string()],
            vec![
                vec![Value::Integer(1), "Alice".into()],
                vec![Value::Integer(2), "Bob".into()],
            ],
        )
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert!(policy.exit_on_fail);
        assert_eq!(policy.retries, 0);
        assert_eq!(policy.cooldown, Duration::from_secs(7));
    }

    #[test]
    fn test_query_zips_columns_with_values() {
        let driver = ScriptedDriver::new();
        driver.push_rows(users());
        let mut session = DatabaseSession::connect(&driver, creds()).unwrap();

        let rows = session.query("SELECT id, name FROM users", RetryPolicy::default()).unwrap().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], Value::Integer(1));
        assert_eq!(rows[1]["name"], Value::Text("Bob".to_string()));
        assert!(rows.iter().all(|r| r.columns() == ["id", "name"]));
    }

    #[test]
    fn test_query_zero_rows_is_empty_not_none() {
        let driver = ScriptedDriver::new();
        driver.push_rows(RowSet::new(vec!["id".to_string()], vec![]));
        let mut session = DatabaseSession::connect(&driver, creds()).unwrap();

        let rows = session.query("SELECT id FROM users WHERE 0", RetryPolicy::default()).unwrap();
        assert_eq!(rows, Some(vec![]));
    }

    #[test]
    fn test_query_failure_without_exit_returns_none() {
        let driver = ScriptedDriver::new();
        driver.push_error(DriverError::other("boom"));
        driver.push_error(DriverError::other("boom"));
        let mut session = DatabaseSession::connect(&driver, creds()).unwrap();

        let result = session.query("SELECT 1", fast(1).exit_on_fail(false)).unwrap();
        assert_eq!(result, None);
        assert_eq!(driver.count(|c| matches!(c, Call::Query(_))), 2);
    }

    #[test]
    fn test_query_failure_with_exit_escalates() {
        let driver = ScriptedDriver::new();
        driver.push_error(DriverError::other("no such table: t"));
        let mut session = DatabaseSession::connect(&driver, creds()).unwrap();

        match session.query("SELECT * FROM t", RetryPolicy::default()) {
            Err(SqlHelperError::StatementFailed { attempts, sql, source }) => {
                assert_eq!(attempts, 1);
                assert_eq!(sql, "SELECT * FROM t");
                assert_eq!(source.message, "no such table: t");
            }
            other => panic!("Expected StatementFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_retry_succeeds_on_second_attempt() {
        let driver = ScriptedDriver::new();
        driver.push_error(DriverError::other("lock wait timeout"));
        driver.push_rows(users());
        let mut session = DatabaseSession::connect(&driver, creds()).unwrap();

        let (rows, logs) = capture_logs(|| session.query("SELECT id, name FROM users", fast(3)));
        assert_eq!(rows.unwrap().unwrap().len(), 2);
        assert_eq!(driver.count(|c| matches!(c, Call::Query(_))), 2);
        assert!(logs.contains("Error with query: lock wait timeout"));
        assert!(logs.contains("Attempt 2:"));
        assert!(!logs.contains("Attempt 3:"));
        assert!(logs.contains("Success!"));
    }

    #[test]
    fn test_retries_make_exactly_n_plus_one_attempts_with_cooldown() {
        let driver = ScriptedDriver::new();
        for _ in 0..5 {
            driver.push_error(DriverError::other("down"));
        }
        let mut session = DatabaseSession::connect(&driver, creds()).unwrap();

        let cooldown = Duration::from_millis(30);
        let policy = RetryPolicy::default()
            .with_retries(2)
            .with_cooldown(cooldown)
            .exit_on_fail(false);

        let started = Instant::now();
        let result = session.query("SELECT 1", policy).unwrap();
        let elapsed = started.elapsed();

        assert_eq!(result, None);
        assert_eq!(driver.count(|c| matches!(c, Call::Query(_))), 3);
        assert!(elapsed >= cooldown * 2);
    }

    #[test]
    fn test_retry_failure_logs_latest_error() {
        let driver = ScriptedDriver::new();
        driver.push_error(DriverError::other("first failure"));
        driver.push_error(DriverError::other("second failure"));
        let mut session = DatabaseSession::connect(&driver, creds()).unwrap();

        let (result, logs) = capture_logs(|| session.query("SELECT 1", fast(1)));
        match result {
            Err(SqlHelperError::StatementFailed { attempts, source, .. }) => {
                assert_eq!(attempts, 2);
                assert_eq!(source.message, "second failure");
            }
            other => panic!("Expected StatementFailed, got {:?}", other),
        }
        assert!(logs.contains("Error with query: first failure"));
        assert!(logs.contains("Error with query: second failure"));
        assert!(logs.contains("Query was:"));
    }

    #[test]
    fn test_execute_commits_on_success() {
        let driver = ScriptedDriver::new();
        let mut session = DatabaseSession::connect(&driver, creds()).unwrap();

        session.execute("UPDATE users SET name = 'x'", RetryPolicy::default()).unwrap();
        assert_eq!(
            driver.calls(),
            vec![
                Call::Connect,
                Call::Execute("UPDATE users SET name = 'x'".to_string()),
                Call::Commit,
            ]
        );
    }

    #[test]
    fn test_execute_retry_commits_before_success() {
        let driver = ScriptedDriver::new();
        driver.push_error(DriverError::other("deadlock"));
        let mut session = DatabaseSession::connect(&driver, creds()).unwrap();

        let (result, logs) = capture_logs(|| session.execute("DELETE FROM carts", fast(2)));
        result.unwrap();
        assert_eq!(
            driver.calls(),
            vec![
                Call::Connect,
                Call::Execute("DELETE FROM carts".to_string()),
                Call::Execute("DELETE FROM carts".to_string()),
                Call::Commit,
            ]
        );
        assert!(logs.contains("Error with statement: deadlock"));
        assert!(logs.contains("Statement: DELETE FROM carts"));
        assert!(logs.contains("Success!"));
    }

    #[test]
    fn test_execute_failure_without_exit_is_ok() {
        let driver = ScriptedDriver::new();
        driver.push_error(DriverError::other("read only"));
        let mut session = DatabaseSession::connect(&driver, creds()).unwrap();

        session
            .execute("DROP TABLE t", RetryPolicy::default().exit_on_fail(false))
            .unwrap();
        assert_eq!(driver.count(|c| *c == Call::Commit), 0);
    }

    #[test]
    fn test_clear_table_uses_driver_truncate() {
        let driver = ScriptedDriver::new();
        let mut session = DatabaseSession::connect(&driver, creds()).unwrap();

        let (result, logs) = capture_logs(|| session.clear_table("orders"));
        result.unwrap();
        assert!(logs.contains("Truncating/Clearing table db1/orders"));
        assert!(driver.calls().contains(&Call::Execute("TRUNCATE orders".to_string())));
        assert!(driver.calls().contains(&Call::Commit));
    }

    #[test]
    fn test_connect_access_denied() {
        let driver = ScriptedDriver::new();
        driver.fail_connect(DriverError::new(DriverErrorKind::AccessDenied, "Access denied for user 'app'"));

        let (result, logs) = capture_logs(|| DatabaseSession::connect(&driver, creds()));
        match result {
            Err(SqlHelperError::Connect(ConnectError::AccessDenied { host })) => assert_eq!(host, "db1"),
            Err(other) => panic!("Expected AccessDenied, got {:?}", other),
            Ok(_) => panic!("Expected AccessDenied, got a session"),
        }
        assert!(logs.contains("Something is wrong with your user name or password"));
    }

    #[test]
    fn test_connect_unknown_database() {
        let driver = ScriptedDriver::new();
        driver.fail_connect(DriverError::new(DriverErrorKind::UnknownDatabase, "Unknown database 'shop'"));

        let (result, logs) = capture_logs(|| DatabaseSession::connect(&driver, creds()));
        match result {
            Err(SqlHelperError::Connect(ConnectError::UnknownDatabase { database, .. })) => {
                assert_eq!(database.as_deref(), Some("shop"));
            }
            Err(other) => panic!("Expected UnknownDatabase, got {:?}", other),
            Ok(_) => panic!("Expected UnknownDatabase, got a session"),
        }
        assert!(logs.contains("Could not find database shop on db1"));
    }

    #[test]
    fn test_connect_other_error_logs_details() {
        let driver = ScriptedDriver::new();
        driver.fail_connect(DriverError::other("connection refused"));

        let (result, logs) = capture_logs(|| DatabaseSession::connect(&driver, creds()));
        assert!(matches!(
            result,
            Err(SqlHelperError::Connect(ConnectError::Other { .. }))
        ));
        assert!(logs.contains("ERROR/CONNECTION: Details-> connection refused"));
    }

    #[test]
    fn test_connect_success_logs_debug() {
        let driver = ScriptedDriver::new();
        let (result, logs) = capture_logs(|| DatabaseSession::connect(&driver, creds()));
        assert!(result.is_ok());
        assert!(logs.contains("DEBUG"));
        assert!(logs.contains("Successfully connected to db1"));
    }
}
