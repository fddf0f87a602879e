/// Database Module
///
/// The database layer is split into three concerns:
/// - **Connection** (`connection.rs`): credentials and the driver seam, plus the SQLite driver
/// - **Query** (`query.rs`): dynamically typed values and row materialization
/// - **Session** (`session.rs`): one open connection with retrying query/execute
///
/// ## Error Handling
///
/// Drivers report `DriverError`; the session turns exhausted retries and
/// connect failures into `SqlHelperError`.
pub mod connection;
pub mod query;
pub mod session;

pub use connection::*;
pub use query::*;
pub use session::*;
