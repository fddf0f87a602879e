// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod config;
pub mod sql;
pub mod test_utils;

pub use crate::core::db::{Credentials, DatabaseSession, ResultRow, RetryPolicy, SqliteDriver, Value};
pub use crate::core::{Result, SqlHelperError};
pub use crate::sql::list_to_sql_array;
