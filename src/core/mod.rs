/// Core Module for sqlhelper
///
/// This module contains the session, driver seam and error types that the
/// rest of the crate and the `sqlhelper` binary are built on.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{ConnectError, DriverError, DriverErrorKind, Result, SqlHelperError};
