//! Unified error type.

use std::time::Duration;

use thiserror::Error;

/// The error type returned by keel's fallible operations.
///
/// Application-level failures (401, 404, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: configuration, database, log sinks, sockets.
#[derive(Debug, Error)]
pub enum Error {
    /// A required environment input is missing or malformed.
    #[error("invalid configuration for {var}: {reason}")]
    Configuration { var: &'static str, reason: String },

    /// Opening or pinging the database failed. Never retried by keel.
    #[error("database connection failed: {0}")]
    Connection(#[from] sqlx::Error),

    /// The remote log server could not be resolved or connected.
    ///
    /// [`get_logger`](crate::logger::get_logger) treats this as fatal.
    #[error("remote log sink {addr} unreachable: {source}")]
    LoggerInit {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A deadline derived from a [`RootContext`](crate::db::RootContext) expired.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}
