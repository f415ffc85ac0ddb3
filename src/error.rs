//! Error types for sqlbus.

use thiserror::Error;

/// Main error type for all sqlbus operations.
#[derive(Debug, Error)]
pub enum SqlBusError {
    /// I/O error during socket setup or beacon transmission.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ZeroMQ error (socket creation, bind, send, receive, poll).
    #[error("zmq error: {0}")]
    Zmq(#[from] zmq::Error),

    /// Configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// A multipart receive ended while the previous part had the
    /// "more" flag set.
    #[error("incomplete multipart message")]
    Incomplete,

    /// Sending the query failed; carries the send-stage diagnostic.
    #[error("{0}")]
    Send(String),

    /// A deadline fired before the query completed.
    #[error("{0}")]
    Timeout(String),

    /// The middleman reported a failure, or the response itself was
    /// unusable. Any rows that accompanied the failure are preserved.
    #[error("{message}")]
    Query {
        /// Middleman-reported (or locally synthesized) error string.
        message: String,
        /// Rows included alongside the failure, if any.
        rows: Vec<String>,
    },

    /// The client is not running (never initialised, or already
    /// finalised).
    #[error("client is not running")]
    NotRunning,
}

impl SqlBusError {
    /// Rows attached to a middleman-reported failure, if any.
    pub fn rows(&self) -> &[String] {
        match self {
            SqlBusError::Query { rows, .. } => rows,
            _ => &[],
        }
    }
}

/// Result type alias using SqlBusError.
pub type Result<T> = std::result::Result<T, SqlBusError>;
