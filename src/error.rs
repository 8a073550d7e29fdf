//! Error taxonomy for the dispatch core.
//!
//! Driver diagnostics are carried verbatim in the message; nothing is
//! reworded before it reaches the caller.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No live handle registered under this connection id.
    #[error("connection '{0}' not found")]
    ConnectionNotFound(String),

    /// The service could not be reached or the connection string was rejected.
    #[error("failed to connect: {0}")]
    Connection(String),

    /// Operation name outside the allow-list. Never reaches the service.
    #[error(
        "unsupported operation '{0}'. Must be one of: find, findOne, insertOne, insertMany, \
         updateOne, updateMany, deleteOne, deleteMany, aggregate"
    )]
    UnsupportedOperation(String),

    /// The service rejected the request (bad filter shape, constraint violation, ...).
    #[error("query failed: {0}")]
    Execution(String),

    /// Caller-supplied JSON did not decode into the operation's argument shape.
    /// The serde diagnostic rides along as the source.
    #[error("invalid {what} JSON")]
    Serialization {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("operation timed out after {0} seconds")]
    Timeout(u64),
}

impl Error {
    /// Wrap a driver error, keeping its full display text.
    pub fn execution(err: impl std::fmt::Display) -> Self {
        Self::Execution(err.to_string())
    }

    pub fn connection(err: impl std::fmt::Display) -> Self {
        Self::Connection(err.to_string())
    }

    pub fn serialization(what: &'static str, source: serde_json::Error) -> Self {
        Self::Serialization { what, source }
    }
}
