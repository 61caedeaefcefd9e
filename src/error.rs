//! Crate-wide error taxonomy.
//!
//! `Validation` failures are caught at input boundaries and surfaced as
//! user-facing messages; `Persistence` and `Storage` failures are logged at
//! the call site and re-thrown to the caller; `Network` failures are either
//! converted into a user message (address lookup) or absorbed by the
//! pending-order queue (order submission). Read-by-id misses are not errors:
//! they come back as `Ok(None)`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid input fields, rejected before any write occurs.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Underlying database read/write failure.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// On-device key-value storage failure (cart snapshot, pending queue).
    #[error("storage failure: {0}")]
    Storage(String),

    /// Outbound HTTP failure (CEP lookup, remote order submission).
    #[error("network failure: {0}")]
    Network(String),
}

impl Error {
    /// Build a `Validation` error from anything displayable.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Build a `Persistence` error with a short context prefix, mirroring
    /// the `map_err(|e| format!("insert payment: {e}"))` convention.
    pub fn persistence(context: &str, err: impl std::fmt::Display) -> Self {
        Error::Persistence(format!("{context}: {err}"))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

/// Convenience `Result` type.
pub type Result<T> = std::result::Result<T, Error>;
