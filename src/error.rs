//! Unified error types for Tessera.
//!
//! This module provides one error type that wraps the errors of the
//! serialization layer and the raw database and presents a consistent
//! interface to users.

use tessera_rawdb::RawDatabaseError;
use tessera_serialization::SerializationError;
use thiserror::Error;

/// All Tessera errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad parameters: unknown type, out-of-bounds page access, bad registration
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Call not allowed in the current session or transaction state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A byte stream could not be decoded
    #[error("serialization error: {0}")]
    Serialization(SerializationError),

    /// An operation rejected its transaction
    #[error("aborted: {0}")]
    Aborted(String),

    /// Configuration could not be parsed or is out of range
    #[error("configuration error: {0}")]
    Config(String),

    /// Persisted data failed an integrity check
    #[error("corruption: {0}")]
    Corruption(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Tessera operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this is an invalid-argument error.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_) | Error::Serialization(SerializationError::InvalidArgument(_))
        )
    }

    /// Check if this error means a stream or persisted data is damaged.
    ///
    /// Such errors cannot be retried.
    pub fn is_corruption(&self) -> bool {
        match self {
            Error::Corruption(_) => true,
            Error::Serialization(e) => e.is_corruption(),
            _ => false,
        }
    }
}

// Serialization errors keep their detail; only state and argument misuse
// is folded into the shared variants.
impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        match e {
            SerializationError::InvalidState(msg) => Error::InvalidState(msg),
            other => Error::Serialization(other),
        }
    }
}

impl From<RawDatabaseError> for Error {
    fn from(e: RawDatabaseError) -> Self {
        match e {
            RawDatabaseError::InvalidArgument(msg) => Error::InvalidArgument(msg),
            RawDatabaseError::InvalidState(msg) => Error::InvalidState(msg),
            RawDatabaseError::Aborted(msg) => Error::Aborted(msg),
            RawDatabaseError::Io(e) => Error::Io(e),
            RawDatabaseError::Serialization(e) => Error::from(e),
            RawDatabaseError::Config(msg) => Error::Config(msg),
            RawDatabaseError::Corruption(msg) => Error::Corruption(msg),
        }
    }
}
