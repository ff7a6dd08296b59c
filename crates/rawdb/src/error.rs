//! Error types for the raw database

use tessera_serialization::SerializationError;
use thiserror::Error;

/// Raw database errors.
#[derive(Debug, Error)]
pub enum RawDatabaseError {
    /// Bad file/page/region addressing or operation parameters
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not allowed in the transaction's current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An operation rejected the transaction during validation
    #[error("operation aborted: {0}")]
    Aborted(String),

    /// Page store I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Batch checkpoint could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Configuration could not be parsed or is out of range
    #[error("configuration error: {0}")]
    Config(String),

    /// Persisted data failed an integrity check
    #[error("corruption: {0}")]
    Corruption(String),
}

impl RawDatabaseError {
    /// Create an invalid-argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        RawDatabaseError::InvalidArgument(message.into())
    }

    /// Create an invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        RawDatabaseError::InvalidState(message.into())
    }

    /// Create an aborted error
    pub fn aborted(message: impl Into<String>) -> Self {
        RawDatabaseError::Aborted(message.into())
    }

    /// Check if this error indicates damaged persisted data
    pub fn is_corruption(&self) -> bool {
        match self {
            RawDatabaseError::Corruption(_) => true,
            RawDatabaseError::Serialization(e) => e.is_corruption(),
            _ => false,
        }
    }
}

/// Result type for raw database operations.
pub type Result<T> = std::result::Result<T, RawDatabaseError>;
