//! Error types for the serialization layer
//!
//! Every error here is fatal for the session that raised it: a truncated or
//! corrupted byte stream cannot be resynchronized, so callers should surface
//! the error rather than retry.

use thiserror::Error;

/// Serialization and deserialization failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SerializationError {
    /// Bad constructor or registration parameters, or a missing registry entry
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A primitive read ran past the end of the buffer
    #[error("unexpected end of stream")]
    EndOfStream,

    /// An object decoder consumed more bytes than the object declared
    #[error("end of object reached while decoding {type_name}: declared {declared} bytes, consumed {consumed}")]
    EndOfObject {
        /// Type whose decoder over-read
        type_name: String,
        /// Body length recorded by the writer
        declared: usize,
        /// Bytes actually consumed by the decoder
        consumed: usize,
    },

    /// Region contents consumed more bytes than the region declared
    #[error("end of region reached: declared {declared} bytes, consumed {consumed}")]
    EndOfRegion {
        /// Region length recorded by the writer
        declared: usize,
        /// Bytes actually consumed
        consumed: usize,
    },

    /// Bad magic header or malformed record-type byte
    #[error("unsupported stream format: {0}")]
    UnsupportedStreamFormat(String),

    /// Stream version outside the reader's compatible range
    #[error("incompatible stream version {version}, supported range is [{min}, {max}]")]
    IncompatibleStreamVersion {
        /// Version found in the stream header
        version: u32,
        /// Lowest version the reader accepts
        min: u32,
        /// Highest version the reader accepts
        max: u32,
    },

    /// Region begin/end misuse or an unresolved back-reference
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed UTF-8 or UTF-16 data
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Result type for serialization operations.
pub type Result<T> = std::result::Result<T, SerializationError>;

impl SerializationError {
    /// Create an invalid-argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        SerializationError::InvalidArgument(message.into())
    }

    /// Create an invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        SerializationError::InvalidState(message.into())
    }

    /// Create an unsupported-format error
    pub fn unsupported_format(message: impl Into<String>) -> Self {
        SerializationError::UnsupportedStreamFormat(message.into())
    }

    /// Check if this error indicates a corrupted or truncated stream.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            SerializationError::EndOfStream
                | SerializationError::EndOfObject { .. }
                | SerializationError::EndOfRegion { .. }
                | SerializationError::UnsupportedStreamFormat(_)
                | SerializationError::Encoding(_)
        )
    }
}

impl From<std::string::FromUtf8Error> for SerializationError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        SerializationError::Encoding(e.to_string())
    }
}

impl From<std::io::Error> for SerializationError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => SerializationError::EndOfStream,
            _ => SerializationError::InvalidState(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_eof_maps_to_end_of_stream() {
        let io = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
        assert_eq!(SerializationError::from(io), SerializationError::EndOfStream);
    }

    #[test]
    fn test_corruption_classification() {
        assert!(SerializationError::EndOfStream.is_corruption());
        assert!(SerializationError::unsupported_format("bad").is_corruption());
        assert!(!SerializationError::invalid_argument("x").is_corruption());
        assert!(!SerializationError::invalid_state("x").is_corruption());
    }

    #[test]
    fn test_end_of_object_message_names_type() {
        let err = SerializationError::EndOfObject {
            type_name: "Node".to_string(),
            declared: 4,
            consumed: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains("Node"));
        assert!(msg.contains("declared 4"));
    }
}
