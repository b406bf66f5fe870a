//! Protocol errors.

use std::io;
use thiserror::Error;
use tenantdb_core::CoreError;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or framing messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A payload could not be encoded.
    #[error("encode error: {message}")]
    Encode {
        /// Description of the failure.
        message: String,
    },

    /// A payload could not be decoded.
    #[error("decode error for message type {type_code}: {message}")]
    Decode {
        /// Type code of the frame.
        type_code: u16,
        /// Description of the failure.
        message: String,
    },

    /// A frame carried a type code no message uses.
    #[error("unknown message type {0}")]
    UnknownMessageType(u16),

    /// A frame declared a payload larger than allowed.
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Declared payload size.
        size: usize,
        /// Maximum accepted size.
        max: usize,
    },

    /// A frame ended before its declared length.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// The peer answered with a message of the wrong type.
    #[error("unexpected message: expected {expected}, got {actual}")]
    UnexpectedMessage {
        /// Expected type code.
        expected: u16,
        /// Received type code.
        actual: u16,
    },

    /// I/O error on the underlying stream.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// Creates an encode error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(type_code: u16, message: impl Into<String>) -> Self {
        Self::Decode {
            type_code,
            message: message.into(),
        }
    }

    /// Returns true if the stream is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Truncated { .. } | Self::FrameTooLarge { .. }
        )
    }
}

impl From<ProtocolError> for CoreError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => CoreError::transport(e.to_string()),
            ProtocolError::Truncated { .. } => CoreError::transport(err.to_string()),
            other => CoreError::protocol(other.to_string()),
        }
    }
}
