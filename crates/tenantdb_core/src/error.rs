//! Error types for TenantDB core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in TenantDB core operations.
///
/// Missing entities are never errors: loads return `None` and deletes
/// return `false`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An argument was rejected before any work was done.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected argument.
        message: String,
    },

    /// A lock-acquiring load closed a wait cycle with another connection.
    ///
    /// The transaction depth of the failing connection is reset to zero.
    #[error("deadlock detected; all transaction levels were rolled back")]
    Deadlock,

    /// A cursor was pulled after it was closed or exhausted.
    #[error("cursor {cursor_id} is closed")]
    CursorClosed {
        /// Id of the closed cursor.
        cursor_id: u64,
    },

    /// A query could not be constructed or decoded.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },

    /// The store refuses access from the current context.
    #[error("entities cannot be queried, loaded or saved from this context")]
    Forbidden,

    /// The connection has not authenticated its execution context.
    #[error("execution context is not authenticated")]
    NotAuthenticated,

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The blob collaborator failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },

    /// The connection to a remote store failed.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// A remote peer sent something unexpected.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the violation.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if this error is a deadlock.
    pub fn is_deadlock(&self) -> bool {
        matches!(self, Self::Deadlock)
    }

    /// Returns true if the caller caused this error and retrying the same
    /// request cannot succeed.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. }
                | Self::InvalidQuery { .. }
                | Self::CursorClosed { .. }
                | Self::Forbidden
                | Self::NotAuthenticated
                | Self::InvalidOperation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::CursorClosed { cursor_id: 7 };
        assert!(err.to_string().contains('7'));

        let err = CoreError::invalid_query("unknown operator '~'");
        assert_eq!(err.to_string(), "invalid query: unknown operator '~'");
    }

    #[test]
    fn error_classification() {
        assert!(CoreError::Deadlock.is_deadlock());
        assert!(!CoreError::Deadlock.is_client_error());
        assert!(CoreError::invalid_argument("empty id").is_client_error());
        assert!(CoreError::Forbidden.is_client_error());
        assert!(!CoreError::transport("reset").is_client_error());
    }
}
