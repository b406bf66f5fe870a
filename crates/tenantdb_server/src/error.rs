//! Error types for the server.

use tenantdb_core::CoreError;
use tenantdb_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while serving connections.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Store error.
    #[error("database error: {0}")]
    Database(#[from] CoreError),

    /// Wire protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection limit reached.
    #[error("connection limit of {0} reached")]
    TooManyConnections(usize),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if the peer caused this error.
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::Database(e) => e.is_client_error(),
            ServerError::Protocol(e) => !e.is_fatal(),
            ServerError::TooManyConnections(_) => true,
            ServerError::Io(_) => false,
        }
    }
}
