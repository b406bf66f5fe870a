//! CLI command implementations.

pub mod inspect;
pub mod query;
pub mod serve;

use std::path::Path;
use tenantdb_core::{CoreError, DatabaseRegistry, FileBlobStore};
use tenantdb_server::ServerError;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// A command-line argument could not be interpreted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The named database does not exist.
    #[error("no database named '{0}'")]
    UnknownDatabase(String),

    /// Database error.
    #[error(transparent)]
    Database(#[from] CoreError),

    /// Server error.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Output could not be serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Output format of commands that print reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CliError::InvalidArgument(format!(
                "unknown format '{other}' (expected text or json)"
            ))),
        }
    }
}

/// Opens the registry stored in `data_dir`.
pub fn open_registry(data_dir: &Path) -> Result<DatabaseRegistry<FileBlobStore>, CliError> {
    let blobs = FileBlobStore::open(data_dir)?;
    Ok(DatabaseRegistry::open(blobs)?)
}
