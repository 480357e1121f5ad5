//! Error types for store operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors from store operations
///
/// Not-found is not an error: lookups return `Option` and deletes return
/// counts or booleans.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt collection file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid collection name: {0:?}")]
    InvalidCollectionName(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Channel error")]
    ChannelError,
}

impl DbError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for store operations
pub type DbResult<T> = Result<T, DbError>;
