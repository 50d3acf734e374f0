//! Storage abstractions implemented by `picshare_storage` and faked in tests.

mod traits;

use thiserror::Error;

pub use traits::*;

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    /// A unique constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}
