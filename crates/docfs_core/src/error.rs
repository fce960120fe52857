//! Error types for DocFS core.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem primitive error.
    #[error("storage error: {0}")]
    Storage(#[from] docfs_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An entity with the same name already exists under the same folder.
    #[error("duplicated entry: {name:?} already exists in {folder}")]
    DuplicateEntry {
        /// Name of the conflicting entity.
        name: String,
        /// Folder path (or `/` for the root).
        folder: String,
    },

    /// Entity name cannot be stored on disk.
    #[error("invalid entity name {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// Document failed validation.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// A flat file has too many unparsable records.
    #[error("{path:?} is corrupted: {corrupted} of {total} records unparsable")]
    CorruptedFile {
        /// The file.
        path: PathBuf,
        /// Number of unparsable records.
        corrupted: usize,
        /// Total number of records.
        total: usize,
    },

    /// The journal could not be parsed.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Queue admission timed out.
    #[error("persistence queue wait timed out after {waited:?}")]
    QueueTimeout {
        /// How long the operation waited.
        waited: Duration,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Entity set is not part of the loaded model.
    #[error("unknown entity set: {name}")]
    UnknownEntitySet {
        /// Name of the entity set.
        name: String,
    },

    /// Query or update document is malformed.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },

    /// `load` has not been called yet.
    #[error("store is not loaded")]
    NotLoaded,

    /// Store is closed.
    #[error("store is closed")]
    StoreClosed,
}

impl StoreError {
    /// Creates a duplicate entry error.
    pub fn duplicate_entry(name: impl Into<String>, folder: impl Into<String>) -> Self {
        Self::DuplicateEntry {
            name: name.into(),
            folder: folder.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an unknown entity set error.
    pub fn unknown_entity_set(name: impl Into<String>) -> Self {
        Self::UnknownEntitySet { name: name.into() }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Returns true if the caller may retry the same operation.
    ///
    /// Only queue admission timeouts qualify: the store state is unchanged and
    /// the queue may drain.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QueueTimeout { .. })
    }

    /// Returns true for errors raised before any disk mutation because the
    /// input was rejected.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateEntry { .. } | Self::InvalidName { .. } | Self::Validation { .. }
        )
    }
}
