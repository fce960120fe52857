//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A rename kept failing after every retry attempt.
    #[error("rename {from:?} -> {to:?} failed after {attempts} attempts: {source}")]
    RenameFailed {
        /// Source path.
        from: PathBuf,
        /// Destination path.
        to: PathBuf,
        /// Number of attempts made.
        attempts: u32,
        /// The last error observed.
        #[source]
        source: io::Error,
    },

    /// An entry name looks like a staging marker but cannot be parsed.
    #[error("malformed staging marker: {0}")]
    MalformedMarker(String),

    /// A name cannot be used for an entry because it collides with the
    /// staging marker syntax or the path separator.
    #[error("invalid entry name {0:?}")]
    InvalidName(String),
}

impl StorageError {
    /// Returns true if the underlying cause is a missing file or directory.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            Self::RenameFailed { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
