//! Crash-safe directory replacement.
//!
//! [`DirectoryReplace`] drives the staging protocol for one directory entry:
//!
//! 1. [`prepare`](DirectoryReplace::prepare) creates `~~[original~]new`; the
//!    caller writes the new contents into it
//! 2. [`mark_consistent`](DirectoryReplace::mark_consistent) renames it to
//!    `~[original~]new`
//! 3. [`promote`](DirectoryReplace::promote) moves child directories still
//!    living in the original, removes the original and renames the marker to
//!    `new`
//!
//! A crash before step 2 leaves a `~~` entry that is discarded on the next
//! load; a crash after step 2 leaves a `~` entry that [`promote_marker`]
//! completes. Either way a reader sees the old or the new entry in full.

use crate::error::{StorageError, StorageResult};
use crate::fs;
use crate::retry::RetryPolicy;
use crate::staging::{validate_entry_name, MarkerState, StagingMarker};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One in-flight replacement of a directory entry.
#[derive(Debug, Clone)]
pub struct DirectoryReplace {
    parent: PathBuf,
    marker: StagingMarker,
    policy: RetryPolicy,
}

impl DirectoryReplace {
    /// Creates a replacement of `parent/original` by `parent/new`.
    ///
    /// Pass `original = None` for a fresh insert.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidName`] if either name cannot be encoded
    /// in a staging marker.
    pub fn new(
        parent: &Path,
        original: Option<&str>,
        new: &str,
        policy: RetryPolicy,
    ) -> StorageResult<Self> {
        validate_entry_name(new)?;
        if let Some(original) = original {
            validate_entry_name(original)?;
        }

        Ok(Self {
            parent: parent.to_path_buf(),
            marker: StagingMarker::staging(original, new),
            policy,
        })
    }

    /// Returns the path of the inconsistent staging directory.
    #[must_use]
    pub fn staging_path(&self) -> PathBuf {
        self.parent.join(self.marker.to_string())
    }

    /// Returns the path of the consistent marker directory.
    #[must_use]
    pub fn consistent_path(&self) -> PathBuf {
        self.parent
            .join(self.marker.clone().into_consistent().to_string())
    }

    /// Returns the final path of the entry.
    #[must_use]
    pub fn final_path(&self) -> PathBuf {
        self.parent.join(&self.marker.new)
    }

    /// Creates an empty staging directory and returns its path.
    ///
    /// # Errors
    ///
    /// Fails with `AlreadyExists` if the final name is taken by an entry
    /// other than the one being replaced. Nothing is written in that case.
    pub async fn prepare(&self) -> StorageResult<PathBuf> {
        let replaces_itself = self.marker.original.as_deref() == Some(self.marker.new.as_str());
        if !replaces_itself && fs::exists(&self.final_path()).await? {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", self.final_path().display()),
            )));
        }

        tokio::fs::create_dir_all(&self.parent).await?;

        let staging = self.staging_path();
        fs::remove_path(&staging).await?;
        tokio::fs::create_dir(&staging).await?;
        Ok(staging)
    }

    /// Renames the staging directory to its consistent marker name.
    pub async fn mark_consistent(&self) -> StorageResult<PathBuf> {
        let consistent = self.consistent_path();
        fs::remove_path(&consistent).await?;
        fs::rename(&self.staging_path(), &consistent, &self.policy).await?;
        Ok(consistent)
    }

    /// Replaces the original entry with the consistent marker directory.
    pub async fn promote(&self) -> StorageResult<PathBuf> {
        let marker = self.marker.clone().into_consistent();
        promote_marker(&self.parent, &marker, &self.policy).await
    }

    /// Runs all three steps, calling `write` to fill the staging directory.
    ///
    /// If `write` fails, the staging directory is removed and the error is
    /// returned; the original entry is untouched.
    pub async fn run<F, Fut, E>(&self, write: F) -> Result<PathBuf, E>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: std::future::Future<Output = Result<(), E>>,
        E: From<StorageError>,
    {
        let staging = self.prepare().await?;

        if let Err(err) = write(staging.clone()).await {
            if let Err(cleanup) = fs::remove_path(&staging).await {
                debug!(path = %staging.display(), error = %cleanup, "failed to discard staging directory");
            }
            return Err(err);
        }

        self.mark_consistent().await?;
        Ok(self.promote().await?)
    }
}

/// Completes a consistent marker found in `parent`.
///
/// Child directories still inside the original entry are moved into the
/// marker directory, the original is removed and the marker is renamed to its
/// final name. Safe to run again after a crash at any point.
///
/// # Errors
///
/// Returns [`StorageError::MalformedMarker`] for an inconsistent marker,
/// which must be discarded rather than promoted.
pub async fn promote_marker(
    parent: &Path,
    marker: &StagingMarker,
    policy: &RetryPolicy,
) -> StorageResult<PathBuf> {
    if marker.state != MarkerState::Consistent {
        return Err(StorageError::MalformedMarker(marker.to_string()));
    }

    let marker_path = parent.join(marker.to_string());
    let final_path = parent.join(&marker.new);
    let original_path = parent.join(marker.original.as_deref().unwrap_or(&marker.new));

    fs::move_subdirectories(&original_path, &marker_path, policy).await?;
    fs::remove_path(&original_path).await?;
    if original_path != final_path {
        fs::remove_path(&final_path).await?;
    }
    fs::rename(&marker_path, &final_path, policy).await?;
    fs::sync_directory(parent).await?;

    debug!(path = %final_path.display(), "promoted staging marker");
    Ok(final_path)
}
