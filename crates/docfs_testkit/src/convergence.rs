//! Convergence harness for two stores sharing one data directory.
//!
//! Stands in for two processes: the writer mutates, the reader picks the
//! changes up through the journal, and the result is compared with what a
//! full reload from disk produces.

use crate::fixtures::{open_store, test_config};
use docfs_core::{CacheSnapshot, Store, StoreResult};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Two independently loaded stores over the same directory.
pub struct ConvergenceHarness {
    /// The store making changes.
    pub writer: Store,
    /// The store observing them.
    pub reader: Store,
    temp_dir: TempDir,
}

impl ConvergenceHarness {
    /// Loads both stores over a fresh directory.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let writer = open_store(test_config(temp_dir.path())).await;
        let reader = open_store(test_config(temp_dir.path())).await;
        // Journal timestamps have millisecond resolution.
        tokio::time::sleep(Duration::from_millis(5)).await;
        Self {
            writer,
            reader,
            temp_dir,
        }
    }

    /// The shared data directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Replays the journal into the reader.
    pub async fn sync_reader(&self) -> StoreResult<()> {
        self.reader.sync().await
    }

    /// What a freshly loaded store sees on disk.
    pub async fn disk_snapshot(&self) -> std::sync::Arc<CacheSnapshot> {
        let fresh = open_store(test_config(self.path())).await;
        let snapshot = fresh.snapshot();
        fresh.close().await;
        snapshot
    }

    /// Returns true when writer, reader and disk hold the same documents.
    pub async fn converged(&self) -> bool {
        let disk = self.disk_snapshot().await;
        let writer = self.writer.snapshot();
        let reader = self.reader.snapshot();
        writer.same_content(&reader) && reader.same_content(&disk)
    }

    /// Closes both stores.
    pub async fn close(self) {
        self.writer.close().await;
        self.reader.close().await;
    }
}
