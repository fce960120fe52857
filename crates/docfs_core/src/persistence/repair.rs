//! Repair pass run before every load.
//!
//! Resolves what interrupted writes left behind:
//!
//! - `~~…` entries anywhere are discarded
//! - `~[original~]new` directories are promoted to `new`
//! - `~name` files at the root (interrupted compaction or journal rewrite)
//!   are discarded
//! - malformed marker names are reported and left alone

use crate::error::StoreResult;
use docfs_storage::{fs, promote_marker, MarkerState, RetryPolicy, StagingMarker, INCONSISTENT_PREFIX};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What the repair pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Inconsistent staging entries removed.
    pub discarded: Vec<PathBuf>,
    /// Consistent markers promoted to their final names.
    pub promoted: Vec<PathBuf>,
    /// Interrupted root file rewrites removed.
    pub removed_files: Vec<PathBuf>,
    /// Marker-like names that could not be parsed.
    pub malformed: Vec<PathBuf>,
}

impl RepairReport {
    /// Returns true if the tree needed no repair.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.discarded.is_empty()
            && self.promoted.is_empty()
            && self.removed_files.is_empty()
            && self.malformed.is_empty()
    }
}

/// Repairs the tree below `root`.
pub async fn repair(root: &Path, policy: &RetryPolicy) -> StoreResult<RepairReport> {
    let mut report = RepairReport::default();
    if !fs::exists(root).await? {
        return Ok(report);
    }

    let mut queue = VecDeque::from([root.to_path_buf()]);
    while let Some(dir) = queue.pop_front() {
        let at_root = dir == root;
        let entries = match fs::list_dir(&dir).await {
            Ok(entries) => entries,
            // Removed by a promotion earlier in this pass.
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            if entry.name.starts_with(INCONSISTENT_PREFIX) {
                warn!(path = %entry.path.display(), "discarding interrupted write");
                fs::remove_path(&entry.path).await?;
                report.discarded.push(entry.path);
                continue;
            }

            if !StagingMarker::is_marker(&entry.name) {
                if entry.is_dir {
                    queue.push_back(entry.path);
                }
                continue;
            }

            if !entry.is_dir {
                if at_root {
                    warn!(path = %entry.path.display(), "discarding interrupted file rewrite");
                    fs::remove_path(&entry.path).await?;
                    report.removed_files.push(entry.path);
                }
                continue;
            }

            match StagingMarker::parse(&entry.name) {
                Ok(Some(marker)) if marker.state == MarkerState::Consistent => {
                    let promoted = promote_marker(&dir, &marker, policy).await?;
                    warn!(path = %promoted.display(), "completed interrupted rename");
                    report.promoted.push(promoted.clone());
                    queue.push_back(promoted);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %entry.path.display(), error = %e, "leaving malformed staging marker untouched");
                    report.malformed.push(entry.path);
                }
            }
        }
    }

    if !report.is_clean() {
        info!(
            discarded = report.discarded.len(),
            promoted = report.promoted.len(),
            removed_files = report.removed_files.len(),
            malformed = report.malformed.len(),
            "repaired data directory"
        );
    }
    Ok(report)
}
