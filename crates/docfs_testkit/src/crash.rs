//! Crash recovery testing for DocFS.
//!
//! Interrupts a document update at each step of the staging protocol, then
//! loads the directory with a fresh store and checks that the document is
//! either entirely old or entirely new and that no staging entry survives.
//!
//! ## Test Strategy
//!
//! 1. **Crash while staging** - the `~~` directory is discarded, old data wins
//! 2. **Crash after marking consistent** - the `~` directory is promoted
//! 3. **Crash mid-promotion** - the original is already gone, the marker is
//!    promoted
//! 4. **Crash during a flat file rewrite** - the `~` file is removed, old
//!    data wins
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docfs_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::with_temp_dir()?;
//! harness.run_all_tests().await;
//! assert!(harness.all_passed(), "{}", harness.summary());
//! ```

use crate::fixtures::{doc, open_store, test_config};
use docfs_core::persistence::tree::{document_directory, entry_name, write_document};
use docfs_core::{Document, Store, StoreError, StoreResult, Value, WriteOptions};
use docfs_storage::{fs, DirectoryReplace, RetryPolicy, StagingMarker};
use serde_json::json;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Points at which a write can be interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// The new contents are written into the `~~` staging directory.
    WhileStaging,
    /// The staging directory was renamed to its `~` consistent name.
    AfterConsistent,
    /// The original directory was removed but the marker not yet renamed.
    DuringPromotion,
    /// A flat file rewrite was written but not yet renamed over the file.
    DuringFlatRewrite,
}

impl CrashPoint {
    /// Every crash point.
    pub const ALL: [CrashPoint; 4] = [
        CrashPoint::WhileStaging,
        CrashPoint::AfterConsistent,
        CrashPoint::DuringPromotion,
        CrashPoint::DuringFlatRewrite,
    ];

    /// Whether the interrupted write is expected to survive recovery.
    pub fn survives(self) -> bool {
        matches!(self, CrashPoint::AfterConsistent | CrashPoint::DuringPromotion)
    }
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// The simulated crash point.
    pub point: CrashPoint,
    /// Content expected after recovery.
    pub expected: String,
    /// Content found after recovery.
    pub actual: Option<String>,
    /// Any error message.
    pub error: Option<String>,
}

/// Leaves `doc`'s directory exactly as a crash at `point` during an
/// in-place update to `updated` would.
///
/// `store` must be loaded and hold `doc` in its cache.
pub async fn interrupt_update(
    store: &Store,
    updated: &Document,
    point: CrashPoint,
) -> StoreResult<()> {
    let model = store.model()?;
    let snapshot = store.snapshot();
    let root = store.config().data_directory.clone();
    let set = updated
        .entity_set
        .as_deref()
        .ok_or_else(|| StoreError::validation("document has no entity set"))?;
    let descriptor = model.require(set)?;

    if point == CrashPoint::DuringFlatRewrite {
        let path = root.join(set);
        let line = serde_json::to_string(&updated.to_json())?;
        fs::write_file(&fs::rewrite_path(&path), line.as_bytes()).await?;
        return Ok(());
    }

    let relative = document_directory(&model, updated, &snapshot)?;
    let parent = relative
        .parent()
        .map_or_else(|| root.clone(), |p| root.join(p));
    let name = entry_name(updated)?;
    let replace = DirectoryReplace::new(&parent, Some(name), name, RetryPolicy::no_retry())?;

    let staging = replace.prepare().await?;
    write_document(&staging, updated, descriptor).await?;
    if point == CrashPoint::WhileStaging {
        return Ok(());
    }

    replace.mark_consistent().await?;
    if point == CrashPoint::DuringPromotion {
        fs::remove_path(&replace.final_path()).await?;
    }
    Ok(())
}

/// Every staging entry left below `root`.
pub async fn leftover_markers(root: &Path) -> StoreResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut queue = VecDeque::from([root.to_path_buf()]);
    while let Some(dir) = queue.pop_front() {
        for entry in fs::list_dir(&dir).await? {
            if StagingMarker::is_marker(&entry.name) {
                found.push(entry.path);
            } else if entry.is_dir {
                queue.push_back(entry.path);
            }
        }
    }
    Ok(found)
}

/// Runs every crash point against fresh directories.
pub struct CrashRecoveryHarness {
    temp_dir: TempDir,
    results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a harness in a fresh temporary directory.
    pub fn with_temp_dir() -> std::io::Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
            results: Vec::new(),
        })
    }

    /// Simulates one crash and checks recovery.
    pub async fn test_crash_point(&mut self, point: CrashPoint) -> CrashRecoveryResult {
        let root = self.temp_dir.path().join(format!("{point:?}"));
        let expected = if point.survives() { "new" } else { "old" }.to_string();
        let result = match run_scenario(&root, point).await {
            Ok(actual) => CrashRecoveryResult {
                passed: actual.as_deref() == Some(expected.as_str()),
                point,
                expected,
                actual,
                error: None,
            },
            Err(e) => CrashRecoveryResult {
                passed: false,
                point,
                expected,
                actual: None,
                error: Some(e.to_string()),
            },
        };
        self.results.push(result.clone());
        result
    }

    /// Runs every crash point.
    pub async fn run_all_tests(&mut self) -> Vec<CrashRecoveryResult> {
        let mut results = Vec::new();
        for point in CrashPoint::ALL {
            results.push(self.test_crash_point(point).await);
        }
        results
    }

    /// One line per result.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        for result in &self.results {
            let status = if result.passed { "PASS" } else { "FAIL" };
            summary.push_str(&format!(
                "[{status}] {:?}: expected {:?}, found {:?}",
                result.point, result.expected, result.actual
            ));
            if let Some(error) = &result.error {
                summary.push_str(&format!(" ({error})"));
            }
            summary.push('\n');
        }
        summary
    }

    /// Returns whether all tests passed.
    pub fn all_passed(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.passed)
    }
}

/// Writes "old", interrupts a write of "new" and returns what a fresh store
/// loads. Any leftover marker is reported as an error.
async fn run_scenario(root: &Path, point: CrashPoint) -> StoreResult<Option<String>> {
    let flat = point == CrashPoint::DuringFlatRewrite;
    let (set, field) = if flat {
        ("settings", "value")
    } else {
        ("templates", "content")
    };

    let mut fields = json!({ "name": "invoice", "key": "invoice" });
    fields[field] = json!("old");

    let store = open_store(test_config(root)).await;
    let original = store
        .insert(set, doc(fields), WriteOptions::default())
        .await?;

    let mut updated = store
        .snapshot()
        .get(set, &original.id)
        .cloned()
        .ok_or_else(|| StoreError::validation("inserted document missing from cache"))?;
    updated.set(field, Value::from("new"))?;
    interrupt_update(&store, &updated, point).await?;
    store.close().await;

    let recovered = open_store(test_config(root)).await;
    let leftovers = leftover_markers(root).await?;
    if !leftovers.is_empty() {
        return Err(StoreError::validation(format!(
            "staging entries survived recovery: {leftovers:?}"
        )));
    }
    let content = recovered
        .snapshot()
        .get(set, &original.id)
        .and_then(|d| d.get(field).and_then(|v| v.as_str().map(str::to_string)));
    recovered.close().await;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_consistent_writes_survive() {
        assert!(!CrashPoint::WhileStaging.survives());
        assert!(CrashPoint::AfterConsistent.survives());
        assert!(CrashPoint::DuringPromotion.survives());
        assert!(!CrashPoint::DuringFlatRewrite.survives());
    }

    #[tokio::test]
    async fn test_all_crash_recovery_scenarios() {
        let mut harness = CrashRecoveryHarness::with_temp_dir().unwrap();
        harness.run_all_tests().await;
        assert!(harness.all_passed(), "{}", harness.summary());
    }
}
