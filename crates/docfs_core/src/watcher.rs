//! External modification watcher.
//!
//! Polls the data directory (and the blob directory, if configured) and
//! compares stat fingerprints between scans. Changes that coincide with this
//! process's own writes are absorbed into the baseline; anything else is
//! reported through the `on_modification` callback, at most once per
//! debounce window.
//!
//! The watcher never mutates state and never takes the persistence queue.

use crate::error::StoreResult;
use crate::journal::JOURNAL_FILE;
use crate::persistence::WriteEpoch;
use docfs_storage::{fs, StagingMarker};
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Size and modification time of every tracked entry, by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint(BTreeMap<PathBuf, (u64, Option<SystemTime>)>);

impl Fingerprint {
    /// Number of tracked entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of paths added, removed or changed relative to `other`.
    #[must_use]
    pub fn changes_since(&self, other: &Self) -> usize {
        let changed = self
            .0
            .iter()
            .filter(|(path, stat)| other.0.get(*path) != Some(*stat))
            .count();
        let removed = other.0.keys().filter(|p| !self.0.contains_key(*p)).count();
        changed + removed
    }
}

fn is_ignored(root: &Path, dir: &Path, name: &str) -> bool {
    StagingMarker::is_marker(name) || (dir == root && name == JOURNAL_FILE)
}

/// Stats every entry below `root`. A missing root has an empty fingerprint.
pub async fn fingerprint(root: &Path) -> StoreResult<Fingerprint> {
    let mut entries = BTreeMap::new();
    if !fs::exists(root).await? {
        return Ok(Fingerprint(entries));
    }

    let mut queue = VecDeque::from([root.to_path_buf()]);
    while let Some(dir) = queue.pop_front() {
        let listing = match fs::list_dir(&dir).await {
            Ok(listing) => listing,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        };
        for entry in listing {
            if is_ignored(root, &dir, &entry.name) {
                continue;
            }
            let metadata = match tokio::fs::metadata(&entry.path).await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let size = if entry.is_dir { 0 } else { metadata.len() };
            entries.insert(entry.path.clone(), (size, metadata.modified().ok()));
            if entry.is_dir {
                queue.push_back(entry.path);
            }
        }
    }
    Ok(Fingerprint(entries))
}

/// Polling watcher over the data and blob directories.
#[derive(Debug, Clone)]
pub struct Watcher {
    roots: Vec<PathBuf>,
    epoch: WriteEpoch,
    interval: Duration,
    debounce: Duration,
}

impl Watcher {
    /// Creates a watcher. `epoch` is the write epoch of the persistence
    /// layer writing to `data_directory`.
    #[must_use]
    pub fn new(
        data_directory: impl Into<PathBuf>,
        blob_storage_directory: Option<PathBuf>,
        epoch: WriteEpoch,
        interval: Duration,
        debounce: Duration,
    ) -> Self {
        let mut roots = vec![data_directory.into()];
        roots.extend(blob_storage_directory);
        Self {
            roots,
            epoch,
            interval,
            debounce,
        }
    }

    /// Fingerprints every watched root.
    pub async fn scan(&self) -> StoreResult<Vec<Fingerprint>> {
        let mut fingerprints = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            fingerprints.push(fingerprint(root).await?);
        }
        Ok(fingerprints)
    }

    /// Starts polling as a background task until `shutdown` flips to true
    /// or its sender is dropped.
    pub fn start<F, Fut>(
        self,
        mut shutdown: watch::Receiver<bool>,
        on_modification: F,
    ) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut baseline_epoch = self.epoch.current();
            let mut baseline = match self.scan().await {
                Ok(baseline) => baseline,
                Err(e) => {
                    warn!(error = %e, "initial watcher scan failed");
                    Vec::new()
                }
            };
            let mut pending = false;
            let mut last_report: Option<Instant> = None;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("watcher shutting down");
                            break;
                        }
                        continue;
                    }
                }

                let before = self.epoch.current();
                let scan = match self.scan().await {
                    Ok(scan) => scan,
                    Err(e) => {
                        warn!(error = %e, "watcher scan failed");
                        continue;
                    }
                };
                let after = self.epoch.current();

                // Own writes since the baseline, or one still running.
                if before != after || before % 2 == 1 || before != baseline_epoch {
                    baseline = scan;
                    baseline_epoch = after;
                    continue;
                }

                if scan != baseline {
                    let changes: usize = scan
                        .iter()
                        .zip(&baseline)
                        .map(|(now, then)| now.changes_since(then))
                        .sum();
                    debug!(changes, "external modification detected");
                    baseline = scan;
                    pending = true;
                }

                let quiet = last_report.map_or(true, |at| at.elapsed() >= self.debounce);
                if pending && quiet {
                    pending = false;
                    last_report = Some(Instant::now());
                    info!("reporting external modification");
                    on_modification().await;
                    // The callback may have repaired the tree.
                    baseline_epoch = self.epoch.current();
                    if let Ok(scan) = self.scan().await {
                        baseline = scan;
                    }
                }
            }
        })
    }
}
