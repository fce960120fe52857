//! Shared mutation journal.
//!
//! Every committed mutation appends one line to `fs.journal` at the root of
//! the data directory. Processes sharing the directory replay the lines
//! written since their last sync instead of reloading the whole tree, and
//! fall back to a full reload whenever incremental replay is unsafe:
//!
//! - the previous sync is older than the staleness window, since the cleaner
//!   may have pruned lines in between
//! - a `reload` marker is found (written by transaction commits)
//! - the journal cannot be parsed
//!
//! ## Invariants
//!
//! - A line is appended only after the mutation is on disk and in the cache
//! - Replaying a line twice has the same effect as replaying it once
//! - A handle never replays lines it wrote itself
//! - The journal never holds data the directory tree does not

mod record;

pub use record::{parse, JournalOperation, JournalRecord};

use crate::cache::CacheSnapshot;
use crate::config::StoreConfig;
use crate::document::Document;
use crate::error::StoreResult;
use crate::model::DocumentModel;
use crate::types::Timestamp;
use docfs_storage::{fs, RetryPolicy};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// File name of the journal, at the root of the data directory.
pub const JOURNAL_FILE: &str = "fs.journal";

/// Why a sync requires a full reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    /// The previous sync is older than the staleness window.
    Stale,
    /// A reload marker was found.
    Marker,
    /// The journal could not be parsed.
    Corruption,
}

/// Result of [`Journal::sync`].
#[derive(Debug)]
pub enum SyncOutcome {
    /// Nothing new.
    Unchanged,
    /// New lines were replayed onto a copy of the cache.
    Applied {
        /// The cache with the lines applied.
        snapshot: CacheSnapshot,
        /// Number of lines replayed.
        records: usize,
    },
    /// The cache must be rebuilt from disk.
    Reload(ReloadReason),
}

/// The journal of one data directory.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    writer: String,
    policy: RetryPolicy,
    staleness: Duration,
    max_item_age: Duration,
    last_sync: Mutex<Timestamp>,
}

impl Journal {
    /// Creates the journal of the data directory in `config`.
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            path: config.data_directory.join(JOURNAL_FILE),
            writer: Uuid::new_v4().simple().to_string(),
            policy: config.rename_retry.clone(),
            staleness: config.sync_staleness,
            max_item_age: config.max_journal_item_age,
            last_sync: Mutex::new(Timestamp::now()),
        }
    }

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Id stamped on every record this handle writes.
    #[must_use]
    pub fn writer(&self) -> &str {
        &self.writer
    }

    /// When this process last caught up with the journal.
    #[must_use]
    pub fn last_sync(&self) -> Timestamp {
        *self.last_sync.lock()
    }

    /// Records that the cache reflects everything written before `at`.
    pub fn mark_synced(&self, at: Timestamp) {
        *self.last_sync.lock() = at;
    }

    async fn append(&self, record: JournalRecord) -> StoreResult<()> {
        let record = record.with_writer(self.writer.as_str());
        fs::append_line(&self.path, &record.to_line()?).await?;
        self.mark_synced(Timestamp::now());
        debug!(operation = ?record.operation, "appended journal record");
        Ok(())
    }

    /// Records an insert.
    pub async fn insert(&self, doc: &Document) -> StoreResult<()> {
        self.append(JournalRecord::mutation(JournalOperation::Insert, doc.clone()))
            .await
    }

    /// Records an update.
    pub async fn update(&self, doc: &Document) -> StoreResult<()> {
        self.append(JournalRecord::mutation(JournalOperation::Update, doc.clone()))
            .await
    }

    /// Records a removal.
    pub async fn remove(&self, doc: &Document) -> StoreResult<()> {
        self.append(JournalRecord::mutation(JournalOperation::Remove, doc.clone()))
            .await
    }

    /// Records a reload marker, written when a transaction commits or when
    /// a failed mutation left the tree ahead of the journal.
    pub async fn commit(&self) -> StoreResult<()> {
        self.append(JournalRecord::reload()).await
    }

    /// Catches `snapshot` up with lines other processes wrote since the last
    /// sync.
    ///
    /// Documents of entity sets missing from `model` are ignored. A parse
    /// failure appends a fresh reload marker so other readers rebuild too.
    pub async fn sync(
        &self,
        snapshot: &CacheSnapshot,
        model: &DocumentModel,
    ) -> StoreResult<SyncOutcome> {
        let started = Timestamp::now();
        let last_sync = self.last_sync();

        if last_sync.elapsed_until(started) > self.staleness {
            debug!(%last_sync, "journal sync is stale");
            return Ok(SyncOutcome::Reload(ReloadReason::Stale));
        }

        let modified = fs::modified(&self.path).await?.map(Timestamp::from_system_time);
        match modified {
            Some(modified) if modified >= last_sync => {}
            _ => {
                self.mark_synced(started);
                return Ok(SyncOutcome::Unchanged);
            }
        }

        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.mark_synced(started);
                return Ok(SyncOutcome::Unchanged);
            }
            Err(e) => return Err(e.into()),
        };

        let records = match parse(&contents) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "journal is corrupted, reloading");
                self.commit().await?;
                return Ok(SyncOutcome::Reload(ReloadReason::Corruption));
            }
        };

        let mut working = snapshot.clone();
        let mut applied = 0;
        let unseen = records
            .into_iter()
            .filter(|r| r.timestamp >= last_sync && !r.written_by(&self.writer));
        for record in unseen {
            if record.operation == JournalOperation::Reload {
                debug!(timestamp = %record.timestamp, "found reload marker");
                return Ok(SyncOutcome::Reload(ReloadReason::Marker));
            }
            let Some(doc) = record.doc else { continue };
            let Some(set) = doc.entity_set.clone() else {
                continue;
            };
            if model.entity_set(&set).is_none() {
                continue;
            }
            match record.operation {
                JournalOperation::Insert | JournalOperation::Update => {
                    working.replace_and_append(&set, doc);
                }
                JournalOperation::Remove => {
                    working.remove(&set, &doc.id);
                }
                JournalOperation::Reload => {}
            }
            applied += 1;
        }

        self.mark_synced(started);
        if applied == 0 {
            return Ok(SyncOutcome::Unchanged);
        }
        debug!(records = applied, "replayed journal");
        Ok(SyncOutcome::Applied {
            snapshot: working,
            records: applied,
        })
    }

    /// Drops lines older than the retention window. Returns the number of
    /// lines dropped.
    ///
    /// Unparsable lines are dropped too.
    pub async fn clean(&self) -> StoreResult<usize> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let threshold = Timestamp::now().saturating_sub(self.max_item_age);
        let mut kept = String::new();
        let mut dropped = 0;
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            match JournalRecord::from_line(line) {
                Ok(record) if record.timestamp > threshold => {
                    kept.push_str(line);
                    kept.push('\n');
                }
                Ok(_) => dropped += 1,
                Err(e) => {
                    warn!(error = %e, "dropping unparsable journal line");
                    dropped += 1;
                }
            }
        }

        if dropped == 0 {
            return Ok(0);
        }
        fs::replace_file(&self.path, kept.as_bytes(), &self.policy).await?;
        self.mark_synced(Timestamp::now());
        info!(dropped, "cleaned journal");
        Ok(dropped)
    }

    /// Reads every record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::JournalCorruption`] if a line cannot be
    /// parsed.
    pub async fn read_entries(&self) -> StoreResult<Vec<JournalRecord>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => parse(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Size of the journal file in bytes.
    pub async fn size(&self) -> StoreResult<u64> {
        match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => Ok(metadata.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntitySetDescriptor;
    use serde_json::json;
    use tempfile::tempdir;

    fn model() -> DocumentModel {
        DocumentModel::new(vec![EntitySetDescriptor::flat("settings")])
    }

    fn config(root: &Path) -> StoreConfig {
        StoreConfig::new(root)
    }

    fn setting(id: &str, value: i64) -> Document {
        Document::from_json(json!({ "_id": id, "$entitySet": "settings", "value": value }))
            .unwrap()
    }

    fn stale_by(journal: &Journal, age: Duration) {
        journal.mark_synced(Timestamp::now().saturating_sub(age));
    }

    #[tokio::test]
    async fn replays_lines_from_other_writers() {
        let temp = tempdir().unwrap();
        let writer = Journal::new(&config(temp.path()));
        let reader = Journal::new(&config(temp.path()));
        stale_by(&reader, Duration::from_secs(1));

        writer.insert(&setting("a", 1)).await.unwrap();
        writer.insert(&setting("b", 1)).await.unwrap();
        writer.update(&setting("a", 2)).await.unwrap();
        writer.remove(&setting("b", 1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let empty = CacheSnapshot::empty(&model());
        let outcome = reader.sync(&empty, &model()).await.unwrap();
        let SyncOutcome::Applied { snapshot, records } = outcome else {
            panic!("expected replay, got {outcome:?}");
        };
        assert_eq!(records, 4);
        assert_eq!(snapshot.len("settings"), 1);
        assert_eq!(
            snapshot.get("settings", "a").unwrap().fields["value"].as_integer(),
            Some(2)
        );

        // Caught up: the next sync has nothing to do.
        let again = reader.sync(&snapshot, &model()).await.unwrap();
        assert!(matches!(again, SyncOutcome::Unchanged));
    }

    #[tokio::test]
    async fn own_lines_are_never_replayed() {
        let temp = tempdir().unwrap();
        let journal = Journal::new(&config(temp.path()));
        stale_by(&journal, Duration::from_secs(1));

        journal.insert(&setting("a", 1)).await.unwrap();
        journal.update(&setting("a", 2)).await.unwrap();
        journal.commit().await.unwrap();

        let entries = journal.read_entries().await.unwrap();
        assert!(entries.iter().all(|r| r.written_by(journal.writer())));

        // The cache already holds a newer version than the first line.
        let mut current = CacheSnapshot::empty(&model());
        current.upsert("settings", setting("a", 3));
        let outcome = journal.sync(&current, &model()).await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Unchanged));
    }

    #[tokio::test]
    async fn stale_sync_requires_reload() {
        let temp = tempdir().unwrap();
        let journal = Journal::new(&config(temp.path()));
        stale_by(&journal, Duration::from_secs(120));

        let outcome = journal
            .sync(&CacheSnapshot::empty(&model()), &model())
            .await
            .unwrap();
        assert!(matches!(outcome, SyncOutcome::Reload(ReloadReason::Stale)));
    }

    #[tokio::test]
    async fn reload_marker_requires_reload() {
        let temp = tempdir().unwrap();
        let writer = Journal::new(&config(temp.path()));
        let reader = Journal::new(&config(temp.path()));
        stale_by(&reader, Duration::from_secs(1));

        writer.insert(&setting("a", 1)).await.unwrap();
        writer.commit().await.unwrap();

        let outcome = reader
            .sync(&CacheSnapshot::empty(&model()), &model())
            .await
            .unwrap();
        assert!(matches!(outcome, SyncOutcome::Reload(ReloadReason::Marker)));
    }

    #[tokio::test]
    async fn corruption_writes_marker_and_requires_reload() {
        let temp = tempdir().unwrap();
        let journal = Journal::new(&config(temp.path()));
        stale_by(&journal, Duration::from_secs(1));
        tokio::fs::write(journal.path(), "{garbage\n").await.unwrap();

        let outcome = journal
            .sync(&CacheSnapshot::empty(&model()), &model())
            .await
            .unwrap();
        assert!(matches!(outcome, SyncOutcome::Reload(ReloadReason::Corruption)));
        let contents = tokio::fs::read_to_string(journal.path()).await.unwrap();
        let last = contents.lines().last().unwrap();
        assert_eq!(
            JournalRecord::from_line(last).unwrap().operation,
            JournalOperation::Reload
        );
    }

    #[tokio::test]
    async fn unknown_entity_sets_are_skipped() {
        let temp = tempdir().unwrap();
        let writer = Journal::new(&config(temp.path()));
        let reader = Journal::new(&config(temp.path()));
        stale_by(&reader, Duration::from_secs(1));
        let foreign =
            Document::from_json(json!({ "_id": "x", "$entitySet": "profiles" })).unwrap();
        writer.insert(&foreign).await.unwrap();

        let outcome = reader
            .sync(&CacheSnapshot::empty(&model()), &model())
            .await
            .unwrap();
        assert!(matches!(outcome, SyncOutcome::Unchanged));
    }

    #[tokio::test]
    async fn clean_drops_old_and_corrupted_lines() {
        let temp = tempdir().unwrap();
        let journal = Journal::new(&config(temp.path()));
        let old = JournalRecord {
            operation: JournalOperation::Insert,
            timestamp: Timestamp::now().saturating_sub(Duration::from_secs(600)),
            doc: Some(setting("old", 1)),
            writer: None,
        };
        let fresh = JournalRecord::mutation(JournalOperation::Insert, setting("fresh", 1));
        let contents = format!(
            "{}\nnot json\n{}\n",
            old.to_line().unwrap(),
            fresh.to_line().unwrap()
        );
        tokio::fs::write(journal.path(), contents).await.unwrap();

        assert_eq!(journal.clean().await.unwrap(), 2);
        let entries = journal.read_entries().await.unwrap();
        assert_eq!(entries, vec![fresh]);
        assert!(!temp.path().join("~fs.journal").exists());

        assert_eq!(journal.clean().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_journal_is_empty() {
        let temp = tempdir().unwrap();
        let journal = Journal::new(&config(temp.path()));
        assert!(journal.read_entries().await.unwrap().is_empty());
        assert_eq!(journal.size().await.unwrap(), 0);
        assert_eq!(journal.clean().await.unwrap(), 0);
        let outcome = journal
            .sync(&CacheSnapshot::empty(&model()), &model())
            .await
            .unwrap();
        assert!(matches!(outcome, SyncOutcome::Unchanged));
    }
}
