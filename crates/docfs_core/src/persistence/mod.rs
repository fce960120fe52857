//! Persistence layer: maps documents to files and directories.
//!
//! Split entity sets live in the folder tree ([`tree`]), flat entity sets in
//! append-only record logs ([`flat`]). Loading runs in two passes: the
//! [`repair`] pass resolves staging markers left by interrupted writes, then
//! a pure read pass builds the documents.
//!
//! ## Invariants
//!
//! - A reader loading the tree at any point except mid-rename sees each
//!   document either before or after a write, never partially
//! - `~~` entries are never valid data
//! - Duplicate sibling names fail before anything is written

pub mod flat;
pub mod repair;
pub mod tree;

pub use flat::CompactionResult;
pub use repair::RepairReport;

use crate::cache::CacheSnapshot;
use crate::document::Document;
use crate::error::{StoreError, StoreResult};
use crate::model::{DocumentModel, EntitySetDescriptor};
use docfs_storage::{fs, DirectoryReplace, RetryPolicy};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Counter bumped around every write this process makes to the data
/// directory, so the watcher can tell its own writes from foreign ones.
#[derive(Debug, Clone, Default)]
pub struct WriteEpoch(Arc<AtomicU64>);

impl WriteEpoch {
    /// Current value.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Bumps the epoch on creation and again on drop, covering the whole write.
struct EpochGuard<'a>(&'a WriteEpoch);

impl<'a> EpochGuard<'a> {
    fn new(epoch: &'a WriteEpoch) -> Self {
        epoch.bump();
        Self(epoch)
    }
}

impl Drop for EpochGuard<'_> {
    fn drop(&mut self) {
        self.0.bump();
    }
}

/// Reads and writes documents under one data directory.
#[derive(Debug, Clone)]
pub struct Persistence {
    root: PathBuf,
    model: Arc<DocumentModel>,
    policy: RetryPolicy,
    corrupt_alert_threshold: f64,
    epoch: WriteEpoch,
}

impl Persistence {
    /// Creates a persistence layer rooted at `root`.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        model: Arc<DocumentModel>,
        policy: RetryPolicy,
        corrupt_alert_threshold: f64,
    ) -> Self {
        Self {
            root: root.into(),
            model,
            policy,
            corrupt_alert_threshold,
            epoch: WriteEpoch::default(),
        }
    }

    /// The data directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The document model.
    #[must_use]
    pub fn model(&self) -> &DocumentModel {
        &self.model
    }

    /// A shared handle to the document model.
    #[must_use]
    pub fn shared_model(&self) -> Arc<DocumentModel> {
        Arc::clone(&self.model)
    }

    /// The write epoch shared with the watcher.
    #[must_use]
    pub fn write_epoch(&self) -> WriteEpoch {
        self.epoch.clone()
    }

    /// Repairs, then reads every document.
    pub async fn load(&self) -> StoreResult<Vec<Document>> {
        self.repair().await?;
        let documents = self.read().await?;
        info!(root = %self.root.display(), documents = documents.len(), "loaded documents");
        Ok(documents)
    }

    /// Resolves staging markers left by interrupted writes.
    pub async fn repair(&self) -> StoreResult<RepairReport> {
        let _guard = EpochGuard::new(&self.epoch);
        repair::repair(&self.root, &self.policy).await
    }

    /// Reads every document without modifying anything.
    pub async fn read(&self) -> StoreResult<Vec<Document>> {
        if !fs::exists(&self.root).await? {
            return Ok(Vec::new());
        }

        let mut documents = tree::read_tree(&self.root, &self.model).await?;
        for set in self.model.flat_sets() {
            let file = flat::read(&self.root, &set.name, self.corrupt_alert_threshold).await?;
            documents.extend(file.documents);
        }
        Ok(documents)
    }

    fn descriptor(&self, doc: &Document) -> StoreResult<&EntitySetDescriptor> {
        let set = doc
            .entity_set
            .as_deref()
            .ok_or_else(|| StoreError::validation(format!("document {} has no entity set", doc.id)))?;
        self.model.require(set)
    }

    /// Persists a new document. `documents` is the state the insert applies
    /// to, used to resolve the folder chain and detect duplicates.
    pub async fn insert(&self, doc: &Document, documents: &CacheSnapshot) -> StoreResult<()> {
        let descriptor = self.descriptor(doc)?;
        if !descriptor.split_into_directories {
            let _guard = EpochGuard::new(&self.epoch);
            return flat::append(&self.root, &descriptor.name, doc).await;
        }

        let name = tree::entry_name(doc)?;
        tree::check_duplicate(&self.model, doc, documents)?;
        let parent = self.root.join(tree::parent_directory(&self.model, doc, documents)?);

        let _guard = EpochGuard::new(&self.epoch);
        DirectoryReplace::new(&parent, None, name, self.policy.clone())?
            .run(|dir| async move { tree::write_document(&dir, doc, descriptor).await })
            .await?;
        debug!(id = %doc.id, entity_set = %descriptor.name, "inserted document");
        Ok(())
    }

    /// Persists a modified document replacing `original`.
    ///
    /// A move to another folder is an in-place update in the old parent
    /// followed by one directory rename into the new parent.
    pub async fn update(
        &self,
        doc: &Document,
        original: &Document,
        documents: &CacheSnapshot,
    ) -> StoreResult<()> {
        let descriptor = self.descriptor(doc)?;
        if !descriptor.split_into_directories {
            let _guard = EpochGuard::new(&self.epoch);
            return flat::append(&self.root, &descriptor.name, doc).await;
        }

        let new_name = tree::entry_name(doc)?;
        let old_name = tree::entry_name(original)?;
        tree::check_duplicate(&self.model, doc, documents)?;
        let old_parent = tree::parent_directory(&self.model, original, documents)?;
        let new_parent = tree::parent_directory(&self.model, doc, documents)?;

        if new_parent.starts_with(old_parent.join(old_name)) {
            return Err(StoreError::validation(format!(
                "cannot move {} into itself",
                old_parent.join(old_name).display()
            )));
        }

        let _guard = EpochGuard::new(&self.epoch);
        if old_parent == new_parent {
            DirectoryReplace::new(
                &self.root.join(&old_parent),
                Some(old_name),
                new_name,
                self.policy.clone(),
            )?
            .run(|dir| async move { tree::write_document(&dir, doc, descriptor).await })
            .await?;
        } else {
            let target = self.root.join(&new_parent).join(new_name);
            if fs::exists(&target).await? {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", target.display()),
                )
                .into());
            }

            DirectoryReplace::new(
                &self.root.join(&old_parent),
                Some(old_name),
                old_name,
                self.policy.clone(),
            )?
            .run(|dir| async move { tree::write_document(&dir, doc, descriptor).await })
            .await?;

            tokio::fs::create_dir_all(self.root.join(&new_parent)).await?;
            let source = self.root.join(&old_parent).join(old_name);
            fs::rename(&source, &target, &self.policy).await?;
            fs::sync_directory(&self.root.join(&old_parent)).await?;
            fs::sync_directory(&self.root.join(&new_parent)).await?;
        }

        debug!(id = %doc.id, entity_set = %descriptor.name, "updated document");
        Ok(())
    }

    /// Deletes a document; for a folder, everything nested in it.
    pub async fn remove(&self, doc: &Document, documents: &CacheSnapshot) -> StoreResult<()> {
        let descriptor = self.descriptor(doc)?;
        let _guard = EpochGuard::new(&self.epoch);

        if !descriptor.split_into_directories {
            return flat::append_tombstone(&self.root, &descriptor.name, &doc.id).await;
        }

        let relative = tree::document_directory(&self.model, doc, documents)?;
        let path = self.root.join(&relative);
        fs::remove_path(&path).await?;
        if let Some(parent) = path.parent() {
            fs::sync_directory(parent).await?;
        }
        debug!(id = %doc.id, path = %relative.display(), "removed document");
        Ok(())
    }

    /// Compacts every flat entity set.
    pub async fn compact(&self) -> StoreResult<Vec<CompactionResult>> {
        let _guard = EpochGuard::new(&self.epoch);
        let mut results = Vec::new();
        for set in self.model.flat_sets() {
            results.push(
                flat::compact(
                    &self.root,
                    &set.name,
                    self.corrupt_alert_threshold,
                    &self.policy,
                )
                .await?,
            );
        }
        Ok(results)
    }

    /// Deletes the whole data directory.
    pub async fn drop_all(&self) -> StoreResult<()> {
        let _guard = EpochGuard::new(&self.epoch);
        fs::remove_path(&self.root).await?;
        info!(root = %self.root.display(), "dropped data directory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocumentProperty;
    use crate::value::Value;
    use serde_json::json;
    use tempfile::tempdir;

    fn model() -> Arc<DocumentModel> {
        Arc::new(DocumentModel::new(vec![
            EntitySetDescriptor::split("templates")
                .with_property(DocumentProperty::text("content", "html")),
            EntitySetDescriptor::flat("settings"),
        ]))
    }

    fn persistence(root: &Path) -> Persistence {
        Persistence::new(root, model(), RetryPolicy::default(), 0.1)
    }

    fn doc(json: serde_json::Value) -> Document {
        Document::from_json(json).unwrap()
    }

    async fn apply_insert(p: &Persistence, snapshot: &mut CacheSnapshot, d: Document) {
        p.insert(&d, snapshot).await.unwrap();
        let set = d.entity_set.clone().unwrap();
        snapshot.upsert(&set, d);
    }

    fn names(path: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(path)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn insert_update_remove_split_document() {
        let temp = tempdir().unwrap();
        let p = persistence(temp.path());
        let mut snapshot = CacheSnapshot::empty(p.model());

        let folder = doc(json!({ "_id": "f", "$entitySet": "folders", "shortid": "fs", "name": "reports" }));
        apply_insert(&p, &mut snapshot, folder).await;
        let template = doc(json!({ "_id": "t", "$entitySet": "templates", "name": "invoice",
                                   "content": "<p/>", "folder": { "shortid": "fs" } }));
        apply_insert(&p, &mut snapshot, template.clone()).await;
        assert_eq!(names(&temp.path().join("reports").join("invoice")), vec!["config.json", "content.html"]);

        let mut renamed = template.clone();
        renamed.set("name", Value::from("receipt")).unwrap();
        p.update(&renamed, &template, &snapshot).await.unwrap();
        snapshot.upsert("templates", renamed.clone());
        assert_eq!(names(&temp.path().join("reports")), vec!["config.json", "receipt"]);

        let loaded = p.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        let loaded_template = loaded.iter().find(|d| d.id == "t").unwrap();
        assert!(loaded_template.same_content(&renamed));

        p.remove(&renamed, &snapshot).await.unwrap();
        assert_eq!(names(&temp.path().join("reports")), vec!["config.json"]);
    }

    #[tokio::test]
    async fn move_between_folders() {
        let temp = tempdir().unwrap();
        let p = persistence(temp.path());
        let mut snapshot = CacheSnapshot::empty(p.model());

        for (id, name) in [("a", "first"), ("b", "second")] {
            let folder = doc(json!({ "_id": id, "$entitySet": "folders", "shortid": id, "name": name }));
            apply_insert(&p, &mut snapshot, folder).await;
        }
        let template = doc(json!({ "_id": "t", "$entitySet": "templates", "name": "x",
                                   "folder": { "shortid": "a" } }));
        apply_insert(&p, &mut snapshot, template.clone()).await;

        let mut moved = template.clone();
        moved.set("folder", json!({ "shortid": "b" }).into()).unwrap();
        moved.set("name", Value::from("y")).unwrap();
        p.update(&moved, &template, &snapshot).await.unwrap();

        assert_eq!(names(&temp.path().join("first")), vec!["config.json"]);
        assert_eq!(names(&temp.path().join("second")), vec!["config.json", "y"]);
        let loaded = p.load().await.unwrap();
        let t = loaded.iter().find(|d| d.id == "t").unwrap();
        assert_eq!(t.folder.as_ref().unwrap().shortid, "b");
        assert_eq!(t.name(), Some("y"));
    }

    #[tokio::test]
    async fn folder_cannot_move_into_itself() {
        let temp = tempdir().unwrap();
        let p = persistence(temp.path());
        let mut snapshot = CacheSnapshot::empty(p.model());
        let outer = doc(json!({ "_id": "o", "$entitySet": "folders", "shortid": "o", "name": "outer" }));
        let inner = doc(json!({ "_id": "i", "$entitySet": "folders", "shortid": "i", "name": "inner",
                                "folder": { "shortid": "o" } }));
        apply_insert(&p, &mut snapshot, outer.clone()).await;
        apply_insert(&p, &mut snapshot, inner).await;

        let mut moved = outer.clone();
        moved.set("folder.shortid", Value::from("i")).unwrap();
        assert!(p.update(&moved, &outer, &snapshot).await.is_err());
        assert!(fs::exists(&temp.path().join("outer").join("inner")).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_insert_leaves_disk_unchanged() {
        let temp = tempdir().unwrap();
        let p = persistence(temp.path());
        let mut snapshot = CacheSnapshot::empty(p.model());
        apply_insert(
            &p,
            &mut snapshot,
            doc(json!({ "_id": "1", "$entitySet": "templates", "name": "same" })),
        )
        .await;

        let before = names(temp.path());
        let err = p
            .insert(
                &doc(json!({ "_id": "2", "$entitySet": "folders", "name": "SAME" })),
                &snapshot,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEntry { .. }));
        assert_eq!(names(temp.path()), before);
    }

    #[tokio::test]
    async fn unknown_directory_on_disk_surfaces_as_io_error() {
        let temp = tempdir().unwrap();
        let p = persistence(temp.path());
        tokio::fs::create_dir_all(temp.path().join("taken")).await.unwrap();
        let snapshot = CacheSnapshot::empty(p.model());

        let err = p
            .insert(
                &doc(json!({ "_id": "1", "$entitySet": "templates", "name": "taken" })),
                &snapshot,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
    }

    #[tokio::test]
    async fn flat_documents_append_and_compact() {
        let temp = tempdir().unwrap();
        let p = persistence(temp.path());
        let snapshot = CacheSnapshot::empty(p.model());

        let setting = doc(json!({ "_id": "s", "$entitySet": "settings", "key": "a" }));
        p.insert(&setting, &snapshot).await.unwrap();
        let mut changed = setting.clone();
        changed.set("key", Value::from("b")).unwrap();
        p.update(&changed, &setting, &snapshot).await.unwrap();

        let loaded = p.read().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].get("key").unwrap().as_str(), Some("b"));

        let results = p.compact().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].rewritten);

        p.remove(&changed, &snapshot).await.unwrap();
        assert!(p.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn writes_bump_epoch() {
        let temp = tempdir().unwrap();
        let p = persistence(temp.path());
        let epoch = p.write_epoch();
        let before = epoch.current();
        p.insert(
            &doc(json!({ "_id": "s", "$entitySet": "settings" })),
            &CacheSnapshot::empty(p.model()),
        )
        .await
        .unwrap();
        assert_eq!(epoch.current(), before + 2);
    }

    #[tokio::test]
    async fn drop_removes_everything() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("data");
        let p = persistence(&root);
        tokio::fs::create_dir_all(&root).await.unwrap();
        p.insert(
            &doc(json!({ "_id": "s", "$entitySet": "settings" })),
            &CacheSnapshot::empty(p.model()),
        )
        .await
        .unwrap();
        p.drop_all().await.unwrap();
        assert!(!fs::exists(&root).await.unwrap());
        assert!(p.read().await.unwrap().is_empty());
    }
}
