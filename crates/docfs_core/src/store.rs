//! Store façade.
//!
//! [`Store`] ties the pieces together: reads evaluate against the installed
//! cache snapshot without waiting, mutations run one at a time through the
//! persistence queue (disk first, then the cache, then the journal), and
//! background tasks keep the journal, flat files and external edits in check.

use crate::cache::{CacheSnapshot, DocumentCache};
use crate::config::StoreConfig;
use crate::document::Document;
use crate::error::{StoreError, StoreResult};
use crate::events::{EventFeed, StoreEvent, StoreEventKind};
use crate::journal::{Journal, SyncOutcome};
use crate::model::DocumentModel;
use crate::persistence::tree;
use crate::persistence::{CompactionResult, Persistence};
use crate::query::{Cursor, Filter, Projection, Update};
use crate::transaction::{PendingWrite, PersistenceQueue, Transaction};
use crate::types::{Timestamp, TransactionId};
use crate::watcher::Watcher;
use docfs_storage::fs;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Options for `find`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FindOptions<'a> {
    /// Read the transaction's working copy instead of the shared cache.
    pub transaction: Option<&'a Transaction>,
}

impl<'a> FindOptions<'a> {
    /// Reads inside `transaction`.
    #[must_use]
    pub fn in_transaction(transaction: &'a Transaction) -> Self {
        Self {
            transaction: Some(transaction),
        }
    }
}

/// Options for `insert` and `remove`.
#[derive(Debug, Default)]
pub struct WriteOptions<'a> {
    /// Buffer the write in a transaction instead of applying it.
    pub transaction: Option<&'a mut Transaction>,
}

impl<'a> WriteOptions<'a> {
    /// Writes inside `transaction`.
    #[must_use]
    pub fn in_transaction(transaction: &'a mut Transaction) -> Self {
        Self {
            transaction: Some(transaction),
        }
    }
}

/// Options for `update`.
#[derive(Debug, Default)]
pub struct UpdateOptions<'a> {
    /// Buffer the write in a transaction instead of applying it.
    pub transaction: Option<&'a mut Transaction>,
    /// Insert a document built from the query's equalities if nothing
    /// matches.
    pub upsert: bool,
}

impl<'a> UpdateOptions<'a> {
    /// Writes inside `transaction`.
    #[must_use]
    pub fn in_transaction(mut self, transaction: &'a mut Transaction) -> Self {
        self.transaction = Some(transaction);
        self
    }

    /// Sets the upsert flag.
    #[must_use]
    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

/// A document change, journaled and published once applied.
#[derive(Debug)]
enum Change {
    Insert(Document),
    Update(Document),
    Remove(Document),
}

impl Change {
    fn event(&self) -> StoreEventKind {
        match self {
            Self::Insert(doc) => StoreEventKind::Insert {
                entity_set: doc.entity_set.clone().unwrap_or_default(),
                id: doc.id.clone(),
            },
            Self::Update(doc) => StoreEventKind::Update {
                entity_set: doc.entity_set.clone().unwrap_or_default(),
                id: doc.id.clone(),
            },
            Self::Remove(doc) => StoreEventKind::Remove {
                entity_set: doc.entity_set.clone().unwrap_or_default(),
                id: doc.id.clone(),
            },
        }
    }

    async fn journal(&self, journal: &Journal) -> StoreResult<()> {
        match self {
            Self::Insert(doc) => journal.insert(doc).await,
            Self::Update(doc) => journal.update(doc).await,
            Self::Remove(doc) => journal.remove(doc).await,
        }
    }
}

/// Disk writes and document changes produced by one mutation.
#[derive(Debug, Default)]
struct Plan {
    writes: Vec<PendingWrite>,
    changes: Vec<Change>,
}

fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Checks that a split document can be placed in `documents`.
fn validate_placement(
    model: &DocumentModel,
    doc: &Document,
    documents: &CacheSnapshot,
) -> StoreResult<()> {
    tree::entry_name(doc)?;
    tree::parent_directory(model, doc, documents)?;
    tree::check_duplicate(model, doc, documents)
}

fn plan_insert(
    model: &DocumentModel,
    working: &mut CacheSnapshot,
    entity_set: &str,
    mut doc: Document,
) -> StoreResult<(Plan, Document)> {
    let descriptor = model.require(entity_set)?;
    doc.entity_set = Some(descriptor.name.clone());
    if doc.id.is_empty() {
        doc.id = generate_id();
    }
    if working.get(entity_set, &doc.id).is_some() {
        return Err(StoreError::validation(format!(
            "document {} already exists in {entity_set}",
            doc.id
        )));
    }
    if descriptor.split_into_directories {
        if doc.shortid.is_none() {
            doc.shortid = Some(tree::derived_shortid(&generate_id()));
        }
        validate_placement(model, &doc, working)?;
    }
    doc.etag = Some(Timestamp::now());

    let before = Arc::new(working.clone());
    working.upsert(entity_set, doc.clone());
    let plan = Plan {
        writes: vec![PendingWrite::Insert {
            doc: doc.clone(),
            before,
        }],
        changes: vec![Change::Insert(doc.clone())],
    };
    Ok((plan, doc))
}

fn plan_update(
    model: &DocumentModel,
    working: &mut CacheSnapshot,
    entity_set: &str,
    filter: &Filter,
    update: &Update,
    upsert: bool,
) -> StoreResult<(Plan, usize)> {
    let descriptor = model.require(entity_set)?;
    let matched = working.find(entity_set, filter);

    if matched.is_empty() {
        if !upsert {
            return Ok((Plan::default(), 0));
        }
        let mut seed = Document::default();
        for (path, value) in filter.equalities() {
            seed.set(&path, value)?;
        }
        update.apply(&mut seed)?;
        let (plan, _) = plan_insert(model, working, entity_set, seed)?;
        return Ok((plan, 1));
    }

    let mut plan = Plan::default();
    for original in &matched {
        let mut doc = original.clone();
        update.apply(&mut doc)?;
        if doc.entity_set.as_deref() != Some(entity_set) {
            return Err(StoreError::validation("$entitySet cannot be changed"));
        }
        doc.etag = Some(Timestamp::now());

        if descriptor.split_into_directories {
            let moved_folder = model.is_folder_set(entity_set) && doc.folder != original.folder;
            if moved_folder {
                let current = tree::document_directory(model, original, working)?;
                let target = tree::parent_directory(model, &doc, working)?;
                if target.starts_with(&current) {
                    return Err(StoreError::validation(format!(
                        "cannot move {} into itself",
                        current.display()
                    )));
                }
            }
            validate_placement(model, &doc, working)?;
        }

        let before = Arc::new(working.clone());
        working.upsert(entity_set, doc.clone());
        plan.writes.push(PendingWrite::Update {
            doc: doc.clone(),
            original: original.clone(),
            before,
        });
        plan.changes.push(Change::Update(doc));
    }
    let count = matched.len();
    Ok((plan, count))
}

fn plan_remove(
    model: &DocumentModel,
    working: &mut CacheSnapshot,
    entity_set: &str,
    filter: &Filter,
) -> StoreResult<(Plan, usize)> {
    model.require(entity_set)?;
    let matched = working.find(entity_set, filter);

    let mut plan = Plan::default();
    let mut count = 0;
    for doc in matched {
        // Already gone with a folder removed earlier in this call.
        if working.get(entity_set, &doc.id).is_none() {
            continue;
        }
        let nested = if model.is_folder_set(entity_set) {
            tree::descendants(model, &doc, working)
        } else {
            Vec::new()
        };

        let before = Arc::new(working.clone());
        working.remove(entity_set, &doc.id);
        plan.changes.push(Change::Remove(doc.clone()));
        for (set, id) in nested {
            if let Some(child) = working.remove(&set, &id) {
                plan.changes.push(Change::Remove(child));
            }
        }
        plan.writes.push(PendingWrite::Remove { doc, before });
        count += 1;
    }
    Ok((plan, count))
}

/// Shared state behind a [`Store`] handle.
struct StoreInner {
    config: StoreConfig,
    persistence: RwLock<Option<Persistence>>,
    cache: DocumentCache,
    queue: PersistenceQueue,
    journal: Option<Journal>,
    events: EventFeed,
    next_txid: AtomicU64,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StoreInner {
    fn persistence(&self) -> StoreResult<Persistence> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::StoreClosed);
        }
        self.persistence.read().clone().ok_or(StoreError::NotLoaded)
    }

    /// Rebuilds the cache from disk. The caller holds queue admission.
    async fn reload_admitted(&self, persistence: &Persistence) -> StoreResult<()> {
        let started = Timestamp::now();
        let documents = persistence.load().await?;
        let snapshot = CacheSnapshot::from_documents(persistence.model(), documents);
        let total = snapshot.total();
        self.cache.install(snapshot);
        if let Some(journal) = &self.journal {
            journal.mark_synced(started);
        }
        self.events.emit(StoreEventKind::Reload);
        info!(documents = total, "reloaded cache from disk");
        Ok(())
    }

    /// Catches up with the journal. The caller holds queue admission.
    async fn sync_admitted(&self, persistence: &Persistence) -> StoreResult<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        match journal.sync(&self.cache.snapshot(), persistence.model()).await? {
            SyncOutcome::Unchanged => Ok(()),
            SyncOutcome::Applied { snapshot, records } => {
                self.cache.install(snapshot);
                debug!(records, "applied journal records");
                Ok(())
            }
            SyncOutcome::Reload(reason) => {
                debug!(?reason, "journal sync requires reload");
                self.reload_admitted(persistence).await
            }
        }
    }

    /// Applies `writes` in order. The caller holds queue admission.
    ///
    /// When a write fails after earlier ones landed, the cache is rebuilt
    /// from disk and a reload marker is journaled before the error is
    /// returned.
    async fn apply_admitted<'w, I>(&self, persistence: &Persistence, writes: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = &'w PendingWrite>,
    {
        for (applied, write) in writes.into_iter().enumerate() {
            let Err(e) = write.apply(persistence).await else {
                continue;
            };
            if applied > 0 {
                warn!(applied, error = %e, "write failed after earlier writes landed, reloading");
                if let Err(reload) = self.reload_admitted(persistence).await {
                    warn!(error = %reload, "reload after partial failure failed");
                }
                if let Some(journal) = &self.journal {
                    if let Err(marker) = journal.commit().await {
                        warn!(error = %marker, "failed to journal reload marker");
                    }
                }
            }
            return Err(e);
        }
        Ok(())
    }

    async fn reload(&self) -> StoreResult<()> {
        let persistence = self.persistence()?;
        let _admission = self.queue.admit().await?;
        self.reload_admitted(&persistence).await
    }

    async fn sync(&self) -> StoreResult<()> {
        let persistence = self.persistence()?;
        let _admission = self.queue.admit().await?;
        self.sync_admitted(&persistence).await
    }

    async fn clean(&self) -> StoreResult<()> {
        self.persistence()?;
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let _admission = self.queue.admit().await?;
        journal.clean().await?;
        Ok(())
    }

    async fn compact(&self) -> StoreResult<Vec<CompactionResult>> {
        let persistence = self.persistence()?;
        let _admission = self.queue.admit().await?;
        persistence.compact().await
    }

    /// Plans a mutation and either applies it or buffers it in
    /// `transaction`.
    async fn mutate<T, F>(&self, transaction: Option<&mut Transaction>, plan: F) -> StoreResult<T>
    where
        F: FnOnce(&DocumentModel, &mut CacheSnapshot) -> StoreResult<(Plan, T)>,
    {
        let persistence = self.persistence()?;

        if let Some(transaction) = transaction {
            transaction.working_mut()?;
            let mut working = transaction.working().clone();
            let (planned, out) = plan(persistence.model(), &mut working)?;
            *transaction.working_mut()? = working;
            for write in planned.writes {
                transaction.record(write)?;
            }
            return Ok(out);
        }

        let _admission = self.queue.admit().await?;
        self.sync_admitted(&persistence).await?;
        let mut working = (*self.cache.snapshot()).clone();
        let (planned, out) = plan(persistence.model(), &mut working)?;
        if planned.writes.is_empty() {
            return Ok(out);
        }

        self.apply_admitted(&persistence, &planned.writes).await?;
        self.cache.install(working);

        if let Some(journal) = &self.journal {
            for change in &planned.changes {
                change.journal(journal).await?;
            }
        }
        for change in &planned.changes {
            self.events.emit(change.event());
        }
        Ok(out)
    }

    async fn commit(&self, transaction: &mut Transaction) -> StoreResult<()> {
        let persistence = self.persistence()?;
        transaction.begin_commit()?;

        let _admission = match self.queue.admit().await {
            Ok(admission) => admission,
            Err(e) => {
                transaction.mark_rolled_back();
                return Err(e);
            }
        };

        let writes = transaction.write_count();
        let mut result = self.sync_admitted(&persistence).await;
        if result.is_ok() {
            result = self
                .apply_admitted(&persistence, transaction.pending_writes())
                .await;
        }
        if let Err(e) = result {
            warn!(transaction = %transaction.id(), error = %e, "commit failed");
            transaction.mark_rolled_back();
            return Err(e);
        }
        let working = transaction.mark_committed();
        if writes == 0 {
            return Ok(());
        }
        self.cache.install(working);

        if let Some(journal) = &self.journal {
            journal.commit().await?;
        }
        self.events.emit(StoreEventKind::Commit { writes });
        debug!(transaction = %transaction.id(), writes, "committed transaction");
        Ok(())
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Runs `cycle` every `every` until shutdown or until the store is dropped.
fn spawn_periodic<F, Fut>(
    inner: &Arc<StoreInner>,
    name: &'static str,
    every: Duration,
    cycle: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<StoreInner>) -> Fut + Send + 'static,
    Fut: Future<Output = StoreResult<()>> + Send,
{
    let weak: Weak<StoreInner> = Arc::downgrade(inner);
    let mut shutdown = inner.shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(task = name, "background task shutting down");
                        break;
                    }
                    continue;
                }
            }
            let Some(inner) = weak.upgrade() else { break };
            if let Err(e) = cycle(inner).await {
                warn!(task = name, error = %e, "background task failed");
            }
        }
    })
}

/// A file-backed document store.
///
/// ```rust,ignore
/// use docfs_core::{DocumentModel, EntitySetDescriptor, Store, StoreConfig, WriteOptions};
///
/// let store = Store::open(StoreConfig::new("data"));
/// store
///     .load(DocumentModel::new(vec![EntitySetDescriptor::split("templates")]))
///     .await?;
/// let doc = Document::from_json(json!({ "name": "invoice", "content": "<p/>" }))?;
/// store.insert("templates", doc, WriteOptions::default()).await?;
/// let found = store.find("templates", &json!({ "name": "invoice" }), None, FindOptions::default())?;
/// store.close().await;
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Creates a store over the data directory in `config`. Nothing is read
    /// until [`Store::load`].
    #[must_use]
    pub fn open(config: StoreConfig) -> Self {
        let journal = config.journal.then(|| Journal::new(&config));
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(StoreInner {
                queue: PersistenceQueue::new(config.queue_wait_timeout),
                config,
                persistence: RwLock::new(None),
                cache: DocumentCache::new(),
                journal,
                events: EventFeed::new(),
                next_txid: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                shutdown,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Loads every document of `model` and starts the background tasks.
    ///
    /// # Errors
    ///
    /// Fails if the model is invalid, the store was already loaded, the data
    /// directory is missing and may not be created, or loading fails.
    pub async fn load(&self, model: DocumentModel) -> StoreResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(StoreError::StoreClosed);
        }
        model.validate()?;
        let root = &self.inner.config.data_directory;
        if self.inner.config.create_if_missing {
            tokio::fs::create_dir_all(root).await?;
        } else if !fs::exists(root).await? {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("data directory {} does not exist", root.display()),
            )
            .into());
        }

        let persistence = Persistence::new(
            root.clone(),
            Arc::new(model),
            self.inner.config.rename_retry.clone(),
            self.inner.config.corrupt_alert_threshold,
        );
        {
            let mut slot = self.inner.persistence.write();
            if slot.is_some() {
                return Err(StoreError::invalid_operation("store is already loaded"));
            }
            *slot = Some(persistence);
        }

        if let Err(e) = self.inner.reload().await {
            *self.inner.persistence.write() = None;
            return Err(e);
        }
        self.init();
        Ok(())
    }

    /// Starts the journal timers, the compactor and the watcher.
    fn init(&self) {
        let config = &self.inner.config;
        let mut tasks = Vec::new();

        if self.inner.journal.is_some() {
            if !config.sync_interval.is_zero() {
                tasks.push(spawn_periodic(
                    &self.inner,
                    "journal-sync",
                    config.sync_interval,
                    |inner| async move { inner.sync().await },
                ));
            }
            if !config.clean_interval.is_zero() {
                tasks.push(spawn_periodic(
                    &self.inner,
                    "journal-clean",
                    config.clean_interval,
                    |inner| async move { inner.clean().await },
                ));
            }
        }
        if !config.compaction_interval.is_zero() {
            tasks.push(spawn_periodic(
                &self.inner,
                "compaction",
                config.compaction_interval,
                |inner| async move { inner.compact().await.map(|_| ()) },
            ));
        }

        if config.watch && !config.watch_interval.is_zero() {
            if let Ok(persistence) = self.inner.persistence() {
                let watcher = Watcher::new(
                    config.data_directory.clone(),
                    config.blob_storage_directory.clone(),
                    persistence.write_epoch(),
                    config.watch_interval,
                    config.watch_debounce,
                );
                let weak = Arc::downgrade(&self.inner);
                tasks.push(watcher.start(self.inner.shutdown.subscribe(), move || {
                    let weak = weak.clone();
                    async move {
                        let Some(inner) = weak.upgrade() else { return };
                        inner.events.emit(StoreEventKind::ExternalModification);
                        if let Err(e) = inner.reload().await {
                            warn!(error = %e, "reload after external modification failed");
                        }
                    }
                }));
            }
        }

        debug!(tasks = tasks.len(), "started background tasks");
        self.inner.tasks.lock().extend(tasks);
    }

    /// The document model passed to [`Store::load`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotLoaded`] before `load`.
    pub fn model(&self) -> StoreResult<Arc<DocumentModel>> {
        Ok(self.inner.persistence()?.shared_model())
    }

    /// The queue every disk mutation of this store waits in.
    #[must_use]
    pub fn queue(&self) -> &PersistenceQueue {
        &self.inner.queue
    }

    /// The installed cache snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.inner.cache.snapshot()
    }

    /// Finds documents with a JSON query and optional JSON projection.
    pub fn find(
        &self,
        entity_set: &str,
        query: &serde_json::Value,
        fields: Option<&serde_json::Value>,
        opts: FindOptions<'_>,
    ) -> StoreResult<Cursor> {
        let filter = Filter::parse(query)?;
        let projection = match fields {
            Some(fields) => Projection::parse(fields)?,
            None => Projection::All,
        };
        self.find_with(entity_set, &filter, projection, opts)
    }

    /// Finds documents with a parsed filter and projection.
    pub fn find_with(
        &self,
        entity_set: &str,
        filter: &Filter,
        projection: Projection,
        opts: FindOptions<'_>,
    ) -> StoreResult<Cursor> {
        let persistence = self.inner.persistence()?;
        persistence.model().require(entity_set)?;
        let docs = match opts.transaction {
            Some(transaction) => transaction.working().find(entity_set, filter),
            None => self.inner.cache.snapshot().find(entity_set, filter),
        };
        Ok(Cursor::new(docs, projection))
    }

    /// Inserts a document and returns it as stored, without bookkeeping
    /// fields.
    ///
    /// A missing `_id` is generated, and so is a missing `shortid` for
    /// documents stored in the folder tree.
    pub async fn insert(
        &self,
        entity_set: &str,
        doc: Document,
        opts: WriteOptions<'_>,
    ) -> StoreResult<Document> {
        let stored = self
            .inner
            .mutate(opts.transaction, |model, working| {
                plan_insert(model, working, entity_set, doc)
            })
            .await?;
        Ok(stored.to_public())
    }

    /// Updates every document matching `query` and returns how many were
    /// updated (or upserted).
    pub async fn update(
        &self,
        entity_set: &str,
        query: &serde_json::Value,
        update: &serde_json::Value,
        opts: UpdateOptions<'_>,
    ) -> StoreResult<usize> {
        let filter = Filter::parse(query)?;
        let update = Update::parse(update)?;
        self.update_with(entity_set, &filter, &update, opts).await
    }

    /// Typed form of [`Store::update`].
    pub async fn update_with(
        &self,
        entity_set: &str,
        filter: &Filter,
        update: &Update,
        opts: UpdateOptions<'_>,
    ) -> StoreResult<usize> {
        let upsert = opts.upsert;
        self.inner
            .mutate(opts.transaction, |model, working| {
                plan_update(model, working, entity_set, filter, update, upsert)
            })
            .await
    }

    /// Removes every document matching `query`, including everything nested
    /// in removed folders. Returns how many matched.
    pub async fn remove(
        &self,
        entity_set: &str,
        query: &serde_json::Value,
        opts: WriteOptions<'_>,
    ) -> StoreResult<usize> {
        let filter = Filter::parse(query)?;
        self.remove_with(entity_set, &filter, opts).await
    }

    /// Typed form of [`Store::remove`].
    pub async fn remove_with(
        &self,
        entity_set: &str,
        filter: &Filter,
        opts: WriteOptions<'_>,
    ) -> StoreResult<usize> {
        self.inner
            .mutate(opts.transaction, |model, working| {
                plan_remove(model, working, entity_set, filter)
            })
            .await
    }

    /// Opens a transaction over a copy of the current cache.
    pub fn begin_transaction(&self) -> StoreResult<Transaction> {
        self.inner.persistence()?;
        let id = TransactionId::new(self.inner.next_txid.fetch_add(1, Ordering::SeqCst));
        debug!(transaction = %id, "began transaction");
        Ok(Transaction::new(id, &self.inner.cache.snapshot()))
    }

    /// Applies the transaction's writes to disk in order, then installs its
    /// working copy as the shared cache.
    ///
    /// # Errors
    ///
    /// A transaction can be finished once; a second attempt is
    /// [`StoreError::InvalidOperation`]. If a write fails the transaction is
    /// rolled back and the shared cache is left untouched.
    pub async fn commit_transaction(&self, transaction: &mut Transaction) -> StoreResult<()> {
        self.inner.commit(transaction).await
    }

    /// Discards the transaction.
    pub fn rollback_transaction(&self, transaction: &mut Transaction) -> StoreResult<()> {
        transaction.rollback()?;
        debug!(transaction = %transaction.id(), "rolled back transaction");
        Ok(())
    }

    /// Replays journal lines written by other processes.
    pub async fn sync(&self) -> StoreResult<()> {
        self.inner.sync().await
    }

    /// Rebuilds the cache from disk.
    pub async fn reload(&self) -> StoreResult<()> {
        self.inner.reload().await
    }

    /// Compacts every flat entity set.
    pub async fn compact(&self) -> StoreResult<Vec<CompactionResult>> {
        self.inner.compact().await
    }

    /// Deletes the whole data directory and empties the cache.
    pub async fn drop_store(&self) -> StoreResult<()> {
        match self.inner.persistence() {
            Ok(persistence) => {
                let _admission = self.inner.queue.admit().await?;
                persistence.drop_all().await?;
                self.inner.cache.install(CacheSnapshot::empty(persistence.model()));
            }
            Err(StoreError::NotLoaded) => {
                fs::remove_path(&self.inner.config.data_directory).await?;
            }
            Err(e) => return Err(e),
        }
        info!(root = %self.inner.config.data_directory.display(), "dropped store");
        Ok(())
    }

    /// Subscribes to store events.
    pub fn subscribe(&self) -> UnboundedReceiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// The event feed, for polling past events.
    #[must_use]
    pub fn events(&self) -> &EventFeed {
        &self.inner.events
    }

    /// Stops the background tasks. Every later operation fails with
    /// [`StoreError::StoreClosed`].
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.send_replace(true);
        let tasks: Vec<_> = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "background task panicked");
            }
        }
        info!(root = %self.inner.config.data_directory.display(), "closed store");
    }

    /// Returns true once [`Store::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("data_directory", &self.inner.config.data_directory)
            .field("loaded", &self.inner.persistence.read().is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}
