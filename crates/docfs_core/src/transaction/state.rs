//! Transaction state.

use crate::cache::CacheSnapshot;
use crate::document::Document;
use crate::error::{StoreError, StoreResult};
use crate::persistence::Persistence;
use crate::types::TransactionId;
use std::sync::Arc;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is open and accepts writes.
    Active,
    /// Pending writes are being applied to disk.
    Committing,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back, or its commit failed.
    RolledBack,
}

/// A persistence operation waiting to be applied to disk.
///
/// Each write keeps the working state it was recorded against, which is what
/// folder chains and duplicate names are resolved in when it is applied.
#[derive(Debug, Clone)]
pub enum PendingWrite {
    /// A new document.
    Insert {
        /// The document as inserted.
        doc: Document,
        /// Working state before the insert.
        before: Arc<CacheSnapshot>,
    },
    /// A modified document.
    Update {
        /// The document after the update.
        doc: Document,
        /// The document before the update.
        original: Document,
        /// Working state before the update.
        before: Arc<CacheSnapshot>,
    },
    /// A removed document.
    Remove {
        /// The removed document.
        doc: Document,
        /// Working state before the removal.
        before: Arc<CacheSnapshot>,
    },
}

impl PendingWrite {
    /// The document the write concerns.
    #[must_use]
    pub fn document(&self) -> &Document {
        match self {
            Self::Insert { doc, .. } | Self::Update { doc, .. } | Self::Remove { doc, .. } => doc,
        }
    }

    /// Applies the write to disk.
    pub(crate) async fn apply(&self, persistence: &Persistence) -> StoreResult<()> {
        match self {
            Self::Insert { doc, before } => persistence.insert(doc, before).await,
            Self::Update {
                doc,
                original,
                before,
            } => persistence.update(doc, original, before).await,
            Self::Remove { doc, before } => persistence.remove(doc, before).await,
        }
    }
}

/// An open transaction.
///
/// A transaction owns a private copy of the cache. Writes scoped to it change
/// that copy and are buffered; nothing reaches disk or the shared cache until
/// commit.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    working: CacheSnapshot,
    writes: Vec<PendingWrite>,
}

impl Transaction {
    /// Creates a transaction working on a copy of `base`.
    pub(crate) fn new(id: TransactionId, base: &CacheSnapshot) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            working: base.clone(),
            writes: Vec::new(),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// The private working copy.
    #[must_use]
    pub fn working(&self) -> &CacheSnapshot {
        &self.working
    }

    /// Mutable access to the working copy.
    pub(crate) fn working_mut(&mut self) -> StoreResult<&mut CacheSnapshot> {
        self.ensure_active()?;
        Ok(&mut self.working)
    }

    /// Buffers a write.
    pub(crate) fn record(&mut self, write: PendingWrite) -> StoreResult<()> {
        self.ensure_active()?;
        self.writes.push(write);
        Ok(())
    }

    /// Returns the number of pending writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Returns the pending writes in recording order.
    pub fn pending_writes(&self) -> impl Iterator<Item = &PendingWrite> {
        self.writes.iter()
    }

    /// Moves the transaction into `Committing`.
    pub(crate) fn begin_commit(&mut self) -> StoreResult<()> {
        self.ensure_active()?;
        self.state = TransactionState::Committing;
        Ok(())
    }

    /// Marks the transaction as committed and hands out its working copy.
    pub(crate) fn mark_committed(&mut self) -> CacheSnapshot {
        self.state = TransactionState::Committed;
        self.writes.clear();
        std::mem::take(&mut self.working)
    }

    /// Marks the transaction as rolled back, dropping its buffered work.
    pub(crate) fn mark_rolled_back(&mut self) {
        self.state = TransactionState::RolledBack;
        self.writes.clear();
        self.working = CacheSnapshot::default();
    }

    /// Rolls the transaction back.
    pub(crate) fn rollback(&mut self) -> StoreResult<()> {
        self.ensure_active()?;
        self.mark_rolled_back();
        Ok(())
    }

    /// Ensures the transaction is active.
    fn ensure_active(&self) -> StoreResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committing => {
                Err(StoreError::invalid_operation("transaction commit in progress"))
            }
            TransactionState::Committed => Err(StoreError::invalid_operation(
                "transaction already committed",
            )),
            TransactionState::RolledBack => Err(StoreError::invalid_operation(
                "transaction already rolled back",
            )),
        }
    }
}
