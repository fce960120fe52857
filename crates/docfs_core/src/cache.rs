//! In-memory document cache.
//!
//! The cache is an immutable [`CacheSnapshot`] behind an `Arc`. Readers take
//! the current `Arc` and evaluate queries without locking anything else;
//! writers build a new snapshot and install it in one swap. A snapshot holds
//! each entity set in its own `Arc<Vec<_>>`, so cloning a snapshot is cheap
//! and only entity sets that are actually modified get copied.

use crate::document::Document;
use crate::model::DocumentModel;
use crate::query::Filter;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// An immutable view of every live document, grouped by entity set.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    sets: HashMap<String, Arc<Vec<Document>>>,
}

impl CacheSnapshot {
    /// Creates an empty snapshot with an entry for every entity set of
    /// `model`.
    #[must_use]
    pub fn empty(model: &DocumentModel) -> Self {
        let sets = model
            .entity_sets
            .iter()
            .map(|s| (s.name.clone(), Arc::new(Vec::new())))
            .collect();
        Self { sets }
    }

    /// Groups loaded documents by their entity set. Documents of sets
    /// missing from `model` are dropped.
    #[must_use]
    pub fn from_documents(model: &DocumentModel, documents: Vec<Document>) -> Self {
        let mut grouped: HashMap<String, Vec<Document>> = model
            .entity_sets
            .iter()
            .map(|s| (s.name.clone(), Vec::new()))
            .collect();

        for doc in documents {
            let Some(set) = doc.entity_set.as_deref() else {
                continue;
            };
            if let Some(docs) = grouped.get_mut(set) {
                docs.push(doc);
            }
        }

        Self {
            sets: grouped
                .into_iter()
                .map(|(name, docs)| (name, Arc::new(docs)))
                .collect(),
        }
    }

    /// Documents of one entity set, in insertion order.
    #[must_use]
    pub fn documents(&self, entity_set: &str) -> &[Document] {
        self.sets.get(entity_set).map_or(&[], |docs| docs.as_slice())
    }

    /// Names of the entity sets in the snapshot.
    pub fn entity_sets(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    /// Every document of every entity set.
    pub fn all_documents(&self) -> impl Iterator<Item = &Document> {
        self.sets.values().flat_map(|docs| docs.iter())
    }

    /// Number of documents in one entity set.
    #[must_use]
    pub fn len(&self, entity_set: &str) -> usize {
        self.documents(entity_set).len()
    }

    /// Total number of documents.
    #[must_use]
    pub fn total(&self) -> usize {
        self.sets.values().map(|docs| docs.len()).sum()
    }

    /// Looks up a document by id.
    #[must_use]
    pub fn get(&self, entity_set: &str, id: &str) -> Option<&Document> {
        self.documents(entity_set).iter().find(|d| d.id == id)
    }

    /// Looks up a document by short id.
    #[must_use]
    pub fn get_by_shortid(&self, entity_set: &str, shortid: &str) -> Option<&Document> {
        self.documents(entity_set)
            .iter()
            .find(|d| d.shortid.as_deref() == Some(shortid))
    }

    /// Clones every document of `entity_set` matching `filter`.
    #[must_use]
    pub fn find(&self, entity_set: &str, filter: &Filter) -> Vec<Document> {
        self.documents(entity_set)
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect()
    }

    /// Mutable access to one entity set, copying it if it is shared.
    fn set_mut(&mut self, entity_set: &str) -> &mut Vec<Document> {
        let docs = self.sets.entry(entity_set.to_string()).or_default();
        Arc::make_mut(docs)
    }

    /// Replaces the document with the same id, or appends it.
    pub fn upsert(&mut self, entity_set: &str, doc: Document) {
        let docs = self.set_mut(entity_set);
        match docs.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => *existing = doc,
            None => docs.push(doc),
        }
    }

    /// Removes the document with the same id, then appends `doc`.
    ///
    /// Incremental journal replay uses this ordering.
    pub fn replace_and_append(&mut self, entity_set: &str, doc: Document) {
        let docs = self.set_mut(entity_set);
        docs.retain(|d| d.id != doc.id);
        docs.push(doc);
    }

    /// Removes a document by id.
    pub fn remove(&mut self, entity_set: &str, id: &str) -> Option<Document> {
        if self.get(entity_set, id).is_none() {
            return None;
        }
        let docs = self.set_mut(entity_set);
        let index = docs.iter().position(|d| d.id == id)?;
        Some(docs.remove(index))
    }

    /// Compares two snapshots ignoring `$$etag` and document order.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        let names = self.entity_sets().chain(other.entity_sets());
        for name in names {
            let ours = self.documents(name);
            let theirs = other.documents(name);
            if ours.len() != theirs.len() {
                return false;
            }
            let all_found = ours.iter().all(|doc| {
                other
                    .get(name, &doc.id)
                    .is_some_and(|candidate| candidate.same_content(doc))
            });
            if !all_found {
                return false;
            }
        }
        true
    }
}

/// The shared, swappable cache.
#[derive(Debug, Default)]
pub struct DocumentCache {
    current: RwLock<Arc<CacheSnapshot>>,
}

impl DocumentCache {
    /// Creates a cache holding an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the installed snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Installs a new snapshot wholesale.
    pub fn install(&self, snapshot: CacheSnapshot) {
        *self.current.write() = Arc::new(snapshot);
    }
}
