//! Store event feed.
//!
//! Every committed mutation, reload and detected external modification is
//! published to subscribers in the order it happened.
//!
//! ```rust,ignore
//! let mut events = store.subscribe();
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         if matches!(event.kind, StoreEventKind::ExternalModification) {
//!             invalidate_render_cache();
//!         }
//!     }
//! });
//! ```

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEventKind {
    /// A document was inserted.
    Insert {
        /// Entity set name.
        entity_set: String,
        /// Document id.
        id: String,
    },
    /// A document was updated.
    Update {
        /// Entity set name.
        entity_set: String,
        /// Document id.
        id: String,
    },
    /// A document was removed.
    Remove {
        /// Entity set name.
        entity_set: String,
        /// Document id.
        id: String,
    },
    /// A transaction committed.
    Commit {
        /// Number of writes the transaction applied.
        writes: usize,
    },
    /// The cache was rebuilt from disk.
    Reload,
    /// Files changed outside of this store.
    ExternalModification,
}

/// An event with its position in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    /// Monotonic sequence number, starting at 1.
    pub sequence: u64,
    /// What happened.
    pub kind: StoreEventKind,
}

/// Distributes store events to subscribers.
pub struct EventFeed {
    subscribers: RwLock<Vec<UnboundedSender<StoreEvent>>>,
    history: RwLock<Vec<StoreEvent>>,
    max_history: usize,
    next_sequence: AtomicU64,
}

impl EventFeed {
    /// Creates a feed keeping the last 1000 events.
    pub fn new() -> Self {
        Self::with_max_history(1000)
    }

    /// Creates a feed with a specific history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            max_history,
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Publishes an event and returns its sequence number.
    pub fn emit(&self, kind: StoreEventKind) -> u64 {
        let event = {
            let mut history = self.history.write();
            let event = StoreEvent {
                sequence: self.next_sequence.fetch_add(1, Ordering::SeqCst),
                kind,
            };
            history.push(event.clone());
            if history.len() > self.max_history {
                let excess = history.len() - self.max_history;
                history.drain(0..excess);
            }
            event
        };

        let sequence = event.sequence;
        self.subscribers
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());
        sequence
    }

    /// Returns up to `limit` events with a sequence greater than `cursor`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<StoreEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFeed")
            .field("subscribers", &self.subscriber_count())
            .field("max_history", &self.max_history)
            .finish_non_exhaustive()
    }
}
