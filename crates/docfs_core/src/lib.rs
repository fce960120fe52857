//! # DocFS Core
//!
//! A transactional document store kept directly on the filesystem.
//!
//! This crate provides:
//! - A persistence layer mapping entity sets to a folder tree (one directory
//!   per document) or to append-only record files
//! - A crash-safe staging-rename write protocol and a repair pass that
//!   finishes or discards interrupted writes
//! - A FIFO persistence queue and transactions over private cache copies
//! - A shared journal through which processes using the same directory
//!   converge without full reloads
//! - A polling watcher reporting external modifications
//! - An in-memory cache with a MongoDB-style query evaluator
//!
//! ## Example
//!
//! ```rust,ignore
//! use docfs_core::{
//!     Document, DocumentModel, EntitySetDescriptor, FindOptions, Store, StoreConfig,
//!     WriteOptions,
//! };
//! use serde_json::json;
//!
//! let store = Store::open(StoreConfig::new("data"));
//! store
//!     .load(DocumentModel::new(vec![
//!         EntitySetDescriptor::split("templates"),
//!         EntitySetDescriptor::flat("settings"),
//!     ]))
//!     .await?;
//!
//! store
//!     .insert("settings", Document::from_json(json!({ "key": "theme" }))?, WriteOptions::default())
//!     .await?;
//! let themes = store
//!     .find("settings", &json!({ "key": "theme" }), None, FindOptions::default())?
//!     .to_vec();
//! store.close().await;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod document;
mod error;
mod events;
pub mod journal;
mod model;
pub mod persistence;
pub mod query;
mod store;
pub mod transaction;
mod types;
pub mod value;
pub mod watcher;

pub use cache::{CacheSnapshot, DocumentCache};
pub use config::StoreConfig;
pub use document::{
    Document, FolderRef, ENTITY_SET_KEY, ETAG_KEY, FOLDER_KEY, ID_KEY, NAME_KEY, SHORTID_KEY,
};
pub use error::{StoreError, StoreResult};
pub use events::{EventFeed, StoreEvent, StoreEventKind};
pub use journal::{Journal, JournalOperation, JournalRecord, JOURNAL_FILE};
pub use model::{
    DocumentModel, DocumentProperty, EntitySetDescriptor, Extension, PropertyKind,
    DEFAULT_FOLDER_ENTITY_SET,
};
pub use persistence::{CompactionResult, Persistence, RepairReport, WriteEpoch};
pub use query::{Cursor, Filter, Projection, Sort, Update};
pub use store::{FindOptions, Store, UpdateOptions, WriteOptions};
pub use transaction::{PendingWrite, Transaction, TransactionState};
pub use types::{Timestamp, TransactionId};
pub use value::{Map, Value};

// Re-export for callers configuring rename retries.
pub use docfs_storage::RetryPolicy;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
