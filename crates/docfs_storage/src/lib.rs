//! # DocFS Storage
//!
//! Filesystem primitives for DocFS.
//!
//! This crate provides the lowest-level building blocks the document store
//! uses to keep its directory tree consistent. It knows nothing about
//! documents, entity sets or journals.
//!
//! ## Design Principles
//!
//! - Every multi-step write goes through a **staging marker** name so that a
//!   crash can be told apart from valid data
//! - Renames are retried through a bounded [`retry`] combinator, since other
//!   processes (virus scanners, editors, a second store) may hold transient
//!   locks on the entries being swapped
//! - All I/O is asynchronous (`tokio::fs`)
//!
//! ## Staging markers
//!
//! ```text
//! ~~[original~]new   inconsistent staging entry, always discarded on load
//! ~[original~]new    consistent entry, pending the final rename to `new`
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod fs;
mod replace;
mod retry;
mod staging;

pub use error::{StorageError, StorageResult};
pub use replace::{promote_marker, DirectoryReplace};
pub use retry::{retry, RetryPolicy};
pub use staging::{
    validate_entry_name, MarkerState, StagingMarker, CONSISTENT_PREFIX, INCONSISTENT_PREFIX,
};
