//! # DocFS Testkit
//!
//! Test utilities for DocFS.
//!
//! This crate provides:
//! - Temporary stores loaded with a sample document model
//! - A crash recovery harness interrupting writes at each step of the
//!   staging protocol
//! - Property-based test generators using proptest
//! - A convergence harness for two stores sharing one data directory
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docfs_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn inserts() {
//!     let store = TestStore::open().await;
//!     store
//!         .insert("settings", doc(json!({ "key": "a" })), WriteOptions::default())
//!         .await
//!         .unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod convergence;
pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::convergence::*;
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use convergence::*;
pub use crash::*;
pub use fixtures::*;
pub use generators::*;
