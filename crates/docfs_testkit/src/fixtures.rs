//! Test fixtures and store helpers.
//!
//! Every fixture store lives in its own temporary directory, is loaded with
//! [`sample_model`] and has its background tasks disabled so tests decide
//! when journal syncs and compactions happen.

use docfs_core::{
    Document, DocumentModel, DocumentProperty, EntitySetDescriptor, Store, StoreConfig,
};
use std::path::Path;
use tempfile::TempDir;

/// Model used by fixtures: templates with text sidecars, assets with a
/// binary sidecar, flat settings, plus the implicit folders set.
pub fn sample_model() -> DocumentModel {
    DocumentModel::new(vec![
        EntitySetDescriptor::split("templates")
            .with_property(DocumentProperty::text("content", "html"))
            .with_property(DocumentProperty::text("chrome.headerTemplate", "html")),
        EntitySetDescriptor::split("assets")
            .with_property(DocumentProperty::binary("content", "bin")),
        EntitySetDescriptor::flat("settings"),
    ])
}

/// Configuration for a deterministic test store at `path`.
pub fn test_config(path: &Path) -> StoreConfig {
    StoreConfig::new(path).without_background_tasks()
}

/// Opens and loads a store over `config` with the sample model.
pub async fn open_store(config: StoreConfig) -> Store {
    let store = Store::open(config);
    store
        .load(sample_model())
        .await
        .expect("Failed to load test store");
    store
}

/// Builds a document from JSON.
pub fn doc(json: serde_json::Value) -> Document {
    Document::from_json(json).expect("Invalid test document")
}

/// A loaded store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Store,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestStore {
    /// Creates a store in a fresh temporary directory.
    pub async fn open() -> Self {
        Self::with_config(|config| config).await
    }

    /// Creates a store with a customized configuration.
    pub async fn with_config<F>(configure: F) -> Self
    where
        F: FnOnce(StoreConfig) -> StoreConfig,
    {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = open_store(configure(test_config(temp_dir.path()))).await;
        Self { store, temp_dir }
    }

    /// The data directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Opens a second, independent store over the same directory.
    pub async fn open_second(&self) -> Store {
        open_store(test_config(self.path())).await
    }

    /// Closes the store and loads the directory again from disk.
    pub async fn reopen(mut self) -> Self {
        self.store.close().await;
        self.store = open_store(test_config(self.path())).await;
        self
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use docfs_core::WriteOptions;
    use serde_json::json;

    /// A store with a `reports` folder holding `count` templates and
    /// `count` settings.
    pub async fn populated_store(count: usize) -> TestStore {
        let store = TestStore::open().await;
        let folder = store
            .insert(
                "folders",
                doc(json!({ "name": "reports" })),
                WriteOptions::default(),
            )
            .await
            .expect("Failed to insert folder");
        let shortid = folder.shortid.expect("Folder without shortid");

        for i in 0..count {
            store
                .insert(
                    "templates",
                    doc(json!({
                        "name": format!("template-{i}"),
                        "folder": { "shortid": shortid },
                        "content": format!("<p>{i}</p>"),
                        "recipe": if i % 2 == 0 { "html" } else { "chrome-pdf" },
                    })),
                    WriteOptions::default(),
                )
                .await
                .expect("Failed to insert template");
            store
                .insert(
                    "settings",
                    doc(json!({ "key": format!("key-{i}"), "value": i })),
                    WriteOptions::default(),
                )
                .await
                .expect("Failed to insert setting");
        }
        store
    }
}
