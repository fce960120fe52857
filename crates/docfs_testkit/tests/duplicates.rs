//! Sibling names are unique case-insensitively across split entity sets.

use docfs_core::{StoreError, StoreResult, UpdateOptions, WriteOptions};
use docfs_testkit::prelude::*;
use serde_json::json;

#[tokio::test]
async fn duplicate_sibling_is_rejected_before_writing() -> StoreResult<()> {
    let store = TestStore::open().await;
    store
        .insert("templates", doc(json!({ "name": "Invoice" })), WriteOptions::default())
        .await?;

    let err = store
        .insert("assets", doc(json!({ "name": "invoice" })), WriteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateEntry { .. }), "{err}");
    assert!(err.is_validation());
    assert_eq!(store.snapshot().len("assets"), 0);

    let mut entries = tokio::fs::read_dir(store.path()).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    assert_eq!(names, vec!["Invoice".to_string()]);
    Ok(())
}

#[tokio::test]
async fn same_name_in_different_folders_is_allowed() -> StoreResult<()> {
    let store = TestStore::open().await;
    let mut shortids = Vec::new();
    for name in ["a", "b"] {
        let folder = store
            .insert("folders", doc(json!({ "name": name })), WriteOptions::default())
            .await?;
        shortids.push(folder.shortid.unwrap());
    }
    for shortid in &shortids {
        store
            .insert(
                "templates",
                doc(json!({ "name": "invoice", "folder": { "shortid": shortid } })),
                WriteOptions::default(),
            )
            .await?;
    }
    assert_eq!(store.snapshot().len("templates"), 2);
    assert!(store.path().join("a").join("invoice").exists());
    assert!(store.path().join("b").join("invoice").exists());
    Ok(())
}

#[tokio::test]
async fn rename_onto_existing_sibling_is_rejected() -> StoreResult<()> {
    let store = TestStore::open().await;
    for name in ["first", "second"] {
        store
            .insert("templates", doc(json!({ "name": name })), WriteOptions::default())
            .await?;
    }

    let err = store
        .update(
            "templates",
            &json!({ "name": "second" }),
            &json!({ "$set": { "name": "FIRST" } }),
            UpdateOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateEntry { .. }));
    assert!(store.path().join("second").exists());

    let store = store.reopen().await;
    let mut names: Vec<String> = store
        .snapshot()
        .documents("templates")
        .iter()
        .filter_map(|d| d.name().map(str::to_string))
        .collect();
    names.sort();
    assert_eq!(names, vec!["first", "second"]);
    Ok(())
}

#[tokio::test]
async fn flat_sets_do_not_take_part_in_name_checks() -> StoreResult<()> {
    let store = TestStore::open().await;
    for _ in 0..2 {
        store
            .insert("settings", doc(json!({ "name": "same" })), WriteOptions::default())
            .await?;
    }
    assert_eq!(store.snapshot().len("settings"), 2);
    Ok(())
}
