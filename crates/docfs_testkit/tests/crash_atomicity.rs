//! Interrupted writes are either fully applied or fully discarded on load.

use docfs_core::{StoreResult, WriteOptions};
use docfs_testkit::prelude::*;
use serde_json::json;

#[tokio::test]
async fn every_crash_point_recovers() {
    let mut harness = CrashRecoveryHarness::with_temp_dir().unwrap();
    let results = harness.run_all_tests().await;
    assert_eq!(results.len(), CrashPoint::ALL.len());
    assert!(harness.all_passed(), "{}", harness.summary());
}

#[tokio::test]
async fn interrupted_insert_leaves_no_document() -> StoreResult<()> {
    let store = TestStore::open().await;
    let staging = store.path().join("~~invoice");
    tokio::fs::create_dir_all(&staging).await?;
    tokio::fs::write(
        staging.join("config.json"),
        r#"{"_id":"x","$entitySet":"templates","name":"invoice","shortid":"s"}"#,
    )
    .await?;

    let store = store.reopen().await;
    assert_eq!(store.snapshot().len("templates"), 0);
    assert!(leftover_markers(store.path()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn promoted_marker_keeps_nested_documents() -> StoreResult<()> {
    let store = TestStore::open().await;
    let folder = store
        .insert("folders", doc(json!({ "name": "reports" })), WriteOptions::default())
        .await?;
    let shortid = folder.shortid.clone().unwrap();
    store
        .insert(
            "templates",
            doc(json!({ "name": "invoice", "folder": { "shortid": shortid }, "content": "x" })),
            WriteOptions::default(),
        )
        .await?;

    let mut renamed = store.snapshot().get("folders", &folder.id).cloned().unwrap();
    renamed.set("title", "Reports".into())?;
    interrupt_update(&store, &renamed, CrashPoint::AfterConsistent).await?;

    let store = store.reopen().await;
    let snapshot = store.snapshot();
    let folder = snapshot.get("folders", &folder.id).unwrap();
    assert_eq!(folder.get("title").unwrap().as_str(), Some("Reports"));
    let template = &snapshot.documents("templates")[0];
    assert_eq!(template.folder.as_ref().unwrap().shortid, shortid);
    assert_eq!(template.get("content").unwrap().as_str(), Some("x"));
    assert!(leftover_markers(store.path()).await?.is_empty());
    Ok(())
}
