//! Two stores over one directory converge through the journal.

use docfs_core::{StoreEventKind, StoreResult, UpdateOptions, WriteOptions};
use docfs_testkit::prelude::*;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn inserts_updates_and_removes_replicate() -> StoreResult<()> {
    let harness = ConvergenceHarness::new().await;
    let folder = harness
        .writer
        .insert("folders", doc(json!({ "name": "reports" })), WriteOptions::default())
        .await?;
    let template = harness
        .writer
        .insert(
            "templates",
            doc(json!({
                "name": "invoice",
                "folder": { "shortid": folder.shortid.clone().unwrap() },
                "content": "<p/>",
            })),
            WriteOptions::default(),
        )
        .await?;
    harness
        .writer
        .insert("settings", doc(json!({ "key": "theme", "value": "dark" })), WriteOptions::default())
        .await?;

    harness.sync_reader().await?;
    assert!(harness.converged().await);
    let replicated = harness.reader.snapshot();
    assert_eq!(
        replicated
            .get("templates", &template.id)
            .and_then(|d| d.get("content").map(|c| c.into_owned())),
        Some("<p/>".into())
    );

    harness
        .writer
        .update(
            "settings",
            &json!({ "key": "theme" }),
            &json!({ "$set": { "value": "light" } }),
            UpdateOptions::default(),
        )
        .await?;
    harness.sync_reader().await?;
    let value = harness
        .reader
        .find("settings", &json!({ "key": "theme" }), None, Default::default())?
        .first()
        .and_then(|d| d.get("value").map(|v| v.into_owned()));
    assert_eq!(value, Some("light".into()));

    harness
        .writer
        .remove("folders", &json!({ "name": "reports" }), WriteOptions::default())
        .await?;
    harness.sync_reader().await?;
    assert_eq!(harness.reader.snapshot().len("templates"), 0);
    assert_eq!(harness.reader.snapshot().len("folders"), 0);
    assert!(harness.converged().await);

    harness.close().await;
    Ok(())
}

#[tokio::test]
async fn writes_from_both_sides_converge() -> StoreResult<()> {
    let harness = ConvergenceHarness::new().await;
    harness
        .writer
        .insert("settings", doc(json!({ "key": "a" })), WriteOptions::default())
        .await?;
    tokio::time::sleep(Duration::from_millis(5)).await;
    // The reader syncs before its own write goes to disk.
    harness
        .reader
        .insert("settings", doc(json!({ "key": "b" })), WriteOptions::default())
        .await?;
    assert_eq!(harness.reader.snapshot().len("settings"), 2);

    tokio::time::sleep(Duration::from_millis(5)).await;
    harness.writer.sync().await?;
    assert_eq!(harness.writer.snapshot().len("settings"), 2);
    assert!(harness.converged().await);
    harness.close().await;
    Ok(())
}

#[tokio::test]
async fn committed_transaction_makes_readers_reload() -> StoreResult<()> {
    let harness = ConvergenceHarness::new().await;
    let mut events = harness.reader.subscribe();

    let mut tx = harness.writer.begin_transaction()?;
    for key in ["a", "b"] {
        harness
            .writer
            .insert("settings", doc(json!({ "key": key })), WriteOptions::in_transaction(&mut tx))
            .await?;
    }
    harness.writer.commit_transaction(&mut tx).await?;

    harness.sync_reader().await?;
    assert_eq!(harness.reader.snapshot().len("settings"), 2);
    let event = events.recv().await.unwrap();
    assert_eq!(event.kind, StoreEventKind::Reload);
    assert!(harness.converged().await);
    harness.close().await;
    Ok(())
}

#[tokio::test]
async fn corrupted_journal_falls_back_to_reload() -> StoreResult<()> {
    let harness = ConvergenceHarness::new().await;
    harness
        .writer
        .insert("settings", doc(json!({ "key": "a" })), WriteOptions::default())
        .await?;
    let journal = harness.path().join(docfs_core::JOURNAL_FILE);
    let mut contents = tokio::fs::read_to_string(&journal).await?;
    contents.push_str("{not json\n");
    tokio::fs::write(&journal, contents).await?;

    harness.sync_reader().await?;
    assert_eq!(harness.reader.snapshot().len("settings"), 1);
    assert!(harness.converged().await);
    harness.close().await;
    Ok(())
}

#[tokio::test]
async fn stale_reader_reloads_everything() -> StoreResult<()> {
    let writer = TestStore::open().await;
    let reader = open_store(
        test_config(writer.path()).sync_staleness(Duration::from_millis(10)),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Written without a journal line, so only a reload can see it.
    tokio::fs::write(
        writer.path().join("settings"),
        "{\"_id\":\"x\",\"key\":\"external\"}\n",
    )
    .await?;
    reader.sync().await?;
    assert_eq!(reader.snapshot().len("settings"), 1);
    reader.close().await;
    Ok(())
}
