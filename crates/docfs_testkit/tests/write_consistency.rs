//! Acknowledged writes stay visible: right after they return, after a
//! restart, and after a mutation that failed part way.

use docfs_core::journal::{parse, JournalOperation, JOURNAL_FILE};
use docfs_core::{FindOptions, StoreResult, UpdateOptions, WriteOptions};
use docfs_testkit::prelude::*;
use serde_json::json;

#[tokio::test]
async fn update_is_visible_to_the_next_find() -> StoreResult<()> {
    let store = TestStore::open().await;
    for i in 0..200 {
        let id = format!("s{i}");
        store
            .insert("settings", doc(json!({ "_id": id, "value": 0 })), WriteOptions::default())
            .await?;
        store
            .update(
                "settings",
                &json!({ "_id": id }),
                &json!({ "$set": { "value": 1 } }),
                UpdateOptions::default(),
            )
            .await?;

        let found = store
            .find("settings", &json!({ "_id": id }), None, FindOptions::default())?
            .to_vec();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].fields["value"].as_integer(), Some(1), "stale read of {id}");
    }

    // Insertion order survives the interleaved updates.
    let ids: Vec<_> = store
        .snapshot()
        .documents("settings")
        .iter()
        .map(|d| d.id.clone())
        .collect();
    let expected: Vec<_> = (0..200).map(|i| format!("s{i}")).collect();
    assert_eq!(ids, expected);
    Ok(())
}

#[tokio::test]
async fn insert_after_a_torn_flat_tail_survives_restart() -> StoreResult<()> {
    let store = TestStore::open().await;
    for i in 0..20 {
        store
            .insert(
                "settings",
                doc(json!({ "_id": format!("k{i}"), "value": i })),
                WriteOptions::default(),
            )
            .await?;
    }
    store.close().await;

    // A crash cut the last record short.
    let file = store.path().join("settings");
    let mut contents = tokio::fs::read_to_string(&file).await?;
    contents.push_str(r#"{"_id":"torn","val"#);
    tokio::fs::write(&file, contents).await?;

    let store = store.reopen().await;
    assert_eq!(store.snapshot().len("settings"), 20);
    store
        .insert("settings", doc(json!({ "_id": "after", "value": 99 })), WriteOptions::default())
        .await?;

    let store = store.reopen().await;
    let snapshot = store.snapshot();
    assert!(snapshot.get("settings", "after").is_some());
    assert!(snapshot.get("settings", "torn").is_none());
    assert_eq!(snapshot.len("settings"), 21);
    Ok(())
}

#[tokio::test]
async fn partially_failed_update_reloads_from_disk() -> StoreResult<()> {
    let store = TestStore::open().await;
    for (name, shortid) in [("f1", "one"), ("f2", "two")] {
        store
            .insert(
                "folders",
                doc(json!({ "name": name, "shortid": shortid })),
                WriteOptions::default(),
            )
            .await?;
    }
    for name in ["a", "b"] {
        store
            .insert(
                "templates",
                doc(json!({ "_id": name, "name": name, "tag": "x", "folder": { "shortid": "one" } })),
                WriteOptions::default(),
            )
            .await?;
    }
    // Something outside the store already sits where `b` would move.
    tokio::fs::create_dir_all(store.path().join("f2").join("b")).await?;

    let moved = store
        .update(
            "templates",
            &json!({ "tag": "x" }),
            &json!({ "$set": { "folder": { "shortid": "two" } } }),
            UpdateOptions::default(),
        )
        .await;
    assert!(moved.is_err());

    // `a` landed before `b` failed: the cache follows the disk.
    assert!(store.path().join("f2").join("a").exists());
    assert!(!store.path().join("f1").join("a").exists());
    let snapshot = store.snapshot();
    let a = snapshot.get("templates", "a").unwrap();
    assert_eq!(a.folder.as_ref().map(|f| f.shortid.as_str()), Some("two"));
    let b = snapshot.get("templates", "b").unwrap();
    assert_eq!(b.folder.as_ref().map(|f| f.shortid.as_str()), Some("one"));

    // Peers are told to rebuild.
    let journal = tokio::fs::read_to_string(store.path().join(JOURNAL_FILE)).await?;
    let last = parse(&journal)?.pop().unwrap();
    assert_eq!(last.operation, JournalOperation::Reload);

    store
        .update(
            "templates",
            &json!({ "_id": "a" }),
            &json!({ "$set": { "title": "moved" } }),
            UpdateOptions::default(),
        )
        .await?;
    store
        .update(
            "templates",
            &json!({ "_id": "b" }),
            &json!({ "$set": { "title": "stayed" } }),
            UpdateOptions::default(),
        )
        .await?;

    let store = store.reopen().await;
    let mut ids: Vec<_> = store
        .snapshot()
        .documents("templates")
        .iter()
        .map(|d| d.id.clone())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(store.path().join("f2").join("a").exists());
    assert!(store.path().join("f1").join("b").exists());
    Ok(())
}

#[tokio::test]
async fn store_writes_land_in_admission_order() -> StoreResult<()> {
    let store = TestStore::open().await;
    let held = store.queue().admit().await?;

    let mut handles = Vec::new();
    for (i, key) in ["a", "b", "c"].into_iter().enumerate() {
        let writer = store.store.clone();
        handles.push(tokio::spawn(async move {
            writer
                .insert("settings", doc(json!({ "_id": key, "key": key })), WriteOptions::default())
                .await
        }));
        // Let the write reach the queue before submitting the next one.
        while store.queue().waiting() < i + 1 {
            tokio::task::yield_now().await;
        }
    }
    drop(held);
    for handle in handles {
        handle.await.unwrap()?;
    }

    let journal = tokio::fs::read_to_string(store.path().join(JOURNAL_FILE)).await?;
    let journaled: Vec<_> = parse(&journal)?
        .into_iter()
        .filter_map(|r| r.doc.map(|d| d.id))
        .collect();
    assert_eq!(journaled, vec!["a", "b", "c"]);

    let flat = tokio::fs::read_to_string(store.path().join("settings")).await?;
    let written: Vec<String> = flat
        .lines()
        .map(|line| {
            let record: serde_json::Value = serde_json::from_str(line).unwrap();
            record["_id"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(written, vec!["a", "b", "c"]);
    Ok(())
}
