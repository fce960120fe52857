//! Documents read back after a reload equal what was written.

use docfs_core::{Document, StoreResult, Value, WriteOptions};
use docfs_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;

fn public(doc: &Document) -> Document {
    Document {
        etag: None,
        ..doc.clone()
    }
}

#[tokio::test]
async fn text_and_binary_properties_round_trip() -> StoreResult<()> {
    let store = TestStore::open().await;
    let folder = store
        .insert("folders", doc(json!({ "name": "reports" })), WriteOptions::default())
        .await?;

    let mut template = doc(json!({
        "name": "invoice",
        "folder": { "shortid": folder.shortid.clone().unwrap() },
        "content": "<h1>Fa\u{e7}ture \u{4e2d}</h1>\n",
        "chrome": { "headerTemplate": "<header/>", "landscape": true },
        "recipe": "chrome-pdf",
        "tags": ["a", 1, null],
    }));
    template = store.insert("templates", template, WriteOptions::default()).await?;

    let mut asset = doc(json!({ "name": "logo.png" }));
    asset.set("content", Value::Bytes(vec![0x89, b'P', b'N', b'G', 0, 255]))?;
    let asset = store.insert("assets", asset, WriteOptions::default()).await?;

    let dir = store.path().join("reports").join("invoice");
    assert!(dir.join("content.html").exists());
    assert!(dir.join("headerTemplate.html").exists());
    assert_eq!(
        tokio::fs::read(store.path().join("logo.png").join("content.bin")).await?,
        vec![0x89, b'P', b'N', b'G', 0, 255]
    );

    let store = store.reopen().await;
    let snapshot = store.snapshot();
    let loaded = snapshot.get("templates", &template.id).unwrap();
    assert!(loaded.same_content(&Document {
        entity_set: Some("templates".into()),
        ..template.clone()
    }));
    let loaded = snapshot.get("assets", &asset.id).unwrap();
    assert_eq!(
        loaded.get("content").unwrap().as_bytes(),
        Some(&[0x89, b'P', b'N', b'G', 0, 255][..])
    );
    Ok(())
}

#[tokio::test]
async fn flat_documents_round_trip_in_insertion_order() -> StoreResult<()> {
    let store = TestStore::open().await;
    for key in ["b", "a", "c"] {
        store
            .insert(
                "settings",
                doc(json!({ "key": key, "nested": { "n": 1.5 } })),
                WriteOptions::default(),
            )
            .await?;
    }
    let before: Vec<Document> = store
        .snapshot()
        .documents("settings")
        .iter()
        .map(public)
        .collect();

    let store = store.reopen().await;
    let after: Vec<Document> = store
        .snapshot()
        .documents("settings")
        .iter()
        .map(public)
        .collect();
    assert_eq!(before, after);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn generated_documents_round_trip(
        docs in prop::collection::vec(document_strategy(), 1..6),
        content in text_content_strategy(),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let store = TestStore::open().await;
            let mut seen = HashSet::new();
            let mut ids = Vec::new();
            for mut d in docs {
                if !seen.insert(d.name().unwrap().to_lowercase()) {
                    continue;
                }
                d.set("content", Value::Text(content.clone())).unwrap();
                let stored = store
                    .insert("templates", d, WriteOptions::default())
                    .await
                    .unwrap();
                ids.push(stored.id);
            }
            let before = store.snapshot();

            let store = store.reopen().await;
            let after = store.snapshot();
            assert_eq!(after.len("templates"), ids.len());
            assert!(before.same_content(&after));
        });
    }
}
