//! Benchmark utilities.

use docfs_core::{CacheSnapshot, Document, DocumentModel, DocumentProperty, EntitySetDescriptor};
use rand::Rng;
use serde_json::json;

const RECIPES: [&str; 4] = ["html", "chrome-pdf", "xlsx", "text"];

/// Model used by every benchmark.
pub fn bench_model() -> DocumentModel {
    DocumentModel::new(vec![
        EntitySetDescriptor::split("templates")
            .with_property(DocumentProperty::text("content", "html")),
        EntitySetDescriptor::flat("settings"),
    ])
}

/// Generate random alphanumeric text of the specified length.
pub fn random_text(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(rng.sample(rand::distributions::Alphanumeric)))
        .collect()
}

/// Generate a template document with a random recipe and nested options.
pub fn random_template(index: usize, content_len: usize) -> Document {
    let mut rng = rand::thread_rng();
    Document::from_json(json!({
        "_id": format!("t{index}"),
        "$entitySet": "templates",
        "name": format!("template-{index}"),
        "recipe": RECIPES[rng.gen_range(0..RECIPES.len())],
        "chrome": { "landscape": rng.gen::<bool>(), "scale": rng.gen_range(1..4) },
        "tags": (0..rng.gen_range(0..4)).map(|t| format!("tag{t}")).collect::<Vec<_>>(),
        "content": random_text(content_len),
    }))
    .expect("Generated document is valid")
}

/// A snapshot holding `count` generated templates.
pub fn populated_snapshot(count: usize) -> CacheSnapshot {
    let documents = (0..count).map(|i| random_template(i, 64)).collect();
    CacheSnapshot::from_documents(&bench_model(), documents)
}
