//! Find command implementation.

use super::{load_model, persistence, CommandResult};
use docfs_core::{CacheSnapshot, Cursor, Document, Filter, Projection};
use std::path::Path;

/// Runs a query against one entity set and prints matches as JSON lines.
pub async fn run(
    path: &Path,
    model_path: Option<&Path>,
    entity_set: &str,
    query: &str,
    limit: Option<usize>,
) -> CommandResult<()> {
    for doc in find(path, model_path, entity_set, query, limit).await? {
        println!("{}", serde_json::to_string(&doc.to_public().to_json())?);
    }
    Ok(())
}

/// Evaluates `query` without repairing or otherwise touching the directory.
pub async fn find(
    path: &Path,
    model_path: Option<&Path>,
    entity_set: &str,
    query: &str,
    limit: Option<usize>,
) -> CommandResult<Vec<Document>> {
    let model = load_model(path, model_path).await?;
    model.require(entity_set)?;
    let filter = Filter::parse(&serde_json::from_str(query)?)?;

    let persistence = persistence(path, model.clone());
    let snapshot = CacheSnapshot::from_documents(&model, persistence.read().await?);
    let mut cursor = Cursor::new(snapshot.find(entity_set, &filter), Projection::All);
    if let Some(limit) = limit {
        cursor = cursor.limit(limit);
    }
    Ok(cursor.to_vec())
}
