//! Inspect command implementation.

use super::{load_model, persistence, CommandResult};
use docfs_core::{CacheSnapshot, Journal, StoreConfig};
use serde::Serialize;
use std::path::Path;

/// Data directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory path.
    pub path: String,
    /// Total number of documents.
    pub document_count: usize,
    /// Journal file size in bytes.
    pub journal_size: u64,
    /// Number of journal records.
    pub journal_record_count: usize,
    /// Per entity set statistics.
    pub entity_sets: Vec<EntitySetStats>,
}

/// Statistics for a single entity set.
#[derive(Debug, Serialize)]
pub struct EntitySetStats {
    /// Entity set name.
    pub name: String,
    /// Storage layout (`split` or `flat`).
    pub layout: &'static str,
    /// Number of documents.
    pub document_count: usize,
}

/// Runs the inspect command.
pub async fn run(path: &Path, model_path: Option<&Path>, format: &str) -> CommandResult<()> {
    let result = inspect(path, model_path).await?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

/// Collects statistics without modifying the directory.
pub async fn inspect(path: &Path, model_path: Option<&Path>) -> CommandResult<InspectResult> {
    let model = load_model(path, model_path).await?;
    let persistence = persistence(path, model.clone());
    let snapshot = CacheSnapshot::from_documents(&model, persistence.read().await?);

    let journal = Journal::new(&StoreConfig::new(path));
    let journal_size = journal.size().await?;
    let journal_record_count = journal.read_entries().await.map_or(0, |r| r.len());

    let entity_sets = model
        .entity_sets
        .iter()
        .map(|set| EntitySetStats {
            name: set.name.clone(),
            layout: if set.split_into_directories {
                "split"
            } else {
                "flat"
            },
            document_count: snapshot.len(&set.name),
        })
        .collect();

    Ok(InspectResult {
        path: path.display().to_string(),
        document_count: snapshot.total(),
        journal_size,
        journal_record_count,
        entity_sets,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Data directory: {}", result.path);
    println!("Documents:      {}", result.document_count);
    println!(
        "Journal:        {} bytes, {} records",
        result.journal_size, result.journal_record_count
    );
    println!();
    println!("{:<24} {:<6} {:>10}", "Entity set", "Layout", "Documents");
    for set in &result.entity_sets {
        println!("{:<24} {:<6} {:>10}", set.name, set.layout, set.document_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docfs_core::JOURNAL_FILE;
    use tempfile::tempdir;

    #[tokio::test]
    async fn counts_flat_documents_and_journal() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        tokio::fs::write(
            root.join("settings"),
            "{\"_id\":\"a\",\"key\":\"x\"}\n{\"_id\":\"b\",\"key\":\"y\"}\n",
        )
        .await
        .unwrap();
        tokio::fs::write(
            root.join(JOURNAL_FILE),
            "{\"operation\":\"reload\",\"timestamp\":1}\n",
        )
        .await
        .unwrap();

        let result = inspect(root, None).await.unwrap();
        assert_eq!(result.document_count, 2);
        assert_eq!(result.journal_record_count, 1);
        let settings = result
            .entity_sets
            .iter()
            .find(|s| s.name == "settings")
            .unwrap();
        assert_eq!(settings.layout, "flat");
        assert_eq!(settings.document_count, 2);
    }
}
