//! CLI command implementations.

pub mod compact;
pub mod dump_journal;
pub mod find;
pub mod inspect;
pub mod repair;

use docfs_core::persistence::tree::CONFIG_FILE;
use docfs_core::{
    DocumentModel, EntitySetDescriptor, Persistence, RetryPolicy, StoreConfig, ENTITY_SET_KEY,
    JOURNAL_FILE,
};
use docfs_storage::{fs, StagingMarker};
use std::collections::{BTreeSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Boxed error returned by every command.
pub type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Loads the model from `model_path`, or infers one from the directory.
pub async fn load_model(path: &Path, model_path: Option<&Path>) -> CommandResult<DocumentModel> {
    match model_path {
        Some(model_path) => {
            let json = tokio::fs::read_to_string(model_path).await?;
            Ok(DocumentModel::from_json_str(&json)?)
        }
        None => infer_model(path).await,
    }
}

/// Infers entity sets from what is on disk.
///
/// Root-level files are flat entity sets; split entity sets are collected
/// from the `$entitySet` of every `config.json`. Document properties cannot
/// be inferred, so their files are skipped.
pub async fn infer_model(path: &Path) -> CommandResult<DocumentModel> {
    if !fs::exists(path).await? {
        return Err(format!("No data directory found at {}", path.display()).into());
    }

    let mut flat = BTreeSet::new();
    let mut split = BTreeSet::new();
    let mut queue = VecDeque::from([path.to_path_buf()]);
    while let Some(dir) = queue.pop_front() {
        for entry in fs::list_dir(&dir).await? {
            if StagingMarker::is_marker(&entry.name) {
                continue;
            }
            if entry.is_dir {
                queue.push_back(entry.path);
            } else if dir == path {
                if entry.name != JOURNAL_FILE {
                    flat.insert(entry.name);
                }
            } else if entry.name == CONFIG_FILE {
                if let Some(set) = config_entity_set(&entry.path).await {
                    split.insert(set);
                }
            }
        }
    }
    debug!(?flat, ?split, "inferred model");

    let sets = split
        .into_iter()
        .map(EntitySetDescriptor::split)
        .chain(flat.into_iter().map(EntitySetDescriptor::flat))
        .collect();
    let model = DocumentModel::new(sets);
    model.validate()?;
    Ok(model)
}

async fn config_entity_set(path: &Path) -> Option<String> {
    let contents = tokio::fs::read_to_string(path).await.ok()?;
    let json: serde_json::Value = serde_json::from_str(&contents).ok()?;
    json.get(ENTITY_SET_KEY)?.as_str().map(str::to_string)
}

/// Opens the persistence layer of a data directory with default settings.
pub fn persistence(path: &Path, model: DocumentModel) -> Persistence {
    let defaults = StoreConfig::default();
    Persistence::new(
        path,
        Arc::new(model),
        RetryPolicy::default(),
        defaults.corrupt_alert_threshold,
    )
}
