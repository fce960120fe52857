//! Append-only record logs of flat entity sets.
//!
//! Each flat entity set is one file at the root, named after the set, with
//! one JSON record per line. Inserts and updates append the full document;
//! removals append a tombstone:
//!
//! ```text
//! {"_id":"a","$entitySet":"settings","key":"theme","value":"dark"}
//! {"_id":"a","$entitySet":"settings","key":"theme","value":"light"}
//! {"$$deleted":true,"_id":"a"}
//! ```
//!
//! ## Invariants
//!
//! - The latest record per `_id` wins
//! - A tombstone removes every earlier record of its `_id`
//! - Compaction never changes the logical content of a file

use crate::document::{Document, ETAG_KEY, ID_KEY};
use crate::error::{StoreError, StoreResult};
use crate::types::Timestamp;
use crate::value::Value;
use docfs_storage::{fs, RetryPolicy};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Key marking a tombstone record.
pub const DELETED_KEY: &str = "$$deleted";

/// Contents of a flat file after folding.
#[derive(Debug, Default)]
pub struct FlatFile {
    /// Live documents, in order of first appearance.
    pub documents: Vec<Document>,
    /// Number of parsable records.
    pub records: usize,
    /// Number of unparsable lines.
    pub corrupted: usize,
    /// Number of tombstone records.
    pub tombstones: usize,
}

impl FlatFile {
    /// Returns true if rewriting the file would shrink it.
    #[must_use]
    pub fn needs_compaction(&self) -> bool {
        self.records != self.documents.len() || self.corrupted > 0
    }
}

/// Result of compacting one flat file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionResult {
    /// Entity set name.
    pub entity_set: String,
    /// Records read.
    pub input_records: usize,
    /// Records written (zero if the file was left untouched).
    pub output_records: usize,
    /// Whether the file was rewritten.
    pub rewritten: bool,
}

/// Path of the flat file of `entity_set`.
#[must_use]
pub fn file_path(root: &Path, entity_set: &str) -> PathBuf {
    root.join(entity_set)
}

/// Serializes a document as one record line.
pub fn record_line(doc: &Document) -> StoreResult<String> {
    let mut map = doc.to_map();
    map.remove(ETAG_KEY);
    Ok(serde_json::to_string(&Value::Map(map))?)
}

/// Serializes a tombstone line.
pub fn tombstone_line(id: &str) -> StoreResult<String> {
    let mut object = serde_json::Map::new();
    object.insert(DELETED_KEY.to_string(), serde_json::Value::Bool(true));
    object.insert(ID_KEY.to_string(), serde_json::Value::String(id.to_string()));
    Ok(serde_json::to_string(&object)?)
}

enum Record {
    Live(Document),
    Tombstone(String),
}

fn parse_line(line: &str) -> StoreResult<Record> {
    let json: serde_json::Value = serde_json::from_str(line)?;
    if json.get(DELETED_KEY).and_then(serde_json::Value::as_bool) == Some(true) {
        return match json.get(ID_KEY).and_then(serde_json::Value::as_str) {
            Some(id) => Ok(Record::Tombstone(id.to_string())),
            None => Err(StoreError::validation("tombstone without _id")),
        };
    }
    let doc = Document::from_json(json)?;
    if doc.id.is_empty() {
        return Err(StoreError::validation("record without _id"));
    }
    Ok(Record::Live(doc))
}

/// Folds the lines of a flat file.
///
/// # Errors
///
/// Returns [`StoreError::CorruptedFile`] when the fraction of unparsable
/// lines exceeds `threshold`.
pub fn fold(path: &Path, contents: &str, entity_set: &str, threshold: f64) -> StoreResult<FlatFile> {
    let mut slots: Vec<Option<Document>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut file = FlatFile::default();

    for (number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(Record::Live(mut doc)) => {
                file.records += 1;
                if doc.entity_set.is_none() {
                    doc.entity_set = Some(entity_set.to_string());
                }
                match index.get(&doc.id) {
                    Some(&slot) => slots[slot] = Some(doc),
                    None => {
                        index.insert(doc.id.clone(), slots.len());
                        slots.push(Some(doc));
                    }
                }
            }
            Ok(Record::Tombstone(id)) => {
                file.records += 1;
                file.tombstones += 1;
                if let Some(slot) = index.remove(&id) {
                    slots[slot] = None;
                }
            }
            Err(e) => {
                file.corrupted += 1;
                warn!(path = %path.display(), line = number + 1, error = %e, "skipping corrupted record");
            }
        }
    }

    let total = file.records + file.corrupted;
    #[allow(clippy::cast_precision_loss)]
    let ratio = if total == 0 {
        0.0
    } else {
        file.corrupted as f64 / total as f64
    };
    if ratio > threshold {
        return Err(StoreError::CorruptedFile {
            path: path.to_path_buf(),
            corrupted: file.corrupted,
            total,
        });
    }

    file.documents = slots.into_iter().flatten().collect();
    Ok(file)
}

/// Reads and folds the flat file of `entity_set`. A missing file is empty.
pub async fn read(root: &Path, entity_set: &str, threshold: f64) -> StoreResult<FlatFile> {
    let path = file_path(root, entity_set);
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FlatFile::default()),
        Err(e) => return Err(e.into()),
    };

    let mut file = fold(&path, &contents, entity_set, threshold)?;
    let etag = fs::modified(&path).await?.map(Timestamp::from_system_time);
    for doc in &mut file.documents {
        doc.etag = etag;
    }
    Ok(file)
}

/// Appends a full replacement record.
pub async fn append(root: &Path, entity_set: &str, doc: &Document) -> StoreResult<()> {
    fs::append_line(&file_path(root, entity_set), &record_line(doc)?).await?;
    Ok(())
}

/// Appends a tombstone.
pub async fn append_tombstone(root: &Path, entity_set: &str, id: &str) -> StoreResult<()> {
    fs::append_line(&file_path(root, entity_set), &tombstone_line(id)?).await?;
    Ok(())
}

/// Rewrites the flat file of `entity_set` with one record per live document,
/// if anything can be folded.
pub async fn compact(
    root: &Path,
    entity_set: &str,
    threshold: f64,
    policy: &RetryPolicy,
) -> StoreResult<CompactionResult> {
    let file = read(root, entity_set, threshold).await?;
    let mut result = CompactionResult {
        entity_set: entity_set.to_string(),
        input_records: file.records,
        ..CompactionResult::default()
    };

    if !file.needs_compaction() {
        debug!(entity_set, records = file.records, "flat file already compact");
        return Ok(result);
    }

    let mut contents = String::new();
    for doc in &file.documents {
        contents.push_str(&record_line(doc)?);
        contents.push('\n');
    }
    fs::replace_file(&file_path(root, entity_set), contents.as_bytes(), policy).await?;

    result.output_records = file.documents.len();
    result.rewritten = true;
    info!(
        entity_set,
        input = result.input_records,
        output = result.output_records,
        corrupted = file.corrupted,
        "compacted flat file"
    );
    Ok(result)
}
