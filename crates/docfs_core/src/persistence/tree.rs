//! Directory-per-document layout of split entity sets.
//!
//! ```text
//! <root>/
//!   reports/                 folder "reports"
//!     config.json
//!     invoice/               template "invoice" in folder "reports"
//!       config.json
//!       content.handlebars   document property `content`
//!       headerTemplate.html  document property `chrome.headerTemplate`
//! ```

use crate::cache::CacheSnapshot;
use crate::document::{Document, FolderRef, ETAG_KEY, FOLDER_KEY, NAME_KEY};
use crate::error::{StoreError, StoreResult};
use crate::model::{DocumentModel, EntitySetDescriptor, PropertyKind};
use crate::types::Timestamp;
use crate::value::{self, Value};
use docfs_storage::{fs, validate_entry_name, StagingMarker};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Name of the file holding the non-property fields of a split document.
pub const CONFIG_FILE: &str = "config.json";

/// Length of short ids derived for implicit folders.
const DERIVED_SHORTID_LEN: usize = 10;

/// Maximum folder nesting, guarding against reference cycles.
const MAX_DEPTH: usize = 256;

/// Directory name of a split document.
///
/// # Errors
///
/// Returns [`StoreError::InvalidName`] when the name is missing or cannot be
/// stored as a directory name.
pub fn entry_name(doc: &Document) -> StoreResult<&str> {
    let name = doc.name().unwrap_or_default();
    validate_entry_name(name).map_err(|_| StoreError::InvalidName {
        name: name.to_string(),
    })?;
    Ok(name)
}

/// Path of the directory containing `doc`, relative to the root, resolved
/// through the folder chain in `documents`.
///
/// # Errors
///
/// Fails when a referenced folder does not exist or the chain is cyclic.
pub fn parent_directory(
    model: &DocumentModel,
    doc: &Document,
    documents: &CacheSnapshot,
) -> StoreResult<PathBuf> {
    let mut segments = Vec::new();
    let mut next = doc.folder.clone();

    while let Some(folder) = next {
        if segments.len() >= MAX_DEPTH {
            return Err(StoreError::validation(format!(
                "folder chain of {} is cyclic or too deep",
                doc.id
            )));
        }
        let parent = documents
            .get_by_shortid(&model.folder_entity_set, &folder.shortid)
            .ok_or_else(|| {
                StoreError::validation(format!("folder {} does not exist", folder.shortid))
            })?;
        segments.push(entry_name(parent)?.to_string());
        next = parent.folder.clone();
    }

    Ok(segments.iter().rev().collect())
}

/// Path of `doc`'s own directory, relative to the root.
pub fn document_directory(
    model: &DocumentModel,
    doc: &Document,
    documents: &CacheSnapshot,
) -> StoreResult<PathBuf> {
    Ok(parent_directory(model, doc, documents)?.join(entry_name(doc)?))
}

/// Rejects a sibling with the same name (case-insensitive) in any split
/// entity set.
///
/// # Errors
///
/// Returns [`StoreError::DuplicateEntry`].
pub fn check_duplicate(
    model: &DocumentModel,
    doc: &Document,
    documents: &CacheSnapshot,
) -> StoreResult<()> {
    let name = entry_name(doc)?;
    let folder = doc.folder.as_ref().map(|f| f.shortid.as_str());

    for set in model.split_sets() {
        let clash = documents.documents(&set.name).iter().any(|other| {
            other.id != doc.id
                && other.folder.as_ref().map(|f| f.shortid.as_str()) == folder
                && other
                    .name()
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
        });
        if clash {
            let parent = parent_directory(model, doc, documents)?;
            return Err(StoreError::duplicate_entry(
                name,
                format!("/{}", parent.display()),
            ));
        }
    }
    Ok(())
}

/// Every document nested below `folder`, as `(entity set, id)` pairs.
#[must_use]
pub fn descendants(
    model: &DocumentModel,
    folder: &Document,
    documents: &CacheSnapshot,
) -> Vec<(String, String)> {
    let Some(root_shortid) = folder.shortid.as_deref() else {
        return Vec::new();
    };

    let mut inside: HashSet<String> = HashSet::from([root_shortid.to_string()]);
    let mut out = Vec::new();
    let mut queue = VecDeque::from([root_shortid.to_string()]);

    while let Some(shortid) = queue.pop_front() {
        for set in model.split_sets() {
            for doc in documents.documents(&set.name) {
                if doc.folder.as_ref().map(|f| f.shortid.as_str()) != Some(shortid.as_str()) {
                    continue;
                }
                out.push((set.name.clone(), doc.id.clone()));
                if model.is_folder_set(&set.name) {
                    if let Some(child) = &doc.shortid {
                        if inside.insert(child.clone()) {
                            queue.push_back(child.clone());
                        }
                    }
                }
            }
        }
    }
    out
}

/// Serializes the fields stored in `config.json`: everything except the
/// folder reference, document properties and the etag.
pub fn config_contents(doc: &Document, descriptor: &EntitySetDescriptor) -> StoreResult<Vec<u8>> {
    let mut map = doc.to_map();
    map.remove(FOLDER_KEY);
    map.remove(ETAG_KEY);
    for property in &descriptor.document_properties {
        value::remove_path(&mut map, &property.path);
    }
    let mut contents = serde_json::to_vec_pretty(&Value::Map(map))?;
    contents.push(b'\n');
    Ok(contents)
}

/// Writes the sidecar files and `config.json` of `doc` into `dir`.
pub async fn write_document(
    dir: &Path,
    doc: &Document,
    descriptor: &EntitySetDescriptor,
) -> StoreResult<()> {
    for property in &descriptor.document_properties {
        let Some(value) = doc.get(&property.path) else {
            continue;
        };
        let contents: &[u8] = match (property.kind, value.as_ref()) {
            (_, Value::Null) => continue,
            (_, Value::Text(text)) => text.as_bytes(),
            (PropertyKind::Binary, Value::Bytes(bytes)) => bytes,
            (kind, other) => {
                return Err(StoreError::validation(format!(
                    "document property {} ({kind:?}) cannot hold {}",
                    property.path,
                    other.type_name()
                )))
            }
        };
        fs::write_file(&dir.join(property.file_name(doc)), contents).await?;
    }

    fs::write_file(&dir.join(CONFIG_FILE), &config_contents(doc, descriptor)?).await?;
    Ok(())
}

/// A directory waiting to be read.
struct PendingDirectory {
    path: PathBuf,
    relative: PathBuf,
    folder: Option<FolderRef>,
    parent_name: Option<String>,
}

/// Reads every split document below `root`. Never modifies the tree.
///
/// Directories are visited breadth-first in name order; only folders (and
/// the root) are descended into.
pub async fn read_tree(root: &Path, model: &DocumentModel) -> StoreResult<Vec<Document>> {
    let mut documents = Vec::new();
    let mut queue = VecDeque::new();
    enqueue_children(root, Path::new(""), None, None, &mut queue).await?;

    while let Some(dir) = queue.pop_front() {
        let Some(doc) = read_document(&dir, model).await? else {
            continue;
        };

        let set = doc.entity_set.clone().unwrap_or_default();
        if model.is_folder_set(&set) {
            let folder = doc.shortid.clone().map(FolderRef::new);
            let name = dir
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            enqueue_children(&dir.path, &dir.relative, folder, name, &mut queue).await?;
        }
        documents.push(doc);
    }

    debug!(root = %root.display(), count = documents.len(), "read split documents");
    Ok(documents)
}

async fn enqueue_children(
    path: &Path,
    relative: &Path,
    folder: Option<FolderRef>,
    parent_name: Option<String>,
    queue: &mut VecDeque<PendingDirectory>,
) -> StoreResult<()> {
    for entry in fs::list_dir(path).await? {
        if !entry.is_dir || StagingMarker::is_marker(&entry.name) {
            continue;
        }
        queue.push_back(PendingDirectory {
            relative: relative.join(&entry.name),
            path: entry.path,
            folder: folder.clone(),
            parent_name: parent_name.clone(),
        });
    }
    Ok(())
}

/// Reads one document directory; `None` if it belongs to no known entity set.
async fn read_document(
    dir: &PendingDirectory,
    model: &DocumentModel,
) -> StoreResult<Option<Document>> {
    let name = dir
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let config_path = dir.path.join(CONFIG_FILE);

    let mut doc = match tokio::fs::read(&config_path).await {
        Ok(bytes) => {
            let json: serde_json::Value = serde_json::from_slice(&bytes)?;
            let mut doc = Document::from_json(json)?;
            if doc.entity_set.is_none() {
                doc.entity_set = dir
                    .parent_name
                    .as_ref()
                    .filter(|parent| model.entity_set(parent).is_some())
                    .cloned();
            }
            doc.etag = fs::modified(&config_path)
                .await?
                .map(Timestamp::from_system_time);
            doc
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            implicit_folder(&dir.relative, model)
        }
        Err(e) => return Err(e.into()),
    };

    let Some(descriptor) = doc.entity_set.as_deref().and_then(|s| model.entity_set(s)) else {
        warn!(path = %dir.path.display(), entity_set = ?doc.entity_set, "skipping directory of unknown entity set");
        return Ok(None);
    };
    if !descriptor.split_into_directories {
        warn!(path = %dir.path.display(), entity_set = %descriptor.name, "skipping directory of flat entity set");
        return Ok(None);
    }

    if doc.id.is_empty() {
        doc.id = derived_id(&dir.relative);
    }
    if doc.shortid.is_none() && model.is_folder_set(&descriptor.name) {
        doc.shortid = Some(derived_shortid(&doc.id));
    }
    doc.fields.insert(NAME_KEY.to_string(), Value::Text(name));
    doc.folder = dir.folder.clone();

    for entry in fs::list_dir(&dir.path).await? {
        if entry.is_dir || entry.name == CONFIG_FILE {
            continue;
        }
        let stem = entry.name.split_once('.').map_or(entry.name.as_str(), |(s, _)| s);
        let Some(property) = descriptor.property_for_stem(stem) else {
            continue;
        };
        let bytes = tokio::fs::read(&entry.path).await?;
        let value = match property.kind {
            PropertyKind::Binary => Value::Bytes(bytes),
            PropertyKind::Text => match String::from_utf8(bytes) {
                Ok(text) => Value::Text(text),
                Err(e) => {
                    warn!(path = %entry.path.display(), "document property is not valid UTF-8");
                    Value::Text(String::from_utf8_lossy(e.as_bytes()).into_owned())
                }
            },
        };
        doc.set(&property.path, value)?;
    }

    Ok(Some(doc))
}

/// A folder synthesized for a directory without `config.json`.
fn implicit_folder(relative: &Path, model: &DocumentModel) -> Document {
    let id = derived_id(relative);
    Document {
        shortid: Some(derived_shortid(&id)),
        id,
        entity_set: Some(model.folder_entity_set.clone()),
        ..Document::default()
    }
}

/// Id derived from the relative path, identical across processes.
fn derived_id(relative: &Path) -> String {
    let key = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes())
        .simple()
        .to_string()
}

pub(crate) fn derived_shortid(id: &str) -> String {
    id.chars().take(DERIVED_SHORTID_LEN).collect()
}
