//! Documents stored in entity sets.
//!
//! A [`Document`] has a small closed set of reserved keys and an open field
//! map for everything else:
//!
//! | Key | Field | Persisted |
//! |---|---|---|
//! | `_id` | [`Document::id`] | yes |
//! | `$entitySet` | [`Document::entity_set`] | yes |
//! | `shortid` | [`Document::shortid`] | yes |
//! | `folder` | [`Document::folder`] | flat sets only; recomputed from the tree for split sets |
//! | `$$etag` | [`Document::etag`] | never |

use crate::error::{StoreError, StoreResult};
use crate::types::Timestamp;
use crate::value::{self, Map, Value};
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::borrow::Cow;

/// Key of the document id.
pub const ID_KEY: &str = "_id";
/// Key of the entity set name.
pub const ENTITY_SET_KEY: &str = "$entitySet";
/// Key of the short id.
pub const SHORTID_KEY: &str = "shortid";
/// Key of the parent folder reference.
pub const FOLDER_KEY: &str = "folder";
/// Key of the in-memory write timestamp.
pub const ETAG_KEY: &str = "$$etag";
/// Key of the display name, which doubles as the directory name.
pub const NAME_KEY: &str = "name";

/// Reference to a parent folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderRef {
    /// Short id of the folder document.
    pub shortid: String,
}

impl FolderRef {
    /// Creates a reference to the folder with the given short id.
    pub fn new(shortid: impl Into<String>) -> Self {
        Self {
            shortid: shortid.into(),
        }
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(SHORTID_KEY.to_string(), Value::Text(self.shortid.clone()));
        Value::Map(map)
    }

    fn from_value(value: Value) -> StoreResult<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::Map(mut map) => match map.remove(SHORTID_KEY) {
                Some(Value::Text(shortid)) => Ok(Some(Self { shortid })),
                Some(Value::Null) | None => Ok(None),
                Some(other) => Err(StoreError::validation(format!(
                    "folder.shortid must be text, got {}",
                    other.type_name()
                ))),
            },
            other => Err(StoreError::validation(format!(
                "folder must be an object, got {}",
                other.type_name()
            ))),
        }
    }
}

/// A document of an entity set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Globally unique id.
    pub id: String,
    /// Name of the entity set the document belongs to.
    pub entity_set: Option<String>,
    /// Short human-referenceable id.
    pub shortid: Option<String>,
    /// Parent folder, absent for root-level documents.
    pub folder: Option<FolderRef>,
    /// Write timestamp, kept in memory only.
    pub etag: Option<Timestamp>,
    /// All other fields.
    pub fields: Map,
}

impl Document {
    /// Creates an empty document with the given id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Builds a document from a field map, extracting reserved keys.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a reserved key has the wrong type.
    pub fn from_map(mut map: Map) -> StoreResult<Self> {
        let id = match map.remove(ID_KEY) {
            None | Some(Value::Null) => String::new(),
            Some(Value::Text(id)) => id,
            Some(Value::Integer(n)) => n.to_string(),
            Some(other) => {
                return Err(StoreError::validation(format!(
                    "_id must be text, got {}",
                    other.type_name()
                )))
            }
        };
        let entity_set = take_text(&mut map, ENTITY_SET_KEY)?;
        let shortid = take_text(&mut map, SHORTID_KEY)?;
        let folder = match map.remove(FOLDER_KEY) {
            Some(value) => FolderRef::from_value(value)?,
            None => None,
        };
        let etag = match map.remove(ETAG_KEY) {
            Some(Value::Integer(n)) => u64::try_from(n).ok().map(Timestamp),
            _ => None,
        };

        Ok(Self {
            id,
            entity_set,
            shortid,
            folder,
            etag,
            fields: map,
        })
    }

    /// Parses a document from JSON.
    ///
    /// # Errors
    ///
    /// Fails if the JSON is not an object or a reserved key is malformed.
    pub fn from_json(json: serde_json::Value) -> StoreResult<Self> {
        match Value::from_json(json) {
            Value::Map(map) => Self::from_map(map),
            other => Err(StoreError::validation(format!(
                "document must be an object, got {}",
                other.type_name()
            ))),
        }
    }

    /// Returns all fields including the reserved ones.
    #[must_use]
    pub fn to_map(&self) -> Map {
        let mut map = self.fields.clone();
        if !self.id.is_empty() {
            map.insert(ID_KEY.to_string(), Value::Text(self.id.clone()));
        }
        if let Some(set) = &self.entity_set {
            map.insert(ENTITY_SET_KEY.to_string(), Value::Text(set.clone()));
        }
        if let Some(shortid) = &self.shortid {
            map.insert(SHORTID_KEY.to_string(), Value::Text(shortid.clone()));
        }
        if let Some(folder) = &self.folder {
            map.insert(FOLDER_KEY.to_string(), folder.to_value());
        }
        if let Some(etag) = self.etag {
            let etag = i64::try_from(etag.as_millis()).unwrap_or(i64::MAX);
            map.insert(ETAG_KEY.to_string(), Value::Integer(etag));
        }
        map
    }

    /// Converts to JSON including the reserved keys.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        Value::Map(self.to_map()).to_json()
    }

    /// Returns the `name` field.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.fields.get(NAME_KEY).and_then(Value::as_str)
    }

    /// Looks up a dotted path, including reserved keys.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Cow<'_, Value>> {
        match path {
            ID_KEY if !self.id.is_empty() => Some(Cow::Owned(Value::Text(self.id.clone()))),
            ID_KEY => None,
            ENTITY_SET_KEY => self
                .entity_set
                .as_ref()
                .map(|s| Cow::Owned(Value::Text(s.clone()))),
            SHORTID_KEY => self
                .shortid
                .as_ref()
                .map(|s| Cow::Owned(Value::Text(s.clone()))),
            FOLDER_KEY => self.folder.as_ref().map(|f| Cow::Owned(f.to_value())),
            "folder.shortid" => self
                .folder
                .as_ref()
                .map(|f| Cow::Owned(Value::Text(f.shortid.clone()))),
            ETAG_KEY => self.etag.map(|e| {
                Cow::Owned(Value::Integer(i64::try_from(e.as_millis()).unwrap_or(i64::MAX)))
            }),
            _ => value::get_path(&self.fields, path).map(Cow::Borrowed),
        }
    }

    /// Sets a dotted path, routing reserved keys to their typed fields.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a reserved key gets a value of the wrong
    /// type.
    pub fn set(&mut self, path: &str, value: Value) -> StoreResult<()> {
        match path {
            ID_KEY => match value {
                Value::Text(id) => self.id = id,
                other => {
                    return Err(StoreError::validation(format!(
                        "_id must be text, got {}",
                        other.type_name()
                    )))
                }
            },
            ENTITY_SET_KEY => self.entity_set = text_or_none(ENTITY_SET_KEY, value)?,
            SHORTID_KEY => self.shortid = text_or_none(SHORTID_KEY, value)?,
            FOLDER_KEY => self.folder = FolderRef::from_value(value)?,
            "folder.shortid" => {
                self.folder = text_or_none("folder.shortid", value)?.map(FolderRef::new);
            }
            ETAG_KEY => {}
            _ => value::set_path(&mut self.fields, path, value),
        }
        Ok(())
    }

    /// Removes a dotted path.
    ///
    /// # Errors
    ///
    /// `_id` cannot be removed.
    pub fn unset(&mut self, path: &str) -> StoreResult<()> {
        match path {
            ID_KEY => return Err(StoreError::validation("_id cannot be unset")),
            ENTITY_SET_KEY => self.entity_set = None,
            SHORTID_KEY => self.shortid = None,
            FOLDER_KEY | "folder.shortid" => self.folder = None,
            ETAG_KEY => self.etag = None,
            _ => {
                value::remove_path(&mut self.fields, path);
            }
        }
        Ok(())
    }

    /// Returns a clone without internal bookkeeping (`$$etag`, `$entitySet`),
    /// as handed out to callers.
    #[must_use]
    pub fn to_public(&self) -> Self {
        Self {
            entity_set: None,
            etag: None,
            ..self.clone()
        }
    }

    /// Compares two documents ignoring `$$etag`.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.entity_set == other.entity_set
            && self.shortid == other.shortid
            && self.folder == other.folder
            && self.fields == other.fields
    }
}

fn take_text(map: &mut Map, key: &str) -> StoreResult<Option<String>> {
    match map.remove(key) {
        Some(value) => text_or_none(key, value),
        None => Ok(None),
    }
}

fn text_or_none(key: &str, value: Value) -> StoreResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        other => Err(StoreError::validation(format!(
            "{key} must be text, got {}",
            other.type_name()
        ))),
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Value::Map(self.to_map()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Self::from_json(json).map_err(serde::de::Error::custom)
    }
}
