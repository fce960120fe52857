//! Document model supplied by the caller at load time.
//!
//! The model tells the store which entity sets exist, which of them are
//! split into directories and which fields are stored as sidecar files.
//!
//! ```json
//! {
//!   "entitySets": [
//!     {
//!       "name": "templates",
//!       "splitIntoDirectories": true,
//!       "documentProperties": [
//!         { "path": "content", "kind": "text",
//!           "extension": { "fromField": { "field": "engine", "fallback": "html" } } },
//!         { "path": "chrome.headerTemplate", "kind": "text", "extension": { "fixed": "html" } }
//!       ]
//!     },
//!     { "name": "settings" }
//!   ]
//! }
//! ```

use crate::document::Document;
use crate::error::{StoreError, StoreResult};
use crate::journal::JOURNAL_FILE;
use crate::value::Value;
use docfs_storage::validate_entry_name;
use serde::{Deserialize, Serialize};

/// Default name of the folder entity set.
pub const DEFAULT_FOLDER_ENTITY_SET: &str = "folders";

/// Storage kind of a document property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyKind {
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Binary,
}

/// How the sidecar file extension of a document property is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Extension {
    /// Always the same extension.
    Fixed(String),
    /// Taken from a text field of the document, e.g. the template engine.
    #[serde(rename_all = "camelCase")]
    FromField {
        /// Dotted path of the field holding the extension.
        field: String,
        /// Extension used when the field is missing or not text.
        fallback: String,
    },
}

impl Extension {
    /// Resolves the extension for `doc`.
    #[must_use]
    pub fn resolve(&self, doc: &Document) -> String {
        match self {
            Self::Fixed(ext) => ext.clone(),
            Self::FromField { field, fallback } => doc
                .get(field)
                .and_then(|v| match v.as_ref() {
                    Value::Text(s) if !s.is_empty() => Some(s.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| fallback.clone()),
        }
    }
}

impl Default for Extension {
    fn default() -> Self {
        Self::Fixed("txt".to_string())
    }
}

/// A field stored as a sidecar file next to `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentProperty {
    /// Dotted field path.
    pub path: String,
    /// Text or binary content.
    pub kind: PropertyKind,
    /// Sidecar file extension.
    #[serde(default)]
    pub extension: Extension,
}

impl DocumentProperty {
    /// Creates a text property with a fixed extension.
    pub fn text(path: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: PropertyKind::Text,
            extension: Extension::Fixed(extension.into()),
        }
    }

    /// Creates a binary property with a fixed extension.
    pub fn binary(path: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: PropertyKind::Binary,
            extension: Extension::Fixed(extension.into()),
        }
    }

    /// Sets the extension resolver.
    #[must_use]
    pub fn with_extension(mut self, extension: Extension) -> Self {
        self.extension = extension;
        self
    }

    /// Last segment of the path, used as the sidecar file stem.
    #[must_use]
    pub fn leaf(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    /// Sidecar file name for `doc`.
    #[must_use]
    pub fn file_name(&self, doc: &Document) -> String {
        format!("{}.{}", self.leaf(), self.extension.resolve(doc))
    }
}

/// Description of one entity set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySetDescriptor {
    /// Entity set name.
    pub name: String,
    /// Whether documents are stored as directories in the folder tree.
    #[serde(default)]
    pub split_into_directories: bool,
    /// Fields stored as sidecar files.
    #[serde(default)]
    pub document_properties: Vec<DocumentProperty>,
}

impl EntitySetDescriptor {
    /// A split entity set.
    pub fn split(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            split_into_directories: true,
            document_properties: Vec::new(),
        }
    }

    /// A flat entity set.
    pub fn flat(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            split_into_directories: false,
            document_properties: Vec::new(),
        }
    }

    /// Adds a document property.
    #[must_use]
    pub fn with_property(mut self, property: DocumentProperty) -> Self {
        self.document_properties.push(property);
        self
    }

    /// Finds the document property whose sidecar file stem is `stem`.
    #[must_use]
    pub fn property_for_stem(&self, stem: &str) -> Option<&DocumentProperty> {
        self.document_properties.iter().find(|p| p.leaf() == stem)
    }
}

/// The set of entity sets a store serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentModel {
    /// Registered entity sets.
    pub entity_sets: Vec<EntitySetDescriptor>,
    /// Name of the entity set holding folders.
    #[serde(default = "default_folder_entity_set")]
    pub folder_entity_set: String,
}

fn default_folder_entity_set() -> String {
    DEFAULT_FOLDER_ENTITY_SET.to_string()
}

impl Default for DocumentModel {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl DocumentModel {
    /// Creates a model; the folder entity set is added if missing.
    #[must_use]
    pub fn new(entity_sets: Vec<EntitySetDescriptor>) -> Self {
        let mut model = Self {
            entity_sets,
            folder_entity_set: default_folder_entity_set(),
        };
        model.ensure_folder_set();
        model
    }

    /// Parses a model from JSON text.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON or an invalid model.
    pub fn from_json_str(json: &str) -> StoreResult<Self> {
        let mut model: Self = serde_json::from_str(json)?;
        model.ensure_folder_set();
        model.validate()?;
        Ok(model)
    }

    fn ensure_folder_set(&mut self) {
        if self.entity_set(&self.folder_entity_set).is_none() {
            self.entity_sets
                .push(EntitySetDescriptor::split(self.folder_entity_set.clone()));
        }
    }

    /// Checks names and layout constraints.
    ///
    /// # Errors
    ///
    /// Returns a validation error for duplicate or unstorable entity set
    /// names, a flat folder set, or a document property on a flat set.
    pub fn validate(&self) -> StoreResult<()> {
        let mut seen = std::collections::HashSet::new();
        for set in &self.entity_sets {
            if !seen.insert(set.name.as_str()) {
                return Err(StoreError::validation(format!(
                    "entity set {} is registered twice",
                    set.name
                )));
            }
            validate_entry_name(&set.name).map_err(|_| StoreError::InvalidName {
                name: set.name.clone(),
            })?;
            if set.name == JOURNAL_FILE || set.name == "config.json" {
                return Err(StoreError::validation(format!(
                    "entity set name {} is reserved",
                    set.name
                )));
            }
            if !set.split_into_directories && !set.document_properties.is_empty() {
                return Err(StoreError::validation(format!(
                    "flat entity set {} cannot have document properties",
                    set.name
                )));
            }
        }

        match self.entity_set(&self.folder_entity_set) {
            Some(folders) if folders.split_into_directories => Ok(()),
            Some(_) => Err(StoreError::validation(format!(
                "folder entity set {} must be split into directories",
                self.folder_entity_set
            ))),
            None => Err(StoreError::unknown_entity_set(&self.folder_entity_set)),
        }
    }

    /// Looks up an entity set by name.
    #[must_use]
    pub fn entity_set(&self, name: &str) -> Option<&EntitySetDescriptor> {
        self.entity_sets.iter().find(|s| s.name == name)
    }

    /// Looks up an entity set, failing for unknown names.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownEntitySet`].
    pub fn require(&self, name: &str) -> StoreResult<&EntitySetDescriptor> {
        self.entity_set(name)
            .ok_or_else(|| StoreError::unknown_entity_set(name))
    }

    /// Returns true if `name` is the folder entity set.
    #[must_use]
    pub fn is_folder_set(&self, name: &str) -> bool {
        self.folder_entity_set == name
    }

    /// Entity sets stored in the folder tree.
    pub fn split_sets(&self) -> impl Iterator<Item = &EntitySetDescriptor> {
        self.entity_sets.iter().filter(|s| s.split_into_directories)
    }

    /// Entity sets stored as flat files.
    pub fn flat_sets(&self) -> impl Iterator<Item = &EntitySetDescriptor> {
        self.entity_sets.iter().filter(|s| !s.split_into_directories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn folder_set_is_added() {
        let model = DocumentModel::new(vec![EntitySetDescriptor::flat("settings")]);
        let folders = model.entity_set("folders").unwrap();
        assert!(folders.split_into_directories);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn parse_from_json() {
        let model = DocumentModel::from_json_str(
            &json!({
                "entitySets": [
                    {
                        "name": "templates",
                        "splitIntoDirectories": true,
                        "documentProperties": [
                            { "path": "content", "kind": "text",
                              "extension": { "fromField": { "field": "engine", "fallback": "html" } } },
                            { "path": "chrome.headerTemplate", "kind": "text",
                              "extension": { "fixed": "html" } }
                        ]
                    },
                    { "name": "settings" }
                ]
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(model.split_sets().count(), 2);
        assert_eq!(model.flat_sets().count(), 1);
        let templates = model.require("templates").unwrap();
        assert_eq!(
            templates.property_for_stem("headerTemplate").unwrap().path,
            "chrome.headerTemplate"
        );
        assert!(model.require("nope").is_err());
    }

    #[test]
    fn extension_resolution() {
        let prop = DocumentProperty::text("content", "html").with_extension(Extension::FromField {
            field: "engine".into(),
            fallback: "html".into(),
        });
        let mut doc = Document::with_id("1");
        assert_eq!(prop.file_name(&doc), "content.html");
        doc.fields.insert("engine".into(), Value::from("handlebars"));
        assert_eq!(prop.file_name(&doc), "content.handlebars");

        let nested = DocumentProperty::binary("chrome.logo", "png");
        assert_eq!(nested.leaf(), "logo");
        assert_eq!(nested.file_name(&doc), "logo.png");
    }

    #[test]
    fn invalid_models_are_rejected() {
        let twice = DocumentModel::new(vec![
            EntitySetDescriptor::flat("a"),
            EntitySetDescriptor::flat("a"),
        ]);
        assert!(twice.validate().is_err());

        let reserved = DocumentModel::new(vec![EntitySetDescriptor::flat("fs.journal")]);
        assert!(reserved.validate().is_err());

        let marker = DocumentModel::new(vec![EntitySetDescriptor::flat("~x")]);
        assert!(matches!(
            marker.validate(),
            Err(StoreError::InvalidName { .. })
        ));

        let flat_props = DocumentModel::new(vec![EntitySetDescriptor::flat("s")
            .with_property(DocumentProperty::text("content", "txt"))]);
        assert!(flat_props.validate().is_err());
    }
}
