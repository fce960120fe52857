//! Field projections.

use crate::document::{Document, ID_KEY};
use crate::error::{StoreError, StoreResult};

/// Which fields of matching documents are returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    /// Every field.
    #[default]
    All,
    /// Only the listed paths, plus `_id` unless excluded.
    Include {
        /// Included dotted paths.
        paths: Vec<String>,
        /// Whether `_id` is kept.
        keep_id: bool,
    },
    /// Every field except the listed paths.
    Exclude(Vec<String>),
}

impl Projection {
    /// Parses `{ "name": 1, "content": 0, ... }`. `null` and `{}` select
    /// every field.
    ///
    /// # Errors
    ///
    /// Inclusion and exclusion cannot be mixed, except for excluding `_id`.
    pub fn parse(fields: &serde_json::Value) -> StoreResult<Self> {
        let object = match fields {
            serde_json::Value::Null => return Ok(Self::All),
            serde_json::Value::Object(object) => object,
            other => {
                return Err(StoreError::invalid_query(format!(
                    "projection must be an object, got {other}"
                )))
            }
        };

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        let mut keep_id = true;
        for (path, flag) in object {
            let on = match flag {
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                _ => {
                    return Err(StoreError::invalid_query(format!(
                        "projection of {path} must be 0/1 or a boolean"
                    )))
                }
            };
            match (path.as_str(), on) {
                (ID_KEY, false) => keep_id = false,
                (_, true) => include.push(path.clone()),
                (_, false) => exclude.push(path.clone()),
            }
        }

        match (include.is_empty(), exclude.is_empty()) {
            (true, true) if keep_id => Ok(Self::All),
            (true, _) => {
                if !keep_id {
                    exclude.push(ID_KEY.to_string());
                }
                Ok(Self::Exclude(exclude))
            }
            (false, true) => Ok(Self::Include {
                paths: include,
                keep_id,
            }),
            (false, false) => Err(StoreError::invalid_query(
                "projection cannot mix inclusion and exclusion",
            )),
        }
    }

    /// Applies the projection to a document.
    #[must_use]
    pub fn apply(&self, doc: Document) -> Document {
        match self {
            Self::All => doc,
            Self::Include { paths, keep_id } => {
                let mut out = Document::default();
                if *keep_id {
                    out.id.clone_from(&doc.id);
                }
                for path in paths {
                    if let Some(value) = doc.get(path) {
                        // Cannot fail: the value comes from the same slot.
                        let _ = out.set(path, value.into_owned());
                    }
                }
                out
            }
            Self::Exclude(paths) => {
                let mut out = doc;
                for path in paths {
                    if path == ID_KEY {
                        out.id.clear();
                    } else {
                        let _ = out.unset(path);
                    }
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template() -> Document {
        Document::from_json(json!({
            "_id": "t1",
            "shortid": "abc",
            "name": "invoice",
            "content": "<h1/>",
            "chrome": { "landscape": true, "format": "A4" }
        }))
        .unwrap()
    }

    #[test]
    fn empty_projection_keeps_everything() {
        assert_eq!(Projection::parse(&json!({})).unwrap(), Projection::All);
        assert_eq!(Projection::parse(&json!(null)).unwrap(), Projection::All);
        assert_eq!(Projection::All.apply(template()), template());
    }

    #[test]
    fn include_keeps_id_by_default() {
        let projection = Projection::parse(&json!({ "name": 1, "chrome.format": true })).unwrap();
        let doc = projection.apply(template());
        assert_eq!(
            doc.to_json(),
            json!({ "_id": "t1", "name": "invoice", "chrome": { "format": "A4" } })
        );
    }

    #[test]
    fn include_without_id() {
        let projection = Projection::parse(&json!({ "name": 1, "_id": 0 })).unwrap();
        let doc = projection.apply(template());
        assert_eq!(doc.to_json(), json!({ "name": "invoice" }));
    }

    #[test]
    fn exclude_drops_paths() {
        let projection = Projection::parse(&json!({ "content": 0, "chrome.landscape": 0 })).unwrap();
        let doc = projection.apply(template());
        assert!(doc.get("content").is_none());
        assert!(doc.get("chrome.landscape").is_none());
        assert_eq!(doc.get("chrome.format").unwrap().as_str(), Some("A4"));
        assert_eq!(doc.shortid.as_deref(), Some("abc"));
    }

    #[test]
    fn only_excluding_id() {
        let projection = Projection::parse(&json!({ "_id": false })).unwrap();
        let doc = projection.apply(template());
        assert!(doc.id.is_empty());
        assert_eq!(doc.name(), Some("invoice"));
    }

    #[test]
    fn mixing_is_rejected() {
        assert!(Projection::parse(&json!({ "a": 1, "b": 0 })).is_err());
        assert!(Projection::parse(&json!({ "a": "yes" })).is_err());
        assert!(Projection::parse(&json!(["a"])).is_err());
    }
}
