//! Update documents (`$set` / `$unset`).

use crate::document::{Document, ID_KEY};
use crate::error::{StoreError, StoreResult};
use crate::value::Value;

/// A single field modification.
#[derive(Debug, Clone, PartialEq)]
pub enum Modifier {
    /// Sets a dotted path.
    Set(String, Value),
    /// Removes a dotted path.
    Unset(String),
}

/// A parsed update document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    modifiers: Vec<Modifier>,
}

impl Update {
    /// Parses `{ "$set": {...}, "$unset": {...} }`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuery`] for other operators, plain
    /// replacement objects and attempts to change `_id`.
    pub fn parse(update: &serde_json::Value) -> StoreResult<Self> {
        let serde_json::Value::Object(object) = update else {
            return Err(StoreError::invalid_query("update must be an object"));
        };

        let mut modifiers = Vec::new();
        for (op, operand) in object {
            let serde_json::Value::Object(fields) = operand else {
                return Err(StoreError::invalid_query(format!(
                    "{op} expects an object"
                )));
            };
            match op.as_str() {
                "$set" => {
                    for (path, value) in fields {
                        modifiers.push(Modifier::Set(path.clone(), Value::from_json(value.clone())));
                    }
                }
                "$unset" => {
                    for path in fields.keys() {
                        if path == ID_KEY {
                            return Err(StoreError::invalid_query("_id cannot be unset"));
                        }
                        modifiers.push(Modifier::Unset(path.clone()));
                    }
                }
                other if other.starts_with('$') => {
                    return Err(StoreError::invalid_query(format!(
                        "unsupported update operator {other}"
                    )))
                }
                _ => {
                    return Err(StoreError::invalid_query(
                        "update must use $set or $unset",
                    ))
                }
            }
        }

        Ok(Self { modifiers })
    }

    /// Creates an update setting one path.
    pub fn set(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            modifiers: vec![Modifier::Set(path.into(), value.into())],
        }
    }

    /// Adds a modifier.
    #[must_use]
    pub fn and(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// The modifiers, in application order.
    #[must_use]
    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    /// Applies the update to `doc`.
    ///
    /// # Errors
    ///
    /// Fails if `_id` would change or a reserved key gets a mistyped value.
    pub fn apply(&self, doc: &mut Document) -> StoreResult<()> {
        for modifier in &self.modifiers {
            match modifier {
                Modifier::Set(path, value) if path == ID_KEY => {
                    if value.as_str() != Some(doc.id.as_str()) && !doc.id.is_empty() {
                        return Err(StoreError::validation("_id cannot be modified"));
                    }
                    doc.set(path, value.clone())?;
                }
                Modifier::Set(path, value) => doc.set(path, value.clone())?,
                Modifier::Unset(path) => doc.unset(path)?,
            }
        }
        Ok(())
    }

    /// Returns true if the update touches `path` or anything below it.
    #[must_use]
    pub fn touches(&self, path: &str) -> bool {
        self.modifiers.iter().any(|m| {
            let target = match m {
                Modifier::Set(p, _) | Modifier::Unset(p) => p,
            };
            target == path || target.starts_with(&format!("{path}."))
        })
    }
}
