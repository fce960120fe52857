//! Predicate trees evaluated against documents.
//!
//! Filters are parsed from MongoDB-style JSON:
//!
//! ```json
//! { "name": "invoice", "recipe": { "$in": ["chrome-pdf", "html"] },
//!   "$or": [{ "folder.shortid": "f1" }, { "folder": { "$exists": false } }] }
//! ```

use crate::document::Document;
use crate::error::{StoreError, StoreResult};
use crate::value::Value;
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

/// A condition on the value found at one field path.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Equal, or an array containing an equal element.
    Eq(Value),
    /// Negation of [`Condition::Eq`].
    Ne(Value),
    /// Greater than.
    Gt(Value),
    /// Greater than or equal.
    Gte(Value),
    /// Less than.
    Lt(Value),
    /// Less than or equal.
    Lte(Value),
    /// Equal to any of the values.
    In(Vec<Value>),
    /// Equal to none of the values.
    Nin(Vec<Value>),
    /// Field presence.
    Exists(bool),
    /// Text matching a regular expression.
    Regex(Pattern),
    /// Negation of a condition.
    Not(Box<Condition>),
    /// Every condition holds.
    All(Vec<Condition>),
}

/// A compiled `$regex`.
#[derive(Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compiles a pattern with MongoDB option letters (`i`, `m`, `s`, `x`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuery`] for an invalid pattern or option.
    pub fn new(pattern: &str, options: &str) -> StoreResult<Self> {
        let mut builder = RegexBuilder::new(pattern);
        for option in options.chars() {
            match option {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                other => {
                    return Err(StoreError::invalid_query(format!(
                        "unsupported $regex option {other:?}"
                    )))
                }
            };
        }
        builder
            .build()
            .map(Self)
            .map_err(|e| StoreError::invalid_query(format!("invalid $regex: {e}")))
    }

    /// Tests a text value.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.0.as_str())
    }
}

/// A predicate over documents.
#[derive(Debug, Clone, Default)]
pub enum Filter {
    /// Matches every document.
    #[default]
    All,
    /// Every filter matches.
    And(Vec<Filter>),
    /// At least one filter matches.
    Or(Vec<Filter>),
    /// No filter matches.
    Nor(Vec<Filter>),
    /// A condition on one field path.
    Field {
        /// Dotted field path.
        path: String,
        /// Condition on the value at `path`.
        condition: Condition,
    },
}

impl Filter {
    /// Parses a query object. `null` matches everything.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuery`] for unknown operators or operands
    /// of the wrong shape.
    pub fn parse(query: &serde_json::Value) -> StoreResult<Self> {
        match query {
            serde_json::Value::Null => Ok(Self::All),
            serde_json::Value::Object(object) => {
                let mut filters = Vec::with_capacity(object.len());
                for (key, operand) in object {
                    filters.push(Self::parse_entry(key, operand)?);
                }
                Ok(match filters.len() {
                    0 => Self::All,
                    1 => filters.remove(0),
                    _ => Self::And(filters),
                })
            }
            other => Err(StoreError::invalid_query(format!(
                "query must be an object, got {other}"
            ))),
        }
    }

    /// Equality filter on one field.
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Field {
            path: path.into(),
            condition: Condition::Eq(value.into()),
        }
    }

    /// Filter matching one document id.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::eq(crate::document::ID_KEY, id.into())
    }

    fn parse_entry(key: &str, operand: &serde_json::Value) -> StoreResult<Self> {
        match key {
            "$and" => Ok(Self::And(parse_filter_list(key, operand)?)),
            "$or" => Ok(Self::Or(parse_filter_list(key, operand)?)),
            "$nor" => Ok(Self::Nor(parse_filter_list(key, operand)?)),
            _ if key.starts_with('$') => Err(StoreError::invalid_query(format!(
                "unknown top-level operator {key}"
            ))),
            _ => Ok(Self::Field {
                path: key.to_string(),
                condition: parse_condition(operand)?,
            }),
        }
    }

    /// Tests a document.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::All => true,
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Self::Nor(filters) => !filters.iter().any(|f| f.matches(doc)),
            Self::Field { path, condition } => condition.matches(&resolve(doc, path)),
        }
    }

    /// Field equalities implied by the filter, used to seed upserted
    /// documents.
    #[must_use]
    pub fn equalities(&self) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        self.collect_equalities(&mut out);
        out
    }

    fn collect_equalities(&self, out: &mut Vec<(String, Value)>) {
        match self {
            Self::And(filters) => filters.iter().for_each(|f| f.collect_equalities(out)),
            Self::Field {
                path,
                condition: Condition::Eq(value),
            } => out.push((path.clone(), value.clone())),
            Self::Field {
                path,
                condition: Condition::All(conditions),
            } => {
                for condition in conditions {
                    if let Condition::Eq(value) = condition {
                        out.push((path.clone(), value.clone()));
                    }
                }
            }
            _ => {}
        }
    }
}

fn parse_filter_list(op: &str, operand: &serde_json::Value) -> StoreResult<Vec<Filter>> {
    match operand {
        serde_json::Value::Array(items) if !items.is_empty() => {
            items.iter().map(Filter::parse).collect()
        }
        _ => Err(StoreError::invalid_query(format!(
            "{op} expects a non-empty array"
        ))),
    }
}

fn is_operator_object(operand: &serde_json::Value) -> bool {
    matches!(operand, serde_json::Value::Object(o)
        if !o.is_empty() && o.keys().all(|k| k.starts_with('$')) && !o.contains_key(crate::value::BUFFER_KEY))
}

fn parse_condition(operand: &serde_json::Value) -> StoreResult<Condition> {
    let serde_json::Value::Object(object) = operand else {
        return Ok(Condition::Eq(Value::from_json(operand.clone())));
    };
    if !is_operator_object(operand) {
        return Ok(Condition::Eq(Value::from_json(operand.clone())));
    }

    let options = match object.get("$options") {
        None => "",
        Some(serde_json::Value::String(s)) => s.as_str(),
        Some(_) => return Err(StoreError::invalid_query("$options must be a string")),
    };

    let mut conditions = Vec::with_capacity(object.len());
    for (op, arg) in object {
        let value = || Value::from_json(arg.clone());
        let condition = match op.as_str() {
            "$eq" => Condition::Eq(value()),
            "$ne" => Condition::Ne(value()),
            "$gt" => Condition::Gt(value()),
            "$gte" => Condition::Gte(value()),
            "$lt" => Condition::Lt(value()),
            "$lte" => Condition::Lte(value()),
            "$in" => Condition::In(parse_list(op, arg)?),
            "$nin" => Condition::Nin(parse_list(op, arg)?),
            "$exists" => Condition::Exists(truthy(arg)),
            "$regex" => match arg {
                serde_json::Value::String(pattern) => {
                    Condition::Regex(Pattern::new(pattern, options)?)
                }
                _ => return Err(StoreError::invalid_query("$regex expects a string")),
            },
            "$options" => continue,
            "$not" => Condition::Not(Box::new(parse_condition(arg)?)),
            other => {
                return Err(StoreError::invalid_query(format!(
                    "unknown operator {other}"
                )))
            }
        };
        conditions.push(condition);
    }

    Ok(match conditions.len() {
        1 => conditions.remove(0),
        _ => Condition::All(conditions),
    })
}

fn parse_list(op: &str, arg: &serde_json::Value) -> StoreResult<Vec<Value>> {
    match arg {
        serde_json::Value::Array(items) => Ok(items.iter().cloned().map(Value::from_json).collect()),
        _ => Err(StoreError::invalid_query(format!("{op} expects an array"))),
    }
}

fn truthy(arg: &serde_json::Value) -> bool {
    match arg {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::Null => false,
        _ => true,
    }
}

/// Values found at `path`, expanding arrays met along the way.
fn resolve<'a>(doc: &'a Document, path: &str) -> Vec<Cow<'a, Value>> {
    if let Some(found) = doc.get(path) {
        return vec![found];
    }
    let Some((head, rest)) = path.split_once('.') else {
        return Vec::new();
    };
    let mut out = Vec::new();
    if let Some(root) = doc.get(head) {
        match root {
            Cow::Borrowed(value) => collect_path(value, rest, &mut out),
            Cow::Owned(value) => {
                let mut owned = Vec::new();
                collect_path(&value, rest, &mut owned);
                out.extend(owned.into_iter().map(|v| Cow::Owned(v.into_owned())));
            }
        }
    }
    out
}

fn collect_path<'a>(value: &'a Value, path: &str, out: &mut Vec<Cow<'a, Value>>) {
    let (segment, rest) = match path.split_once('.') {
        Some((segment, rest)) => (segment, Some(rest)),
        None => (path, None),
    };
    let next = match value {
        Value::Map(map) => map.get(segment),
        Value::Array(items) => match segment.parse::<usize>() {
            Ok(index) => items.get(index),
            Err(_) => {
                for item in items {
                    collect_path(item, path, out);
                }
                return;
            }
        },
        _ => None,
    };
    match (next, rest) {
        (Some(next), Some(rest)) => collect_path(next, rest, out),
        (Some(next), None) => out.push(Cow::Borrowed(next)),
        (None, _) => {}
    }
}

/// Equality with numeric coercion between integers and floats.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        _ => a.compare(b) == Some(Ordering::Equal),
    }
}

/// Element-wise view: the value itself, then its elements if it is an array.
fn candidates<'v>(value: &'v Value) -> impl Iterator<Item = &'v Value> {
    let elements: &[Value] = match value {
        Value::Array(items) => items,
        _ => &[],
    };
    std::iter::once(value).chain(elements.iter())
}

impl Condition {
    /// Tests the values resolved at a field path (empty when missing).
    #[must_use]
    pub fn matches(&self, found: &[Cow<'_, Value>]) -> bool {
        match self {
            Self::Eq(expected) => eq_any(found, expected),
            Self::Ne(expected) => !eq_any(found, expected),
            Self::Gt(bound) => cmp_any(found, bound, Ordering::is_gt),
            Self::Gte(bound) => cmp_any(found, bound, Ordering::is_ge),
            Self::Lt(bound) => cmp_any(found, bound, Ordering::is_lt),
            Self::Lte(bound) => cmp_any(found, bound, Ordering::is_le),
            Self::In(values) => values.iter().any(|v| eq_any(found, v)),
            Self::Nin(values) => !values.iter().any(|v| eq_any(found, v)),
            Self::Exists(expected) => !found.is_empty() == *expected,
            Self::Regex(pattern) => found.iter().any(|v| {
                candidates(v)
                    .filter_map(Value::as_str)
                    .any(|s| pattern.is_match(s))
            }),
            Self::Not(inner) => !inner.matches(found),
            Self::All(conditions) => conditions.iter().all(|c| c.matches(found)),
        }
    }
}

fn eq_any(found: &[Cow<'_, Value>], expected: &Value) -> bool {
    if found.is_empty() {
        return expected.is_null();
    }
    found
        .iter()
        .any(|v| candidates(v).any(|c| values_equal(c, expected)))
}

fn cmp_any(found: &[Cow<'_, Value>], bound: &Value, accept: fn(Ordering) -> bool) -> bool {
    found.iter().any(|v| {
        candidates(v)
            .filter_map(|c| c.compare(bound))
            .any(accept)
    })
}
