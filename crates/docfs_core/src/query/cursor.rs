//! Result cursors.

use crate::document::Document;
use crate::error::{StoreError, StoreResult};
use crate::query::projection::Projection;
use crate::value::Value;
use std::cmp::Ordering;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Sort specification: keys compared in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort(Vec<(String, Direction)>);

impl Sort {
    /// Parses `{ "name": 1, "creationDate": -1 }`.
    ///
    /// # Errors
    ///
    /// Directions must be `1` or `-1`.
    pub fn parse(spec: &serde_json::Value) -> StoreResult<Self> {
        let serde_json::Value::Object(object) = spec else {
            return Err(StoreError::invalid_query("sort must be an object"));
        };
        let mut keys = Vec::with_capacity(object.len());
        for (path, direction) in object {
            let direction = match direction.as_i64() {
                Some(1) => Direction::Ascending,
                Some(-1) => Direction::Descending,
                _ => {
                    return Err(StoreError::invalid_query(format!(
                        "sort direction of {path} must be 1 or -1"
                    )))
                }
            };
            keys.push((path.clone(), direction));
        }
        Ok(Self(keys))
    }

    /// Sort ascending by one path.
    pub fn ascending(path: impl Into<String>) -> Self {
        Self(vec![(path.into(), Direction::Ascending)])
    }

    /// Sort descending by one path.
    pub fn descending(path: impl Into<String>) -> Self {
        Self(vec![(path.into(), Direction::Descending)])
    }

    fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for (path, direction) in &self.0 {
            let ordering = compare_slots(a.get(path).as_deref(), b.get(path).as_deref());
            let ordering = match direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Missing values sort first; values of different types sort by type.
fn compare_slots(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a
            .compare(b)
            .unwrap_or_else(|| type_rank(a).cmp(&type_rank(b))),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Integer(_) | Value::Float(_) => 1,
        Value::Text(_) => 2,
        Value::Map(_) => 3,
        Value::Array(_) => 4,
        Value::Bytes(_) => 5,
        Value::Bool(_) => 6,
    }
}

/// Documents matched by a `find`, with pending sort/skip/limit.
///
/// Nothing is sorted or projected until [`Cursor::to_vec`].
#[derive(Debug, Clone)]
pub struct Cursor {
    docs: Vec<Document>,
    projection: Projection,
    sort: Option<Sort>,
    skip: usize,
    limit: Option<usize>,
}

impl Cursor {
    /// Creates a cursor over matched documents.
    #[must_use]
    pub fn new(docs: Vec<Document>, projection: Projection) -> Self {
        Self {
            docs,
            projection,
            sort: None,
            skip: 0,
            limit: None,
        }
    }

    /// Sorts the results.
    #[must_use]
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Skips the first `n` results.
    #[must_use]
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Returns at most `n` results.
    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Number of documents [`Cursor::to_vec`] would return.
    #[must_use]
    pub fn count(&self) -> usize {
        let remaining = self.docs.len().saturating_sub(self.skip);
        self.limit.map_or(remaining, |limit| remaining.min(limit))
    }

    /// Materializes the results, stripped of internal bookkeeping.
    #[must_use]
    pub fn to_vec(self) -> Vec<Document> {
        let Self {
            mut docs,
            projection,
            sort,
            skip,
            limit,
        } = self;

        if let Some(sort) = sort {
            docs.sort_by(|a, b| sort.compare(a, b));
        }

        docs.into_iter()
            .skip(skip)
            .take(limit.unwrap_or(usize::MAX))
            .map(|doc| projection.apply(doc.to_public()))
            .collect()
    }

    /// Returns the first result.
    #[must_use]
    pub fn first(self) -> Option<Document> {
        self.limit(1).to_vec().into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs() -> Vec<Document> {
        [
            json!({ "_id": "1", "name": "b", "n": 2, "$$etag": 5, "$entitySet": "t" }),
            json!({ "_id": "2", "name": "a", "n": 3 }),
            json!({ "_id": "3", "name": "c" }),
            json!({ "_id": "4", "name": "a", "n": 1 }),
        ]
        .into_iter()
        .map(|j| Document::from_json(j).unwrap())
        .collect()
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn unsorted_keeps_insertion_order() {
        let out = Cursor::new(docs(), Projection::All).to_vec();
        assert_eq!(ids(&out), vec!["1", "2", "3", "4"]);
        assert!(out[0].etag.is_none());
        assert!(out[0].entity_set.is_none());
    }

    #[test]
    fn multi_key_sort() {
        let sort = Sort::parse(&json!({ "name": 1, "n": -1 })).unwrap();
        let out = Cursor::new(docs(), Projection::All).sort(sort).to_vec();
        assert_eq!(ids(&out), vec!["2", "4", "1", "3"]);
    }

    #[test]
    fn missing_values_sort_first() {
        let out = Cursor::new(docs(), Projection::All)
            .sort(Sort::ascending("n"))
            .to_vec();
        assert_eq!(ids(&out), vec!["3", "4", "1", "2"]);
    }

    #[test]
    fn skip_limit_count() {
        let cursor = Cursor::new(docs(), Projection::All)
            .sort(Sort::descending("n"))
            .skip(1)
            .limit(2);
        assert_eq!(cursor.count(), 2);
        assert_eq!(ids(&cursor.to_vec()), vec!["1", "4"]);

        let past_end = Cursor::new(docs(), Projection::All).skip(10);
        assert_eq!(past_end.count(), 0);
        assert!(past_end.to_vec().is_empty());
    }

    #[test]
    fn projection_applies_after_sort() {
        let projection = Projection::parse(&json!({ "name": 1 })).unwrap();
        let first = Cursor::new(docs(), projection)
            .sort(Sort::ascending("n"))
            .skip(1)
            .first()
            .unwrap();
        assert_eq!(first.to_json(), json!({ "_id": "4", "name": "a" }));
    }

    #[test]
    fn bad_sort_direction() {
        assert!(Sort::parse(&json!({ "a": 2 })).is_err());
        assert!(Sort::parse(&json!("a")).is_err());
    }
}
