//! Journal record types and line encoding.

use crate::document::Document;
use crate::error::{StoreError, StoreResult};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// Kind of journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalOperation {
    /// A document was inserted.
    Insert,
    /// A document was updated.
    Update,
    /// A document was removed.
    Remove,
    /// Readers must rebuild their cache from disk.
    Reload,
}

/// One line of the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// What happened.
    pub operation: JournalOperation,
    /// When the record was written.
    pub timestamp: Timestamp,
    /// The affected document, absent for reload markers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
    /// Id of the journal handle that wrote the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer: Option<String>,
}

impl JournalRecord {
    /// Creates a record for a document mutation stamped with the current time.
    ///
    /// The etag is dropped: it only lives in memory.
    #[must_use]
    pub fn mutation(operation: JournalOperation, mut doc: Document) -> Self {
        doc.etag = None;
        Self {
            operation,
            timestamp: Timestamp::now(),
            doc: Some(doc),
            writer: None,
        }
    }

    /// Creates a reload marker stamped with the current time.
    #[must_use]
    pub fn reload() -> Self {
        Self {
            operation: JournalOperation::Reload,
            timestamp: Timestamp::now(),
            doc: None,
            writer: None,
        }
    }

    /// Tags the record with the id of the journal handle writing it.
    #[must_use]
    pub fn with_writer(mut self, writer: impl Into<String>) -> Self {
        self.writer = Some(writer.into());
        self
    }

    /// Returns true if `writer` wrote this record.
    #[must_use]
    pub fn written_by(&self, writer: &str) -> bool {
        self.writer.as_deref() == Some(writer)
    }

    /// Encodes the record as one line, without the newline.
    pub fn to_line(&self) -> StoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes one line.
    pub fn from_line(line: &str) -> StoreResult<Self> {
        let record: Self = serde_json::from_str(line)?;
        if record.operation != JournalOperation::Reload {
            let valid = record
                .doc
                .as_ref()
                .is_some_and(|doc| !doc.id.is_empty() && doc.entity_set.is_some());
            if !valid {
                return Err(StoreError::journal_corruption(format!(
                    "{:?} record without a document id and entity set",
                    record.operation
                )));
            }
        }
        Ok(record)
    }
}

/// Parses every non-empty line of a journal.
///
/// # Errors
///
/// Returns [`StoreError::JournalCorruption`] naming the first bad line.
pub fn parse(contents: &str) -> StoreResult<Vec<JournalRecord>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            JournalRecord::from_line(line).map_err(|e| {
                StoreError::journal_corruption(format!("line {}: {e}", number + 1))
            })
        })
        .collect()
}
