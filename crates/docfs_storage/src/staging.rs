//! Staging marker names.
//!
//! Directory and file writes never happen in place. A write first lands under
//! an **inconsistent** marker name (`~~`), is renamed to a **consistent**
//! marker name (`~`) once complete, and only then replaces the final entry.
//!
//! ```text
//! ~~new            staging an insert (nothing to replace)
//! ~~original~new   staging an update of `original`, to be named `new`
//! ~new             insert written, pending final rename
//! ~original~new    update written, pending removal of `original` + rename
//! ```

use crate::error::{StorageError, StorageResult};
use std::fmt;

/// Prefix of a staging entry that is not yet consistent.
pub const INCONSISTENT_PREFIX: &str = "~~";

/// Prefix of a staging entry that is consistent and awaiting its final rename.
pub const CONSISTENT_PREFIX: &str = "~";

/// Separator between the original and the new name inside a marker.
const SEPARATOR: char = '~';

/// Whether a staging entry may be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    /// The write did not finish; the entry must be discarded.
    Inconsistent,
    /// The write finished; the entry must be promoted to its final name.
    Consistent,
}

/// A parsed staging marker name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingMarker {
    /// Marker state.
    pub state: MarkerState,
    /// Name of the entry being replaced, if any.
    pub original: Option<String>,
    /// Final name of the entry.
    pub new: String,
}

impl StagingMarker {
    /// Creates a marker in the inconsistent (staging) state.
    #[must_use]
    pub fn staging(original: Option<&str>, new: &str) -> Self {
        Self {
            state: MarkerState::Inconsistent,
            original: original.map(str::to_string),
            new: new.to_string(),
        }
    }

    /// Returns the same marker in the consistent state.
    #[must_use]
    pub fn into_consistent(self) -> Self {
        Self {
            state: MarkerState::Consistent,
            ..self
        }
    }

    /// Returns true if `name` uses the staging marker syntax.
    #[must_use]
    pub fn is_marker(name: &str) -> bool {
        name.starts_with(CONSISTENT_PREFIX)
    }

    /// Parses an entry name.
    ///
    /// Returns `Ok(None)` for ordinary names and an error for names that start
    /// with the marker prefix but cannot be decoded.
    pub fn parse(name: &str) -> StorageResult<Option<Self>> {
        let (state, rest) = if let Some(rest) = name.strip_prefix(INCONSISTENT_PREFIX) {
            (MarkerState::Inconsistent, rest)
        } else if let Some(rest) = name.strip_prefix(CONSISTENT_PREFIX) {
            (MarkerState::Consistent, rest)
        } else {
            return Ok(None);
        };

        let parts: Vec<&str> = rest.split(SEPARATOR).collect();
        let (original, new) = match parts.as_slice() {
            [new] => (None, *new),
            [original, new] => (Some((*original).to_string()), *new),
            _ => return Err(StorageError::MalformedMarker(name.to_string())),
        };

        if new.is_empty() || original.as_deref() == Some("") {
            return Err(StorageError::MalformedMarker(name.to_string()));
        }

        Ok(Some(Self {
            state,
            original,
            new: new.to_string(),
        }))
    }
}

impl fmt::Display for StagingMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.state {
            MarkerState::Inconsistent => INCONSISTENT_PREFIX,
            MarkerState::Consistent => CONSISTENT_PREFIX,
        };
        match &self.original {
            Some(original) => write!(f, "{prefix}{original}{SEPARATOR}{}", self.new),
            None => write!(f, "{prefix}{}", self.new),
        }
    }
}

/// Checks that `name` can be stored as a directory or file name.
///
/// Names must be non-empty, must not contain the marker separator or a path
/// separator, and must not be `.` or `..`.
pub fn validate_entry_name(name: &str) -> StorageResult<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(SEPARATOR)
        || name.contains('/')
        || name.contains('\\');

    if invalid {
        Err(StorageError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ordinary_name_is_not_a_marker() {
        assert_eq!(StagingMarker::parse("templates").unwrap(), None);
        assert!(!StagingMarker::is_marker("report"));
    }

    #[test]
    fn parse_insert_markers() {
        let staging = StagingMarker::parse("~~invoice").unwrap().unwrap();
        assert_eq!(staging.state, MarkerState::Inconsistent);
        assert_eq!(staging.original, None);
        assert_eq!(staging.new, "invoice");

        let consistent = StagingMarker::parse("~invoice").unwrap().unwrap();
        assert_eq!(consistent.state, MarkerState::Consistent);
        assert_eq!(consistent.new, "invoice");
    }

    #[test]
    fn parse_update_markers() {
        let marker = StagingMarker::parse("~old~new").unwrap().unwrap();
        assert_eq!(marker.state, MarkerState::Consistent);
        assert_eq!(marker.original.as_deref(), Some("old"));
        assert_eq!(marker.new, "new");

        let marker = StagingMarker::parse("~~old~new").unwrap().unwrap();
        assert_eq!(marker.state, MarkerState::Inconsistent);
        assert_eq!(marker.original.as_deref(), Some("old"));
    }

    #[test]
    fn malformed_markers_are_rejected() {
        assert!(StagingMarker::parse("~a~b~c").is_err());
        assert!(StagingMarker::parse("~").is_err());
        assert!(StagingMarker::parse("~~").is_err());
        assert!(StagingMarker::parse("~~~b").is_err());
    }

    #[test]
    fn display_round_trips() {
        let marker = StagingMarker::staging(Some("a"), "b");
        assert_eq!(marker.to_string(), "~~a~b");
        assert_eq!(marker.clone().into_consistent().to_string(), "~a~b");
        assert_eq!(StagingMarker::staging(None, "b").to_string(), "~~b");
    }

    #[test]
    fn entry_name_validation() {
        assert!(validate_entry_name("invoice").is_ok());
        assert!(validate_entry_name("my report.v2").is_ok());
        assert!(validate_entry_name("").is_err());
        assert!(validate_entry_name("a~b").is_err());
        assert!(validate_entry_name("~a").is_err());
        assert!(validate_entry_name("a/b").is_err());
        assert!(validate_entry_name("..").is_err());
    }

    proptest! {
        #[test]
        fn valid_names_survive_marker_encoding(
            original in proptest::option::of("[a-zA-Z0-9 ._-]{1,16}"),
            new in "[a-zA-Z0-9 ._-]{1,16}",
        ) {
            prop_assume!(validate_entry_name(&new).is_ok());
            if let Some(o) = &original {
                prop_assume!(validate_entry_name(o).is_ok());
            }

            let marker = StagingMarker::staging(original.as_deref(), &new);
            let parsed = StagingMarker::parse(&marker.to_string()).unwrap().unwrap();
            prop_assert_eq!(parsed, marker.clone());

            let consistent = marker.into_consistent();
            let parsed = StagingMarker::parse(&consistent.to_string()).unwrap().unwrap();
            prop_assert_eq!(parsed, consistent);
        }
    }
}
