//! Property-based test generators using proptest.
//!
//! Provides strategies for generating documents that the store accepts.

use docfs_core::{Document, Map, Value};
use proptest::prelude::*;

/// Strategy for names that are valid directory entries on every platform.
pub fn entry_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9 _-]{0,15}")
        .expect("Invalid regex")
        .prop_map(|s| s.trim_end().to_string())
        .prop_filter("Name must not be empty", |s| !s.is_empty())
}

/// Strategy for field names that do not collide with reserved keys.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9]{0,9}")
        .expect("Invalid regex")
        .prop_filter("Reserved key", |s| {
            !matches!(s.as_str(), "name" | "shortid" | "folder" | "content")
        })
}

/// Strategy for scalar field values that survive a JSON round trip.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| Value::Integer(i64::from(n))),
        prop::string::string_regex("[ -~]{0,24}")
            .expect("Invalid regex")
            .prop_map(Value::Text),
    ]
}

/// Strategy for field values, nesting arrays and maps up to two levels.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(field_name_strategy(), inner, 0..4)
                .prop_map(|m| Value::Map(m.into_iter().collect())),
        ]
    })
}

/// Strategy for a named document with a handful of extra fields.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    (
        entry_name_strategy(),
        prop::collection::btree_map(field_name_strategy(), field_value_strategy(), 0..5),
    )
        .prop_map(|(name, fields)| {
            let mut map: Map = fields.into_iter().collect();
            map.insert("name".to_string(), Value::Text(name));
            Document::from_map(map).expect("Generated document is valid")
        })
}

/// Strategy for text document property content, including multi-byte text.
pub fn text_content_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9<>/ \n\u{e9}\u{4e2d}]{0,64}").expect("Invalid regex")
}

/// Strategy for binary document property content.
pub fn binary_content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}
