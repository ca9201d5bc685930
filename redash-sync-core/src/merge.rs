//! Merge-on-change for persisted documents.
//!
//! A document is an ordered key/value map. When a fetched record is written over
//! a document that already exists on disk, only allow-listed fields whose value
//! actually differs are assigned. Keys the operator added by hand stay where
//! they are, and unchanged fields keep their position, so a second fetch of the
//! same server state produces no diff.

use serde_json::{Map, Value};

/// Ordered key/value document, as stored in the `.yaml` files.
pub type Document = Map<String, Value>;

/// Assign `value` to `key` unless the stored value is already equal.
///
/// Returns `true` when the document changed.
pub fn assign_if_changed(document: &mut Document, key: &str, value: Value) -> bool {
    if document.get(key) == Some(&value) {
        return false;
    }
    document.insert(key.to_string(), value);
    true
}

/// Merge the allow-listed `fields` of `incoming` into `stored`.
///
/// Fields missing from `incoming` are left alone in `stored`, as are all keys
/// outside the allow-list. Returns the number of fields that changed.
pub fn merge_fields(stored: &mut Document, incoming: &Document, fields: &[&str]) -> usize {
    let mut changed = 0;
    for field in fields {
        if let Some(value) = incoming.get(*field) {
            if assign_if_changed(stored, field, value.clone()) {
                changed += 1;
            }
        }
    }
    changed
}
