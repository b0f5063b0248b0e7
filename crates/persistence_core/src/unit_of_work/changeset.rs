//! Top-level change detection between two serialized states.

use serde_json::Value;
use std::collections::BTreeSet;

/// Names of top-level fields whose values differ, sorted.
///
/// A field missing on one side counts as `null`, so adding an explicit
/// `null` is not a change. Non-object inputs compare as a whole and report
/// no field names.
pub(crate) fn changed_fields(original: &Value, current: &Value) -> Vec<String> {
    let (Some(before), Some(after)) = (original.as_object(), current.as_object()) else {
        return Vec::new();
    };

    let names: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    names
        .into_iter()
        .filter(|name| {
            let old = before.get(*name).unwrap_or(&Value::Null);
            let new = after.get(*name).unwrap_or(&Value::Null);
            old != new
        })
        .cloned()
        .collect()
}
