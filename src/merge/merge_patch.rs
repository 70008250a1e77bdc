//! JSON merge patches (RFC 7386)

use serde_json::{Map, Value};

/// Compute the merge patch that turns `original` into `modified`.
///
/// Keys removed in `modified` become `null`; an empty object means the two
/// documents are already equal.
pub fn create(original: &Value, modified: &Value) -> Value {
    match (original, modified) {
        (Value::Object(orig), Value::Object(modi)) => Value::Object(diff_objects(orig, modi)),
        _ => modified.clone(),
    }
}

fn diff_objects(
    original: &Map<String, Value>,
    modified: &Map<String, Value>,
) -> Map<String, Value> {
    let mut patch = Map::new();

    for key in original.keys() {
        if !modified.contains_key(key) {
            patch.insert(key.clone(), Value::Null);
        }
    }

    for (key, new_value) in modified {
        match original.get(key) {
            None => {
                patch.insert(key.clone(), new_value.clone());
            }
            Some(old_value) if old_value == new_value => {}
            Some(Value::Object(old_map)) => match new_value {
                Value::Object(new_map) => {
                    let nested = diff_objects(old_map, new_map);
                    if !nested.is_empty() {
                        patch.insert(key.clone(), Value::Object(nested));
                    }
                }
                _ => {
                    patch.insert(key.clone(), new_value.clone());
                }
            },
            Some(_) => {
                patch.insert(key.clone(), new_value.clone());
            }
        }
    }

    patch
}

/// Apply a merge patch to `target` in place
pub fn apply(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }

    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                let entry = target_map.entry(key.clone()).or_insert(Value::Null);
                apply(entry, value);
            }
        }
    }
}

/// Whether a patch carries no changes
pub fn is_empty(patch: &Value) -> bool {
    matches!(patch, Value::Object(map) if map.is_empty())
}
