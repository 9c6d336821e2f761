//! Deep-merge semantics for document patching
//!
//! Patch is a recursive merge, never a destructive replace for nested
//! objects: map keys merge recursively, arrays and scalars are replaced
//! wholesale, and keys new in the patch are added.

use serde_json::Value;

/// Merge `patch` into `base`, returning the merged value
///
/// # Examples
///
/// ```
/// use loam_core::merge::deep_merge;
/// use serde_json::json;
///
/// let merged = deep_merge(json!({"a": {"x": 1, "y": 2}}), json!({"a": {"x": 9}}));
/// assert_eq!(merged, json!({"a": {"x": 9, "y": 2}}));
/// ```
pub fn deep_merge(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(mut base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.remove(&key) {
                    Some(existing) => {
                        base_map.insert(key, deep_merge(existing, patch_value));
                    }
                    None => {
                        base_map.insert(key, patch_value);
                    }
                }
            }
            Value::Object(base_map)
        }
        // Arrays and scalars replace wholesale.
        (_, patch) => patch,
    }
}
