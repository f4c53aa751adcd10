//! Deep merge of expression results into one composite document.
//!
//! Rules, checked in this order:
//! 1. source array, target not an array: target becomes a copy of source.
//! 2. both arrays of length one holding objects: merge element into element.
//! 3. equal-length arrays of objects on both sides: merge by index.
//! 4. other arrays: append source elements whose canonical form is not
//!    already present in target.
//! 5. source object: merge key by key (see [`merge_into`]).
//! 6. anything else: source replaces target.

use itertools::Itertools;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::trace;

/// Merge `source` into a copy of `target`. Passing the same value twice returns it unchanged.
pub fn merge(target: &Value, source: &Value) -> Value {
    if std::ptr::eq(target, source) {
        return target.clone();
    }
    let mut out = target.clone();
    merge_into(&mut out, source);
    out
}

/// In-place form of [`merge`].
pub fn merge_into(target: &mut Value, source: &Value) {
    match source {
        Value::Array(src) => merge_array(target, src),
        Value::Object(src) => match target {
            Value::Object(dst) => merge_object(dst, src),
            _ => {
                trace!("object replaces non-object target");
                *target = source.clone();
            }
        },
        scalar => *target = scalar.clone(),
    }
}

fn merge_object(dst: &mut Map<String, Value>, src: &Map<String, Value>) {
    for (key, value) in src {
        match value {
            Value::Array(items) => match dst.get_mut(key) {
                Some(existing) => merge_array(existing, items),
                None => {
                    dst.insert(key.clone(), value.clone());
                }
            },
            Value::Object(_) => match dst.get_mut(key) {
                Some(existing) if existing.is_object() => merge_into(existing, value),
                _ => {
                    trace!(key = %key, "overwriting with object");
                    dst.insert(key.clone(), value.clone());
                }
            },
            other => {
                dst.insert(key.clone(), other.clone());
            }
        }
    }
}

fn merge_array(target: &mut Value, src: &[Value]) {
    if !target.is_array() {
        trace!("array replaces non-array target");
        *target = Value::Array(src.to_vec());
        return;
    }
    let Value::Array(dst) = target else { return };
    if dst.len() == 1 && src.len() == 1 && dst[0].is_object() && src[0].is_object() {
        merge_into(&mut dst[0], &src[0]);
        return;
    }
    if dst.len() == src.len() && dst.iter().chain(src).all(Value::is_object) {
        for (d, s) in dst.iter_mut().zip(src) {
            merge_into(d, s);
        }
        return;
    }
    // Only elements already in the target count as present.
    let seen: HashSet<String> = dst.iter().map(canonical_key).collect();
    let fresh = src.iter().filter(|item| !seen.contains(&canonical_key(item))).cloned().collect_vec();
    dst.extend(fresh);
}

/// Compact serialization used for array dedup; `Map` keeps keys sorted, so
/// structurally equal objects compare equal whatever their insertion order.
pub fn canonical_key(v: &Value) -> String {
    serde_json::to_string(v).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn singleton_objects_merge() {
        assert_eq!(merge(&json!([{"a": 1}]), &json!([{"b": 2}])), json!([{"a": 1, "b": 2}]));
    }

    #[test]
    fn equal_length_object_arrays_merge_by_index() {
        let out = merge(&json!([{"a": 1}, {"a": 2}]), &json!([{"b": 1}, {"b": 2}]));
        assert_eq!(out, json!([{"a": 1, "b": 1}, {"a": 2, "b": 2}]));
    }

    #[test]
    fn other_arrays_concatenate_without_duplicates() {
        let a = json!({"x": 1, "y": [1, 2]});
        let b = json!({"y": [1, 2], "x": 1});
        assert_eq!(merge(&json!([a.clone()]), &json!([b, {"z": 0}])), json!([a, {"z": 0}]));
        assert_eq!(merge(&json!([1, 2]), &json!([2, 3])), json!([1, 2, 3]));
    }

    #[test]
    fn duplicates_within_source_are_kept() {
        assert_eq!(merge(&json!([1]), &json!([2, 2])), json!([1, 2, 2]));
        assert_eq!(merge(&json!([1, 3]), &json!([3, 4, 4, 1])), json!([1, 3, 4, 4]));
    }

    #[test]
    fn keyed_array_over_scalar_matches_top_level() {
        assert_eq!(merge(&json!("s"), &json!([1, 1])), json!([1, 1]));
        assert_eq!(merge(&json!({"k": "s"}), &json!({"k": [1, 1]})), json!({"k": [1, 1]}));
        assert_eq!(merge(&json!({}), &json!({"k": [2, 2]})), json!({"k": [2, 2]}));
    }

    #[test]
    fn array_replaces_non_array() {
        assert_eq!(merge(&json!({"a": 1}), &json!([1])), json!([1]));
        assert_eq!(merge(&json!({"k": "s"}), &json!({"k": [1]})), json!({"k": [1]}));
    }

    #[test]
    fn nested_objects_recurse_and_scalars_overwrite() {
        let target = json!({"p": {"name": "a", "age": 3}, "s": {"x": 1}});
        let source = json!({"p": {"age": 4}, "s": 5, "n": null});
        assert_eq!(
            merge(&target, &source),
            json!({"p": {"name": "a", "age": 4}, "s": 5, "n": null})
        );
    }

    #[test]
    fn object_over_scalar_is_replaced() {
        assert_eq!(merge(&json!({"a": 1}), &json!({"a": {"b": 2}})), json!({"a": {"b": 2}}));
        assert_eq!(merge(&json!(3), &json!({"b": 2})), json!({"b": 2}));
    }

    #[test]
    fn same_reference_short_circuits() {
        let v = json!({"a": [1, 1]});
        assert_eq!(merge(&v, &v), v);
    }

    #[test]
    fn canonical_key_ignores_key_order() {
        assert_eq!(canonical_key(&json!({"b": 1, "a": [true]})), r#"{"a":[true],"b":1}"#);
    }
}
