//! Canonical JSON serialization and hashing.
//!
//! Object keys are emitted in sorted order at every depth, so two values that
//! compare equal always serialize to the same bytes regardless of insertion
//! order or map implementation. Cache keys and consensus comparisons are built
//! on this form.

use std::fmt::Write as _;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize `value` with object keys sorted at every depth.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Strings always serialize.
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hex-encoded SHA-256 of `input`.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// SHA-256 of the canonical serialization of `value`.
#[must_use]
pub fn canonical_hash(value: &Value) -> String {
    sha256_hex(&canonical_json(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_recursively() {
        let value = json!({"b": 1, "a": {"z": true, "c": [ {"y": 1, "x": 2} ]}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":[{"x":2,"y":1}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn strings_are_escaped() {
        let value = json!({"k\"ey": "line\nbreak"});
        assert_eq!(canonical_json(&value), r#"{"k\"ey":"line\nbreak"}"#);
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn array_order_matters() {
        assert_ne!(canonical_hash(&json!([1, 2])), canonical_hash(&json!([2, 1])));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn insertion_order_does_not_change_hash(
                entries in proptest::collection::btree_map("[a-z]{1,6}", 0i64..1000, 0..12)
            ) {
                let mut forward = serde_json::Map::new();
                for (k, v) in &entries {
                    let _ = forward.insert(k.clone(), json!(v));
                }
                let mut reverse = serde_json::Map::new();
                for (k, v) in entries.iter().rev() {
                    let _ = reverse.insert(k.clone(), json!(v));
                }
                prop_assert_eq!(
                    canonical_hash(&Value::Object(forward)),
                    canonical_hash(&Value::Object(reverse))
                );
            }

            #[test]
            fn canonical_form_parses_back_to_equal_value(
                entries in proptest::collection::btree_map("[a-z]{1,6}", "[ -~]{0,10}", 0..8)
            ) {
                let value = json!(entries);
                let parsed: Value = serde_json::from_str(&canonical_json(&value)).unwrap();
                prop_assert_eq!(parsed, value);
            }
        }
    }
}
