//! Dedupe fingerprints for idempotent enqueue.

use sha2::{Digest, Sha256};

use crate::types::JobType;

/// Stable JSON encoding: object keys sorted recursively, floats in a fixed
/// decimal form, array order preserved.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Null => out.push_str("null"),
        serde_json::Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                out.push_str(&i.to_string());
            } else if let Some(u) = n.as_u64() {
                out.push_str(&u.to_string());
            } else {
                // Fixed six-decimal form so 0.1 + 0.2 artifacts collapse.
                let f = n.as_f64().unwrap_or(0.0);
                out.push_str(&format!("{f:.6}"));
            }
        }
        serde_json::Value::String(s) => {
            // serde_json's escaping is already deterministic
            out.push_str(&serde_json::Value::String(s.clone()).to_string());
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
    }
}

/// SHA-256 over `type || canonical(params) || parent_id`, hex encoded.
pub fn dedupe_key(
    job_type: JobType,
    params: &serde_json::Value,
    parent_id: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(job_type.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical_json(params).as_bytes());
    hasher.update([0u8]);
    hasher.update(parent_id.unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn key_order_does_not_matter() {
        let a = json!({"prompt": "x", "genres": ["a", "b"], "durationSec": 60});
        let b = json!({"durationSec": 60, "genres": ["a", "b"], "prompt": "x"});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(
            dedupe_key(JobType::Pipeline, &a, None),
            dedupe_key(JobType::Pipeline, &b, None)
        );
    }

    #[test]
    fn array_order_does_matter() {
        let a = json!({"genres": ["a", "b"]});
        let b = json!({"genres": ["b", "a"]});
        assert_ne!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn nested_objects_sort_recursively() {
        let a = json!({"outer": {"z": 1, "a": {"y": 2, "b": 3}}});
        assert_eq!(
            canonical_json(&a),
            r#"{"outer":{"a":{"b":3,"y":2},"z":1}}"#
        );
    }

    #[test]
    fn floats_normalize_to_fixed_decimals() {
        let a = json!({"v": 0.30000000000000004});
        let b = json!({"v": 0.3});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&json!(1.5)), "1.500000");
    }

    #[test]
    fn integers_stay_integers() {
        assert_eq!(canonical_json(&json!(60)), "60");
        assert_eq!(canonical_json(&json!(-3)), "-3");
    }

    #[test]
    fn type_and_parent_scope_the_key() {
        let params = json!({"x": 1});
        let base = dedupe_key(JobType::Audio, &params, None);
        assert_ne!(base, dedupe_key(JobType::Mix, &params, None));
        assert_ne!(base, dedupe_key(JobType::Audio, &params, Some("parent")));
        assert_eq!(base, dedupe_key(JobType::Audio, &params, None));
    }

    #[test]
    fn key_is_hex_sha256() {
        let key = dedupe_key(JobType::Plan, &json!({}), None);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
