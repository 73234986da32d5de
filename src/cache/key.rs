use serde::Serialize;

use crate::models::schema::digest32;

/// Builds a cache key `"<prefix>:<hex32>"` from a canonical serialization
/// of `(prefix, operation, params)` with map keys sorted.
/// Equal inputs always produce equal keys: `params` is serialized through
/// `serde_json::to_value` and re-canonicalized (object keys sorted
/// recursively) before hashing, so field order in the caller's struct
/// never affects the key.
pub fn build(prefix: &str, operation: &str, params: &impl Serialize) -> String {
    let value = serde_json::to_value(params).unwrap_or(serde_json::Value::Null);
    let canonical = canonicalize(&value);
    let payload = format!("{prefix}:{operation}:{canonical}");
    format!("{prefix}:{}", digest32(&payload))
}

fn canonicalize(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{:?}:{}", k, canonicalize(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equal_inputs_produce_equal_keys_regardless_of_field_order() {
        let a = json!({"maxSchemas": 10, "pattern": "*Tx*"});
        let b = json!({"pattern": "*Tx*", "maxSchemas": 10});
        assert_eq!(build("discovery", "schemas", &a), build("discovery", "schemas", &b));
    }

    #[test]
    fn different_inputs_produce_different_keys() {
        let a = json!({"maxSchemas": 10});
        let b = json!({"maxSchemas": 11});
        assert_ne!(build("discovery", "schemas", &a), build("discovery", "schemas", &b));
    }

    #[test]
    fn key_has_prefix_and_32_hex_digest() {
        let key = build("discovery", "schemas", &json!({"x": 1}));
        let (prefix, digest) = key.split_once(':').unwrap();
        assert_eq!(prefix, "discovery");
        assert_eq!(digest.len(), 32);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
