//! Hashing - SHA-256 Over Canonical JSON
//!
//! Two renders of the same page state must hash identically, so every digest
//! is taken over key-sorted, whitespace-free JSON.

use sha2::{Sha256, Digest};
use serde::Serialize;
use serde_json::{Value, to_string};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_value(v)))
                    .collect(),
            )
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Digest of any serializable record (display lists, manifests).
pub fn canonical_digest<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(canonical_json(value)?.as_bytes()))
}

/// Identifies the inputs of one export job:
/// sha256(preset_id : page_index : canonical(content) : engine_version)
pub fn compute_job_hash(
    preset_id: &str,
    page_index: u32,
    content: &impl Serialize,
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    let combined = format!(
        "{}:{}:{}:{}",
        preset_id, page_index, canonical_json(content)?, engine_version
    );
    Ok(sha256_hex(combined.as_bytes()))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"z": 1, "a": 2, "m": {"y": 1, "b": 2}});
        assert_eq!(canonical_json(&obj).unwrap(), r#"{"a":2,"m":{"b":2,"y":1},"z":1}"#);
    }

    #[test]
    fn test_digest_ignores_key_order() {
        let a = json!({"cells": [1, 2], "width": 10});
        let b = json!({"width": 10, "cells": [1, 2]});
        assert_eq!(canonical_digest(&a).unwrap(), canonical_digest(&b).unwrap());
        let c = json!({"width": 10, "cells": [2, 1]});
        assert_ne!(canonical_digest(&a).unwrap(), canonical_digest(&c).unwrap());
    }

    #[test]
    fn test_job_hash_depends_on_content() {
        let h1 = compute_job_hash("p", 0, &json!({"headline": "A"}), "1.0.0").unwrap();
        let h2 = compute_job_hash("p", 0, &json!({"headline": "A"}), "1.0.0").unwrap();
        let h3 = compute_job_hash("p", 0, &json!({"headline": "B"}), "1.0.0").unwrap();
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(h1.len(), 64);
    }
}
