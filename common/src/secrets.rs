//! Protected-value hoisting (spec §4.2, glossary: "protected key").
//!
//! A document key beginning with `_` marks its value as a secret. Before a
//! batch document is persisted, every such value is collected into a bundle
//! keyed by an opaque reference and the value is replaced in-place, mirroring
//! `original_source/cc-core/cc_core/commons/red_secrets.py`'s
//! `get_secret_values` / `normalize_keys` pass but folded into one walk that
//! both collects and rewrites.

use std::collections::BTreeMap;

use serde_json::Value;

/// Result of walking a document for protected values: the rewritten document
/// (each protected value replaced by `{"secretRef": "<ref>"}`) plus the
/// collected `ref -> value` bundle to hand to `SecretClient::put`.
pub struct HoistResult {
    pub document: BTreeMap<String, Value>,
    pub bundle: BTreeMap<String, Value>,
}

pub fn is_protected_key(key: &str) -> bool {
    key.starts_with('_')
}

/// Hoists every protected value out of `document`, replacing each with an
/// opaque reference `"{bundle_id}/{n}"`.
pub fn hoist_protected_values(bundle_id: &str, document: &BTreeMap<String, Value>) -> HoistResult {
    let mut bundle = BTreeMap::new();
    let mut counter = 0usize;
    let mut out = BTreeMap::new();

    for (k, v) in document {
        let rewritten = walk(bundle_id, k, v, false, &mut counter, &mut bundle);
        out.insert(k.clone(), rewritten);
    }

    HoistResult {
        document: out,
        bundle,
    }
}

fn walk(
    bundle_id: &str,
    key: &str,
    value: &Value,
    protected: bool,
    counter: &mut usize,
    bundle: &mut BTreeMap<String, Value>,
) -> Value {
    let this_protected = protected || is_protected_key(key);

    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), walk(bundle_id, k, v, this_protected, counter, bundle));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| walk(bundle_id, key, v, this_protected, counter, bundle))
                .collect(),
        ),
        leaf => {
            if this_protected {
                let reference = format!("{bundle_id}/{counter}");
                *counter += 1;
                bundle.insert(reference.clone(), leaf.clone());
                serde_json::json!({ "secretRef": reference })
            } else {
                leaf.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hoists_protected_leaf_values() {
        let mut doc = BTreeMap::new();
        doc.insert("_password".to_string(), json!("hunter2"));
        doc.insert("image".to_string(), json!("alpine:3"));

        let res = hoist_protected_values("batch-1", &doc);

        assert_eq!(res.bundle.len(), 1);
        assert_eq!(res.bundle.values().next().unwrap(), &json!("hunter2"));
        assert!(res.document["_password"]["secretRef"].is_string());
        assert_eq!(res.document["image"], json!("alpine:3"));
    }

    #[test]
    fn nested_protected_marks_all_descendant_leaves() {
        let mut doc = BTreeMap::new();
        doc.insert(
            "_auth".to_string(),
            json!({"user": "a", "pass": "b", "nested": {"token": "c"}}),
        );

        let res = hoist_protected_values("batch-2", &doc);
        assert_eq!(res.bundle.len(), 3);
    }

    #[test]
    fn non_protected_values_pass_through_unchanged() {
        let mut doc = BTreeMap::new();
        doc.insert("inputs".to_string(), json!({"a": [1, 2, 3]}));

        let res = hoist_protected_values("batch-3", &doc);
        assert!(res.bundle.is_empty());
        assert_eq!(res.document, doc);
    }
}
