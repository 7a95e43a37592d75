//! Canonical hashing of documents with redactable ("forgettable") fields.
//!
//! An object may list some of its own fields in a `$forgettable` member,
//! mapping each field name to a salt. Forgetting a field replaces it with
//! a salted hash under `$forgotten`, so the document hash computed by
//! [`hash_contract_terms`] is the same whether or not any field has been
//! forgotten. Keys starting with `$` are bookkeeping and are never
//! descended into.

use rand::RngCore;
use serde_json::{Map, Value};

use crate::canonical::canonical_json;
use crate::crockford;
use crate::error::CryptoError;
use crate::kdf::{hash, kdf};

const FORGETTABLE: &str = "$forgettable";
const FORGOTTEN: &str = "$forgotten";
const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Forget every forgettable field, at every depth.
pub fn scrub(doc: &Value) -> Result<Value, CryptoError> {
    forget_all(doc, |_| true)
}

/// Forget the forgettable fields whose path (field names and array
/// indices from the root) satisfies `pred`.
pub fn forget_all<F>(doc: &Value, pred: F) -> Result<Value, CryptoError>
where
    F: Fn(&[String]) -> bool,
{
    let mut dup = doc.clone();
    let mut path = Vec::new();
    forget_in_place(&mut dup, &mut path, &pred)?;
    Ok(dup)
}

fn forget_in_place(value: &mut Value, path: &mut Vec<String>, pred: &dyn Fn(&[String]) -> bool) -> Result<(), CryptoError> {
    match value {
        Value::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                path.push(i.to_string());
                forget_in_place(item, path, pred)?;
                path.pop();
            }
        }
        Value::Object(obj) => {
            forget_members(obj, path, pred)?;
            for (key, child) in obj.iter_mut() {
                if key.starts_with('$') {
                    continue;
                }
                path.push(key.clone());
                forget_in_place(child, path, pred)?;
                path.pop();
            }
        }
        _ => {}
    }
    Ok(())
}

fn forget_members(obj: &mut Map<String, Value>, path: &mut Vec<String>, pred: &dyn Fn(&[String]) -> bool) -> Result<(), CryptoError> {
    let Some(Value::Object(salts)) = obj.get(FORGETTABLE) else {
        return Ok(());
    };
    let selected: Vec<(String, Value)> = salts
        .iter()
        .filter(|(name, _)| {
            path.push((*name).clone());
            let hit = pred(path);
            path.pop();
            hit
        })
        .map(|(name, salt)| (name.clone(), salt.clone()))
        .collect();
    if selected.is_empty() {
        return Ok(());
    }

    for (name, salt) in selected {
        let already = obj
            .get(FORGOTTEN)
            .and_then(|f| f.get(&name))
            .is_some_and(|v| !v.is_null());
        if !already {
            let member = obj
                .get(&name)
                .ok_or_else(|| CryptoError::Forgettable(format!("field {name} is forgettable but absent")))?;
            let digest = forgotten_hash(member, &salt)?;
            let forgotten = obj
                .entry(FORGOTTEN)
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(f) = forgotten {
                f.insert(name.clone(), Value::String(digest));
            } else {
                return Err(CryptoError::Forgettable("$forgotten is not an object".into()));
            }
        }
        obj.remove(&name);
        if let Some(Value::Object(salts)) = obj.get_mut(FORGETTABLE) {
            salts.remove(&name);
        }
    }

    if obj.get(FORGETTABLE).and_then(Value::as_object).is_some_and(Map::is_empty) {
        obj.remove(FORGETTABLE);
    }
    Ok(())
}

fn forgotten_hash(member: &Value, salt: &Value) -> Result<String, CryptoError> {
    let mut ikm = canonical_json(&scrub(member)?).into_bytes();
    ikm.push(0);
    let mut salt_bytes = match salt {
        Value::String(s) => s.as_bytes().to_vec(),
        other => canonical_json(other).into_bytes(),
    };
    salt_bytes.push(0);
    let out = kdf(64, &ikm, &salt_bytes, &[])?;
    Ok(crockford::encode(&out))
}

/// Replace every `true` placeholder in a `$forgettable` map with a fresh
/// 32-byte random salt.
pub fn salt_forgettable(doc: &Value) -> Value {
    let mut dup = doc.clone();
    salt_in_place(&mut dup);
    dup
}

fn salt_in_place(value: &mut Value) {
    match value {
        Value::Array(items) => items.iter_mut().for_each(salt_in_place),
        Value::Object(obj) => {
            if let Some(Value::Object(salts)) = obj.get_mut(FORGETTABLE) {
                for salt in salts.values_mut() {
                    if *salt == Value::Bool(true) {
                        let mut bytes = [0u8; 32];
                        rand::rngs::OsRng.fill_bytes(&mut bytes);
                        *salt = Value::String(crockford::encode(&bytes));
                    }
                }
            }
            for (key, child) in obj.iter_mut() {
                if !key.starts_with('$') {
                    salt_in_place(child);
                }
            }
        }
        _ => {}
    }
}

fn is_field_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn is_safe_integer(n: &serde_json::Number) -> bool {
    if let Some(i) = n.as_i64() {
        return (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&i);
    }
    if n.is_u64() {
        return false;
    }
    n.as_f64()
        .is_some_and(|f| f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER as f64)
}

/// Check that a document is well formed with respect to forgettable
/// fields: plain field names only, safe integers only, every salt a string
/// naming a present field, every forgotten entry a 64-byte hash naming an
/// absent field whose salt has been removed.
pub fn validate_forgettable(doc: &Value) -> bool {
    match doc {
        Value::String(_) | Value::Bool(_) | Value::Null => true,
        Value::Number(n) => is_safe_integer(n),
        Value::Array(items) => items.iter().all(validate_forgettable),
        Value::Object(obj) => obj.iter().all(|(key, child)| match key.as_str() {
            FORGETTABLE => validate_salts(obj, child),
            FORGOTTEN => validate_forgotten(obj, child),
            k if is_field_name(k) => validate_forgettable(child),
            _ => false,
        }),
    }
}

fn validate_salts(obj: &Map<String, Value>, salts: &Value) -> bool {
    let Value::Object(salts) = salts else {
        return false;
    };
    salts
        .iter()
        .all(|(name, salt)| is_field_name(name) && obj.contains_key(name) && salt.is_string())
}

fn validate_forgotten(obj: &Map<String, Value>, forgotten: &Value) -> bool {
    let Value::Object(forgotten) = forgotten else {
        return false;
    };
    let salts = obj.get(FORGETTABLE).and_then(Value::as_object);
    forgotten.iter().all(|(name, digest)| {
        is_field_name(name)
            && !obj.contains_key(name)
            && salts.is_none_or(|s| !s.contains_key(name))
            && digest
                .as_str()
                .and_then(|d| crockford::decode(d).ok())
                .is_some_and(|bytes| bytes.len() == 64)
    })
}

/// Hash of a document after scrubbing all forgettable fields.
pub fn hash_contract_terms(doc: &Value) -> Result<String, CryptoError> {
    let mut bytes = canonical_json(&scrub(doc)?).into_bytes();
    bytes.push(0);
    Ok(crockford::encode(&hash(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn forget_path(doc: &Value, target: &str) -> Value {
        forget_all(doc, |p| p.join(".") == target).unwrap()
    }

    #[test]
    fn reference_vector() {
        let doc = json!({
            "k1": 1,
            "$forgettable": {"k1": "SALT"},
            "k2": {"n1": true, "$forgettable": {"n1": "salt"}},
            "k3": {"n1": "string"}
        });
        assert_eq!(
            hash_contract_terms(&doc).unwrap(),
            "VDE8JPX0AEEE3EX1K8E11RYEWSZQKGGZCV6BWTE4ST1C8711P7H850Z7F2Q2HSSYETX87ERC2JNHWB7GTDWTDWMM716VKPSRBXD7SRR"
        );
    }

    #[test]
    fn salting_replaces_placeholders() {
        let req = json!({"foo": 42, "bar": "hello", "$forgettable": {"foo": true}});
        let c1 = salt_forgettable(&req);
        let c2 = salt_forgettable(&req);
        assert!(req["$forgettable"]["foo"].is_boolean());
        assert!(c1["$forgettable"]["foo"].is_string());
        assert_ne!(c1["$forgettable"]["foo"], c2["$forgettable"]["foo"]);
    }

    #[test]
    fn scrub_keeps_hash() {
        let req = json!({"foo": 42, "bar": "hello", "$forgettable": {"foo": true}});
        let c1 = salt_forgettable(&req);
        let c3 = scrub(&c1).unwrap();
        assert!(c3.get("foo").is_none());
        assert_eq!(c3["bar"], "hello");
        assert!(c3.get("$forgettable").is_none());
        assert_eq!(hash_contract_terms(&c1).unwrap(), hash_contract_terms(&c3).unwrap());
    }

    #[test]
    fn nested_forgetting_order_is_irrelevant() {
        let req = json!({
            "foo": 42,
            "bar": {"prop1": "hello, world", "$forgettable": {"prop1": true}},
            "$forgettable": {"bar": true}
        });
        let c1 = salt_forgettable(&req);
        let c2 = forget_path(&c1, "bar");
        let c3 = forget_path(&forget_path(&c1, "bar.prop1"), "bar");
        let c4 = scrub(&c1).unwrap();

        let h1 = hash_contract_terms(&c1).unwrap();
        assert_eq!(h1, hash_contract_terms(&c2).unwrap());
        assert_eq!(h1, hash_contract_terms(&c3).unwrap());
        assert_eq!(h1, hash_contract_terms(&c4).unwrap());

        assert!(!validate_forgettable(&req));
        for doc in [&c1, &c2, &c3, &c4] {
            assert!(validate_forgettable(doc), "{doc}");
        }
    }

    #[test]
    fn forgetting_unrelated_path_is_noop() {
        let doc = salt_forgettable(&json!({"a": 1, "$forgettable": {"a": true}}));
        assert_eq!(forget_path(&doc, "b"), doc);
    }

    #[test]
    fn arrays_are_indexed_in_paths() {
        let doc = salt_forgettable(&json!({"items": [{"x": 1, "$forgettable": {"x": true}}]}));
        let forgotten = forget_path(&doc, "items.0.x");
        assert!(forgotten["items"][0].get("x").is_none());
        assert!(forgotten["items"][0]["$forgotten"]["x"].is_string());
    }

    #[test]
    fn missing_forgettable_field_errors() {
        let doc = json!({"$forgettable": {"gone": "salt"}});
        assert!(matches!(scrub(&doc), Err(CryptoError::Forgettable(_))));
    }

    #[test]
    fn validation_rules() {
        assert!(validate_forgettable(&json!({"a_1": [1, "x", null, true]})));
        assert!(!validate_forgettable(&json!({"bad-name": 1})));
        assert!(!validate_forgettable(&json!({"a": 0.5})));
        assert!(!validate_forgettable(&json!({"a": 9007199254740992i64})));
        assert!(!validate_forgettable(&json!({"$forgotten": {"a": "SHORT"}})));
        assert!(!validate_forgettable(&json!({"$forgettable": {"a": "salt"}})));
        assert!(!validate_forgettable(&json!({"$other": {}})));
    }
}
