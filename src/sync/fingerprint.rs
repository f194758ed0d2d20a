//! Content fingerprints of catalog entities.
//!
//! An entity is projected to JSON, written out in canonical form (object keys
//! in lexicographic order, no whitespace) and hashed with SHA-256. The digest
//! is truncated to 128 bits and rendered as 32 lowercase hex characters.
//!
//! Fields marked `#[serde(skip)]` on the models, like the stored hash itself,
//! never contribute.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write;
use tracing::error;

const FINGERPRINT_BYTES: usize = 16;

/// Fingerprint of `entity`'s serialized fields.
///
/// Catalog models only have string-keyed fields and plain values, so
/// projecting them to JSON cannot fail. If it ever does, the error is logged
/// and the entity hashes as `null`.
pub fn content_hash<T: Serialize + ?Sized>(entity: &T) -> String {
    let value = match serde_json::to_value(entity) {
        Ok(value) => value,
        Err(e) => {
            error!("Entity cannot be fingerprinted: {}", e);
            debug_assert!(false, "entity cannot be fingerprinted: {}", e);
            Value::Null
        }
    };
    let mut canonical = String::new();
    write_canonical(&value, &mut canonical);

    let digest = Sha256::digest(canonical.as_bytes());
    let mut hex = String::with_capacity(FINGERPRINT_BYTES * 2);
    for byte in &digest[..FINGERPRINT_BYTES] {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, field)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
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
