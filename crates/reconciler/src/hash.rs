//! SHA-256 fingerprints of declared specs for drift detection.
//!
//! The payload is canonicalized before hashing: valid JSON is re-serialized
//! with sorted object keys and no whitespace, so reformatting the user's JSON
//! does not look like drift. Text that is not JSON is hashed as-is.

use std::fmt::{self, Write};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::DeclaredSpec;

/// Hex digest of a declared spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecHash(String);

impl SpecHash {
    /// Get the digest as a hex string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpecHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash a declared spec: kind tag, identifying fields and canonical payload.
pub fn spec_hash(spec: &DeclaredSpec) -> SpecHash {
    let payload = canonical_payload(&spec.json_spec);
    let mut hasher = Sha256::new();
    for field in [
        spec.kind.as_str(),
        spec.key.namespace.as_str(),
        spec.key.name.as_str(),
        payload.as_str(),
    ] {
        // Length prefix keeps ("ab", "c") and ("a", "bc") apart.
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    SpecHash(to_hex(&hasher.finalize()))
}

/// Canonical text form of a payload.
pub fn canonical_payload(payload: &str) -> String {
    serde_json::from_str::<Value>(payload)
        .map(|value| sort_keys(value).to_string())
        .unwrap_or_else(|_| payload.to_string())
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .sorted_by(|(a, _), (b, _)| a.cmp(b))
                .map(|(k, v)| (k, sort_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}
