use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Fields stripped from the request body before computing the params
/// fingerprint. `prompt`/`text`/`model`/`cache`/`repair` are identity
/// fields, not generation parameters.
const IDENTITY_FIELDS: &[&str] = &["prompt", "text", "model", "cache", "repair"];

fn hex_prefix_32(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(32);
    for b in &bytes[..16] {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// `prompt_hash` for `/v1/generate`: hash of the raw prompt bytes.
pub fn prompt_hash(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    hex_prefix_32(&digest)
}

/// `prompt_hash` for `/v1/extract`: hash of `schema_id + "\n" + text`.
pub fn prompt_hash_extract(schema_id: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(schema_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(text.as_bytes());
    hex_prefix_32(&hasher.finalize())
}

/// Canonicalizes a request body into the params object used for
/// fingerprinting: identity fields removed, null-valued fields dropped,
/// keys sorted. `serde_json::Value::Object` already iterates in sorted
/// key order when built from a `BTreeMap`-backed `Map`, so we rebuild into
/// one explicitly rather than relying on insertion order.
pub fn canonicalize_params(body: &Value) -> Value {
    let obj = match body.as_object() {
        Some(o) => o,
        None => return Value::Object(Map::new()),
    };

    let mut sorted: std::collections::BTreeMap<String, Value> = std::collections::BTreeMap::new();
    for (k, v) in obj {
        if IDENTITY_FIELDS.contains(&k.as_str()) {
            continue;
        }
        if v.is_null() {
            continue;
        }
        sorted.insert(k.clone(), v.clone());
    }

    let mut map = Map::new();
    for (k, v) in sorted {
        map.insert(k, v);
    }
    Value::Object(map)
}

/// `params_fp`: hash of the canonical JSON serialization of
/// `canonicalize_params(body)`.
pub fn params_fingerprint(body: &Value) -> String {
    let canonical = canonicalize_params(body);
    let serialized = serde_json::to_vec(&canonical).expect("canonical value always serializes");
    let digest = Sha256::digest(&serialized);
    hex_prefix_32(&digest)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Generate,
    Extract,
}

impl CacheKind {
    fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Generate => "cache",
            CacheKind::Extract => "extract",
        }
    }
}

/// `llm:<kind>:<model_id>:<prompt_hash>:<params_fp>`.
pub fn redis_key(kind: CacheKind, model_id: &str, prompt_hash: &str, params_fp: &str) -> String {
    format!("llm:{}:{}:{}:{}", kind.as_str(), model_id, prompt_hash, params_fp)
}
