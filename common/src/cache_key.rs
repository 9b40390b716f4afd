use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Content address of a cached computation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// SHA-256 over the canonical JSON of `[provider, model, operation, input]`.
    pub fn derive(provider: &str, model: &str, operation: &str, input: &Value) -> Self {
        let material = Value::Array(vec![
            Value::String(provider.to_string()),
            Value::String(model.to_string()),
            Value::String(operation.to_string()),
            canonicalize(input),
        ]);
        let digest = Sha256::digest(material.to_string().as_bytes());
        CacheKey(hex::encode(digest))
    }

    pub fn from_hex(hex: impl Into<String>) -> Self {
        CacheKey(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recursively sort object keys. Maps preserve insertion order in this
/// workspace, so two equal objects built in different orders would otherwise
/// serialize differently.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
