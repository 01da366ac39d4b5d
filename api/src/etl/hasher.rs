use serde_json::Value;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 over the canonical JSON serialization (compact
/// separators, sorted keys, non-ASCII preserved).
pub fn content_hash(canonical: &Value) -> String {
    let stable = canonical.to_string();
    hex::encode(Sha256::digest(stable.as_bytes()))
}
