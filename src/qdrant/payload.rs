//! Helpers for constructing and hashing Qdrant payloads.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::qdrant::types::DocumentPayload;

/// Build the payload stored alongside one chunk of a document.
pub(crate) fn build_payload(
    document: &DocumentPayload,
    chunk_index: usize,
    text: &str,
    timestamp_rfc3339: &str,
) -> Value {
    let mut payload = Map::new();
    payload.insert("doc_hash".into(), Value::String(document.doc_hash.clone()));
    payload.insert("file_name".into(), Value::String(document.file_name.clone()));
    payload.insert("file_path".into(), Value::String(document.file_path.clone()));
    payload.insert("label".into(), Value::String(document.label.clone()));
    payload.insert("chunk_index".into(), Value::from(chunk_index));
    payload.insert("text".into(), Value::String(text.to_string()));
    payload.insert(
        "timestamp".into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    Value::Object(payload)
}

/// Compute a deterministic SHA-256 hash of document text.
pub fn compute_content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
