//! Shared types used by the Qdrant client and helpers.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Document-level fields copied into every chunk payload.
#[derive(Debug, Clone, Default)]
pub struct DocumentPayload {
    /// SHA-256 of the full document text.
    pub doc_hash: String,
    /// File name without directories.
    pub file_name: String,
    /// Source path of the document.
    pub file_path: String,
    /// Partition label.
    pub label: String,
}

/// Embedded chunk ready for upsert.
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    /// Chunk text.
    pub text: String,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
    /// Embedding vector produced for the chunk.
    pub vector: Vec<f32>,
}

/// Collection state as reported by `GET /collections/{name}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CollectionInfo {
    /// Optimizer health (`green`, `yellow`, `grey`, `red`).
    #[serde(default)]
    pub status: String,
    /// Points stored in the collection.
    #[serde(default)]
    pub points_count: Option<u64>,
    /// Points whose vectors are already indexed.
    #[serde(default)]
    pub indexed_vectors_count: Option<u64>,
    /// Storage segments backing the collection.
    #[serde(default)]
    pub segments_count: Option<u64>,
}

#[derive(Deserialize)]
pub(crate) struct CollectionInfoResponse {
    pub(crate) result: CollectionInfo,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResponse {
    pub(crate) result: ScrollResult,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResult {
    #[serde(default)]
    pub(crate) points: Vec<ScrollPoint>,
    #[serde(default)]
    pub(crate) next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollPoint {
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
