//! Qdrant vector store integration.

pub mod client;
pub mod payload;
/// Streaming helpers for Qdrant scroll pagination.
pub mod scroller;
pub mod types;

pub use client::QdrantService;
pub use payload::compute_content_hash;
pub use types::{ChunkPoint, CollectionInfo, DocumentPayload, QdrantError};
