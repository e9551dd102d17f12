//! Document index collaborators consumed by the job pipelines.
//!
//! The pipelines only see the [`DocumentLoader`] and [`Indexer`] traits. [`MarkdownLoader`] and
//! [`VectorIndexer`] are the production implementations backed by the processed-documents tree
//! and a Qdrant collection.

mod chunking;
mod loader;
mod vector;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::embedding::EmbeddingClientError;
use crate::qdrant::QdrantError;

pub use chunking::{ChunkingError, DEFAULT_CHUNK_SIZE};
pub use loader::{MarkdownLoader, enrich_metadata};
pub(crate) use loader::label_for;
pub use vector::VectorIndexer;

/// Errors raised by loaders and indexers.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Filesystem access failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being read or walked.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// A requested input file does not exist.
    #[error("Input file not found: {0}")]
    MissingInput(PathBuf),
    /// Chunking step failed to segment a document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Qdrant interaction failed.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// Embedding provider returned vectors of the wrong size.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured for the collection.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
    /// Blocking task running file I/O was cancelled or panicked.
    #[error("Background task failed: {0}")]
    Task(String),
}

/// Metadata carried by a loaded document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// Absolute or root-relative path of the source file.
    pub file_path: PathBuf,
    /// File name without directories.
    pub file_name: String,
    /// Path relative to the processed-documents root.
    pub relative_path: PathBuf,
    /// Partition label; filled by [`enrich_metadata`].
    pub label: Option<String>,
    /// SHA-256 of the document text; filled by [`enrich_metadata`].
    pub doc_hash: Option<String>,
}

/// Text document ready for indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Full document text.
    pub text: String,
    /// Source metadata.
    pub metadata: DocumentMetadata,
}

/// How the indexer merged documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    /// New documents were added to the existing index.
    Incremental,
    /// The index was recreated from scratch.
    Rebuild,
    /// Nothing was written.
    Skipped,
}

/// Build request issued by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Root the input files live under; labels derive from paths relative to it.
    pub directory: PathBuf,
    /// Files to merge into the index.
    pub files: Vec<PathBuf>,
    /// Keep existing entries instead of recreating the index.
    pub incremental: bool,
    /// Skip documents whose content hash is already indexed.
    pub dedupe: bool,
}

/// Counters reported after a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildOutcome {
    /// Documents written by this build.
    pub documents_processed: usize,
    /// Documents held by the index afterwards.
    pub total_document_count: usize,
    /// Merge mode that was applied.
    pub mode: IndexMode,
}

/// Result payload of an index update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    /// Whether the update succeeded.
    pub success: bool,
    /// Merge mode that was applied.
    pub mode: IndexMode,
    /// Documents considered.
    pub documents_checked: usize,
    /// Documents newly written.
    pub documents_added: usize,
    /// Human-readable description.
    pub message: String,
}

impl UpdateSummary {
    /// Summary for an update that found nothing to load.
    pub fn skipped() -> Self {
        Self {
            success: true,
            mode: IndexMode::Skipped,
            documents_checked: 0,
            documents_added: 0,
            message: "No documents found to update".into(),
        }
    }
}

/// Size and health of the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Collection backing the index.
    pub collection: String,
    /// Whether the collection exists yet.
    pub exists: bool,
    /// Optimizer health reported by the store, when the collection exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Stored chunk points.
    pub points_count: u64,
    /// Points whose vectors are already searchable through the index.
    pub indexed_vectors_count: u64,
    /// Embedding dimension of the collection.
    pub vector_size: usize,
}

/// Source of processed documents for index updates.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load every processed document under `directory`.
    async fn load_documents(&self, directory: &Path) -> Result<Vec<Document>, IndexError>;
}

/// Vector index build and update engine.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Merge the requested files into the index.
    async fn build(&self, request: BuildRequest) -> Result<BuildOutcome, IndexError>;

    /// Fill derived metadata (label, content hash) ahead of [`Indexer::update`].
    fn enrich_metadata(&self, documents: Vec<Document>, root: &Path) -> Vec<Document> {
        enrich_metadata(documents, root)
    }

    /// Add documents not yet present in the index.
    async fn update(&self, documents: Vec<Document>) -> Result<UpdateSummary, IndexError>;

    /// Current size and health of the index.
    async fn stats(&self) -> Result<IndexStats, IndexError>;
}
