//! Qdrant-backed implementation of [`Indexer`].

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{pin_mut, stream::StreamExt};
use serde_json::json;

use super::chunking::TextSplitter;
use super::loader::{enrich_metadata, read_document};
use super::{
    BuildOutcome, BuildRequest, Document, IndexError, IndexMode, IndexStats, Indexer, UpdateSummary,
};
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::jobs::validate::DEFAULT_LABEL;
use crate::qdrant::scroller::stream_payloads;
use crate::qdrant::{ChunkPoint, DocumentPayload, QdrantService};

/// Indexes documents as embedded chunks in a Qdrant collection, deduplicated by content hash.
pub struct VectorIndexer {
    qdrant: QdrantService,
    embedder: Arc<dyn EmbeddingClient>,
    splitter: TextSplitter,
    collection: String,
    dimension: usize,
}

impl VectorIndexer {
    /// Build an indexer from configuration and an embedding client.
    pub fn new(config: &Config, embedder: Arc<dyn EmbeddingClient>) -> Result<Self, IndexError> {
        let qdrant = QdrantService::new(&config.qdrant_url, config.qdrant_api_key.clone())?;
        Ok(Self::with_service(
            qdrant,
            embedder,
            TextSplitter::new(
                config.text_splitter_chunk_size,
                config.embedding_provider,
                &config.embedding_model,
            )?,
            config.qdrant_collection_name.clone(),
            config.embedding_dimension,
        ))
    }

    pub(crate) fn with_service(
        qdrant: QdrantService,
        embedder: Arc<dyn EmbeddingClient>,
        splitter: TextSplitter,
        collection: String,
        dimension: usize,
    ) -> Self {
        Self {
            qdrant,
            embedder,
            splitter,
            collection,
            dimension,
        }
    }

    /// Make sure the collection and its payload indexes exist.
    pub async fn ensure_ready(&self) -> Result<(), IndexError> {
        self.qdrant
            .create_collection_if_not_exists(&self.collection, self.dimension as u64)
            .await?;
        self.qdrant.ensure_payload_indexes(&self.collection).await?;
        Ok(())
    }

    async fn recreate(&self) -> Result<(), IndexError> {
        self.qdrant.delete_collection(&self.collection).await?;
        self.qdrant
            .create_collection(&self.collection, self.dimension as u64)
            .await?;
        self.qdrant.ensure_payload_indexes(&self.collection).await?;
        Ok(())
    }

    async fn existing_hashes(&self) -> Result<HashSet<String>, IndexError> {
        let stream = stream_payloads(&self.qdrant, &self.collection, json!(["doc_hash"]));
        pin_mut!(stream);
        let mut hashes = HashSet::new();
        while let Some(payload) = stream.next().await {
            if let Some(hash) = payload?.get("doc_hash").and_then(|value| value.as_str()) {
                hashes.insert(hash.to_string());
            }
        }
        Ok(hashes)
    }

    /// Write documents whose hash is not in `known`, updating `known` as they land.
    async fn write_new(
        &self,
        documents: Vec<Document>,
        known: &mut HashSet<String>,
        dedupe: bool,
    ) -> Result<usize, IndexError> {
        let mut written = 0;
        for document in documents {
            let payload = payload_for(&document);
            if dedupe && known.contains(&payload.doc_hash) {
                tracing::debug!(file = %payload.file_name, "Skipping already indexed document");
                continue;
            }
            if self.index_document(&document.text, &payload).await? {
                known.insert(payload.doc_hash);
                written += 1;
            }
        }
        Ok(written)
    }

    /// Embed and upsert one document. Returns `false` when it produced no chunks.
    async fn index_document(
        &self,
        text: &str,
        payload: &DocumentPayload,
    ) -> Result<bool, IndexError> {
        let chunks = self.splitter.split(text);
        if chunks.is_empty() {
            tracing::warn!(file = %payload.file_name, "Document produced no chunks; not indexed");
            return Ok(false);
        }

        let vectors = self.embedder.generate_embeddings(chunks.clone()).await?;
        if let Some(actual) = vectors
            .iter()
            .map(Vec::len)
            .find(|len| *len != self.dimension)
        {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }

        let points = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(chunk_index, (text, vector))| ChunkPoint {
                text,
                chunk_index,
                vector,
            })
            .collect();
        let written = self
            .qdrant
            .upsert_chunks(&self.collection, payload, points)
            .await?;
        Ok(written > 0)
    }
}

fn payload_for(document: &Document) -> DocumentPayload {
    let metadata = &document.metadata;
    DocumentPayload {
        doc_hash: metadata
            .doc_hash
            .clone()
            .unwrap_or_else(|| crate::qdrant::compute_content_hash(&document.text)),
        file_name: metadata.file_name.clone(),
        file_path: metadata.relative_path.to_string_lossy().into_owned(),
        label: metadata
            .label
            .clone()
            .unwrap_or_else(|| DEFAULT_LABEL.to_string()),
    }
}

fn read_inputs(directory: &Path, files: &[std::path::PathBuf]) -> Result<Vec<Document>, IndexError> {
    files
        .iter()
        .map(|file| read_document(file, directory))
        .collect()
}

#[async_trait]
impl Indexer for VectorIndexer {
    async fn build(&self, request: BuildRequest) -> Result<BuildOutcome, IndexError> {
        let BuildRequest {
            directory,
            files,
            incremental,
            dedupe,
        } = request;
        let documents = {
            let directory = directory.clone();
            tokio::task::spawn_blocking(move || read_inputs(&directory, &files))
                .await
                .map_err(|err| IndexError::Task(err.to_string()))??
        };
        let documents = enrich_metadata(documents, &directory);

        let (mut known, mode) = if incremental {
            self.ensure_ready().await?;
            (self.existing_hashes().await?, IndexMode::Incremental)
        } else {
            self.recreate().await?;
            (HashSet::new(), IndexMode::Rebuild)
        };

        let documents_processed = self.write_new(documents, &mut known, dedupe).await?;
        tracing::info!(
            collection = %self.collection,
            documents_processed,
            total = known.len(),
            ?mode,
            "Index build finished"
        );
        Ok(BuildOutcome {
            documents_processed,
            total_document_count: known.len(),
            mode,
        })
    }

    async fn update(&self, documents: Vec<Document>) -> Result<UpdateSummary, IndexError> {
        let documents_checked = documents.len();
        self.ensure_ready().await?;
        let mut known = self.existing_hashes().await?;
        let documents_added = self.write_new(documents, &mut known, true).await?;

        let message = if documents_added == 0 {
            "Index already up to date".to_string()
        } else {
            format!("Added {documents_added} new documents to the index")
        };
        tracing::info!(
            collection = %self.collection,
            documents_checked,
            documents_added,
            "Index update finished"
        );
        Ok(UpdateSummary {
            success: true,
            mode: IndexMode::Incremental,
            documents_checked,
            documents_added,
            message,
        })
    }
    async fn stats(&self) -> Result<IndexStats, IndexError> {
        let info = self.qdrant.collection_info(&self.collection).await?;
        Ok(IndexStats {
            collection: self.collection.clone(),
            exists: info.is_some(),
            points_count: info
                .as_ref()
                .and_then(|info| info.points_count)
                .unwrap_or_default(),
            indexed_vectors_count: info
                .as_ref()
                .and_then(|info| info.indexed_vectors_count)
                .unwrap_or_default(),
            status: info.map(|info| info.status),
            vector_size: self.dimension,
        })
    }
}
