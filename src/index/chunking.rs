//! Token-bounded splitting of document text before embedding.
//!
//! Chunk boundaries come from `semchunk-rs`. Token counting prefers a `tiktoken-rs` encoding for
//! the configured model and falls back to whitespace counting when the model is unknown to the
//! tokenizer, which is the common case for local Ollama models.

use std::sync::Arc;

use semchunk_rs::Chunker;
use thiserror::Error;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model};

use crate::config::EmbeddingProvider;

/// Token budget used when no override is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Errors produced while splitting text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// A zero token budget was configured.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Splits documents into chunks no larger than a fixed token budget.
#[derive(Clone)]
pub(crate) struct TextSplitter {
    chunk_size: usize,
    counter: TokenCounter,
}

impl TextSplitter {
    /// Build a splitter for the given provider/model. `chunk_size` falls back to
    /// [`DEFAULT_CHUNK_SIZE`] when `None`.
    pub(crate) fn new(
        chunk_size: Option<usize>,
        provider: EmbeddingProvider,
        model: &str,
    ) -> Result<Self, ChunkingError> {
        let chunk_size = chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            counter: build_token_counter(provider, model),
        })
    }

    /// Split `text` into chunks. Whitespace-only input yields no chunks.
    pub(crate) fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let counter = self.counter.clone();
        let chunker = Chunker::new(
            self.chunk_size,
            Box::new(move |segment: &str| counter.as_ref()(segment)),
        );
        chunker
            .chunk(text)
            .into_iter()
            .filter(|chunk| !chunk.trim().is_empty())
            .collect()
    }

    #[cfg(test)]
    fn count(&self, text: &str) -> usize {
        self.counter.as_ref()(text)
    }
}

fn build_token_counter(provider: EmbeddingProvider, model: &str) -> TokenCounter {
    let encoding = match provider {
        EmbeddingProvider::Ollama => get_bpe_from_model(model.trim()).ok(),
        EmbeddingProvider::Local => None,
    };
    match encoding.map(Ok).unwrap_or_else(cl100k_encoding) {
        Ok(encoding) => {
            let encoding = Arc::new(encoding);
            Arc::new(move |segment: &str| encoding.encode_ordinary(segment).len())
        }
        Err(error) => {
            tracing::warn!(
                model,
                error = %error,
                "Tokenizer unavailable; falling back to whitespace counter"
            );
            whitespace_counter()
        }
    }
}

fn cl100k_encoding() -> Result<CoreBPE, anyhow::Error> {
    cl100k_base()
}

fn whitespace_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}
