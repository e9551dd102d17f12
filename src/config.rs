use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DOCUMENTS_ROOT: &str = "./data/documents";
const DEFAULT_PROCESSED_DOCS_ROOT: &str = "./data/processed_docs";
const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;
const DEFAULT_PREPROCESSOR_COMMAND: &str = "mineru";
const DEFAULT_PREPROCESSOR_TIMEOUT_SECS: u64 = 1800;
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the job service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Directory receiving raw uploads that still need preprocessing.
    pub documents_root: PathBuf,
    /// Directory holding Markdown documents ready for indexing.
    pub processed_docs_root: PathBuf,
    /// Upper bound on jobs executing at the same time.
    pub max_concurrent_jobs: usize,
    /// Converter executable invoked for PDF preprocessing.
    pub preprocessor_command: String,
    /// Time allowed for a single conversion before it is killed.
    pub preprocessor_timeout: Duration,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection used for document storage.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Optional override for the chunk token budget.
    pub text_splitter_chunk_size: Option<usize>,
}

/// Supported embedding backends for the indexer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic in-process hashing embedder, useful offline.
    Local,
}

impl Config {
    /// Load `.env` (when present) and then read configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            qdrant_url = %config.qdrant_url,
            collection = %config.qdrant_collection_name,
            server_port = ?config.server_port,
            embedding_provider = ?config.embedding_provider,
            max_concurrent_jobs = config.max_concurrent_jobs,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ConfigError> {
            lookup_optional(&lookup, key).ok_or_else(|| ConfigError::MissingVariable(key.into()))
        };

        Ok(Self {
            server_port: parse_optional(&lookup, "SERVER_PORT")?,
            documents_root: lookup_optional(&lookup, "DOCUMENTS_ROOT")
                .unwrap_or_else(|| DEFAULT_DOCUMENTS_ROOT.into())
                .into(),
            processed_docs_root: lookup_optional(&lookup, "PROCESSED_DOCS_ROOT")
                .unwrap_or_else(|| DEFAULT_PROCESSED_DOCS_ROOT.into())
                .into(),
            max_concurrent_jobs: parse_optional(&lookup, "MAX_CONCURRENT_JOBS")?
                .unwrap_or(DEFAULT_MAX_CONCURRENT_JOBS)
                .max(1),
            preprocessor_command: lookup_optional(&lookup, "PREPROCESSOR_COMMAND")
                .unwrap_or_else(|| DEFAULT_PREPROCESSOR_COMMAND.into()),
            preprocessor_timeout: Duration::from_secs(
                parse_optional(&lookup, "PREPROCESSOR_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_PREPROCESSOR_TIMEOUT_SECS),
            ),
            qdrant_url: required("QDRANT_URL")?,
            qdrant_collection_name: required("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: lookup_optional(&lookup, "QDRANT_API_KEY"),
            embedding_provider: required("EMBEDDING_PROVIDER")?
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))?,
            embedding_model: required("EMBEDDING_MODEL")?,
            embedding_dimension: required("EMBEDDING_DIMENSION")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()))?,
            ollama_url: lookup_optional(&lookup, "OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.into()),
            text_splitter_chunk_size: parse_optional(&lookup, "TEXT_SPLITTER_CHUNK_SIZE")?,
        })
    }
}

fn lookup_optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|value| !value.trim().is_empty())
}

fn parse_optional<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup_optional(lookup, key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "local" => Ok(Self::Local),
            _ => Err(()),
        }
    }
}
