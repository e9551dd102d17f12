//! Submission handling and status queries over the two job families.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use super::dispatch::{Dispatcher, JobHandle};
use super::ingestion::{IngestionPipeline, IngestionRequest};
use super::registry::JobRegistry;
use super::types::{JobDetails, JobId, JobKind, JobRecord, Stage};
use super::update::UpdatePipeline;
use super::validate::{FileType, ValidationError, normalize_label, sanitize_filename};
use crate::config::Config;
use crate::index::{DocumentLoader, IndexError, IndexStats, Indexer};
use crate::metrics::{JobMetrics, MetricsSnapshot};
use crate::preprocess::Preprocessor;

/// Path prefix of ingestion status URLs.
pub const INGESTION_STATUS_PATH: &str = "/api/upload/status";
/// Path prefix of update status URLs.
pub const UPDATE_STATUS_PATH: &str = "/api/update_index/status";

/// Rejected submission. No job exists when this is returned.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Upload failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Upload could not be written to disk.
    #[error("Failed to store upload at {path}: {source}")]
    Storage {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Raw upload as received from a client.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    /// Client-supplied file name.
    pub filename: String,
    /// Optional partition label.
    pub label: Option<String>,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// What a client needs to start polling a new job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    /// Identifier of the new job.
    pub job_id: JobId,
    /// Path of the status endpoint for this job.
    pub status_url: String,
    /// Stored file name (ingestion only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Detected file type (ingestion only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileType>,
    /// Applied label (ingestion only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Accepted submission together with the handle of its background execution.
#[derive(Debug)]
pub struct Submission {
    /// Client-facing details.
    pub receipt: SubmissionReceipt,
    /// Handle of the dispatched execution.
    pub handle: JobHandle,
}

/// Directory tree a stored document lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Storage {
    /// Raw uploads awaiting or after preprocessing.
    Documents,
    /// Markdown ready for indexing.
    ProcessedDocs,
}

/// Document found on disk by [`JobsApi::list_documents`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredDocument {
    /// File name.
    pub filename: String,
    /// Label derived from the first directory below the storage root.
    pub label: String,
    /// Path relative to the storage root.
    pub relative_path: String,
    /// Tree the file was found in.
    pub storage: Storage,
    /// File type.
    pub file_type: FileType,
    /// Size in bytes.
    pub size: u64,
    /// Modification time in seconds since the Unix epoch.
    pub modified: Option<u64>,
}

/// Directories and limits the job service runs with.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Root for raw uploads that need preprocessing.
    pub documents_root: PathBuf,
    /// Root for Markdown ready for indexing.
    pub processed_root: PathBuf,
    /// Upper bound on concurrently executing jobs.
    pub max_concurrent_jobs: usize,
}

impl From<&Config> for JobSettings {
    fn from(config: &Config) -> Self {
        Self {
            documents_root: config.documents_root.clone(),
            processed_root: config.processed_docs_root.clone(),
            max_concurrent_jobs: config.max_concurrent_jobs,
        }
    }
}

/// External engines the pipelines call into.
#[derive(Clone)]
pub struct Collaborators {
    /// Document-to-Markdown converter.
    pub preprocessor: Arc<dyn Preprocessor>,
    /// Source of processed documents for updates.
    pub loader: Arc<dyn DocumentLoader>,
    /// Vector index engine.
    pub indexer: Arc<dyn Indexer>,
}

/// Operations exposed to the HTTP layer.
#[async_trait]
pub trait JobsApi: Send + Sync {
    /// Validate and store an upload, then start an ingestion job.
    async fn submit_ingestion(&self, upload: Upload) -> Result<SubmissionReceipt, SubmitError>;

    /// Start an index update job.
    fn submit_update(&self) -> SubmissionReceipt;

    /// Current record of an ingestion job.
    fn ingestion_status(&self, job_id: &JobId) -> Option<JobRecord>;

    /// Current record of an update job.
    fn update_status(&self, job_id: &JobId) -> Option<JobRecord>;

    /// Uploaded and processed documents currently on disk.
    async fn list_documents(&self) -> Result<Vec<StoredDocument>, std::io::Error>;

    /// Job counters since startup.
    fn metrics_snapshot(&self) -> MetricsSnapshot;

    /// Size and health of the vector index.
    async fn index_stats(&self) -> Result<IndexStats, IndexError>;
}

/// Owns the registry and dispatcher and turns submissions into background jobs.
pub struct JobService {
    registry: Arc<JobRegistry>,
    metrics: Arc<JobMetrics>,
    dispatcher: Dispatcher,
    ingestion: IngestionPipeline,
    update: UpdatePipeline,
    indexer: Arc<dyn Indexer>,
    settings: JobSettings,
}

impl JobService {
    /// Wire the pipelines to the given collaborators.
    pub fn new(settings: JobSettings, collaborators: Collaborators) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let metrics = Arc::new(JobMetrics::new());
        let ingestion = IngestionPipeline::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            collaborators.preprocessor,
            Arc::clone(&collaborators.indexer),
            settings.processed_root.clone(),
        );
        let update = UpdatePipeline::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            collaborators.loader,
            Arc::clone(&collaborators.indexer),
            settings.processed_root.clone(),
        );
        Self {
            registry,
            metrics,
            dispatcher: Dispatcher::new(settings.max_concurrent_jobs),
            ingestion,
            update,
            indexer: collaborators.indexer,
            settings,
        }
    }

    /// Validate, store, register, and dispatch an upload.
    pub async fn submit_ingestion(&self, upload: Upload) -> Result<Submission, SubmitError> {
        let Upload {
            filename,
            label,
            bytes,
        } = upload;
        if filename.trim().is_empty() {
            return Err(ValidationError::MissingFilename.into());
        }
        let file_type = FileType::from_filename(filename.trim())?;
        let label = normalize_label(label.as_deref())?;
        let stored_name = sanitize_filename(&filename, file_type);

        let root = if file_type.needs_preprocessing() {
            &self.settings.documents_root
        } else {
            &self.settings.processed_root
        };
        let file_path = store(&root.join(&label), &stored_name, &bytes).await?;

        let job_id = self.registry.submit(JobDetails::ingestion(
            stored_name.clone(),
            file_type,
            label.clone(),
        ));
        if !file_type.needs_preprocessing() {
            self.mark_preprocessing_skipped(job_id);
        }
        self.metrics.record_submitted(JobKind::Ingestion);
        tracing::info!(
            job_id = %job_id,
            filename = %stored_name,
            file_type = %file_type,
            label = %label,
            size = bytes.len(),
            "Ingestion job submitted"
        );

        let pipeline = self.ingestion.clone();
        let request = IngestionRequest {
            file_path,
            file_type,
            label: label.clone(),
        };
        let handle = self
            .dispatcher
            .dispatch(job_id, async move { pipeline.run(job_id, request).await });

        Ok(Submission {
            receipt: SubmissionReceipt {
                job_id,
                status_url: format!("{INGESTION_STATUS_PATH}/{job_id}"),
                filename: Some(stored_name),
                file_type: Some(file_type),
                label: Some(label),
            },
            handle,
        })
    }

    /// Register and dispatch an index update.
    pub fn submit_update(&self) -> Submission {
        let job_id = self.registry.submit(JobDetails::update());
        self.metrics.record_submitted(JobKind::Update);
        tracing::info!(job_id = %job_id, "Index update job submitted");

        let pipeline = self.update.clone();
        let handle = self
            .dispatcher
            .dispatch(job_id, async move { pipeline.run(job_id).await });

        Submission {
            receipt: SubmissionReceipt {
                job_id,
                status_url: format!("{UPDATE_STATUS_PATH}/{job_id}"),
                filename: None,
                file_type: None,
                label: None,
            },
            handle,
        }
    }

    /// Record the skip up front so it is visible while the job waits for a dispatcher slot.
    fn mark_preprocessing_skipped(&self, job_id: JobId) {
        let outcome = self
            .registry
            .mutate(&job_id, |record| record.skip_stage(Stage::Preprocessing));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::warn!(job_id = %job_id, error = %error, "Could not mark preprocessing skipped");
            }
            Err(error) => {
                tracing::warn!(job_id = %job_id, error = %error, "Could not mark preprocessing skipped");
            }
        }
    }

    fn status_of(&self, job_id: &JobId, kind: JobKind) -> Option<JobRecord> {
        self.registry
            .get(job_id)
            .filter(|record| record.kind() == kind)
    }
}

#[async_trait]
impl JobsApi for JobService {
    async fn submit_ingestion(&self, upload: Upload) -> Result<SubmissionReceipt, SubmitError> {
        JobService::submit_ingestion(self, upload)
            .await
            .map(|submission| submission.receipt)
    }

    fn submit_update(&self) -> SubmissionReceipt {
        JobService::submit_update(self).receipt
    }

    fn ingestion_status(&self, job_id: &JobId) -> Option<JobRecord> {
        self.status_of(job_id, JobKind::Ingestion)
    }

    fn update_status(&self, job_id: &JobId) -> Option<JobRecord> {
        self.status_of(job_id, JobKind::Update)
    }

    async fn list_documents(&self) -> Result<Vec<StoredDocument>, std::io::Error> {
        let roots = [
            (self.settings.documents_root.clone(), Storage::Documents),
            (self.settings.processed_root.clone(), Storage::ProcessedDocs),
        ];
        tokio::task::spawn_blocking(move || {
            let mut documents = Vec::new();
            for (root, storage) in &roots {
                collect_documents(root, *storage, &mut documents)?;
            }
            Ok(documents)
        })
        .await
        .map_err(std::io::Error::other)?
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn index_stats(&self) -> Result<IndexStats, IndexError> {
        self.indexer.stats().await
    }
}

async fn store(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, SubmitError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| SubmitError::Storage {
            path: dir.to_path_buf(),
            source,
        })?;
    let path = dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|source| SubmitError::Storage {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

fn collect_documents(
    root: &Path,
    storage: Storage,
    out: &mut Vec<StoredDocument>,
) -> Result<(), std::io::Error> {
    if !root.exists() {
        return Ok(());
    }
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().into_owned();
        let Ok(file_type) = FileType::from_filename(&filename) else {
            continue;
        };
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let metadata = entry.metadata()?;
        out.push(StoredDocument {
            label: crate::index::label_for(relative),
            relative_path: relative.to_string_lossy().into_owned(),
            filename,
            storage,
            file_type,
            size: metadata.len(),
            modified: metadata
                .modified()
                .ok()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map(|elapsed| elapsed.as_secs()),
        });
    }
    Ok(())
}
