//! Ingestion pipeline: `pending → (preprocessing)? → indexing → {completed | failed}`.

use std::path::PathBuf;
use std::sync::Arc;

use super::pipeline::{JobContext, PipelineError, guarded};
use super::registry::JobRegistry;
use super::types::{JobId, Stage};
use super::validate::FileType;
use crate::index::{BuildRequest, Indexer};
use crate::metrics::JobMetrics;
use crate::preprocess::Preprocessor;

/// Stored upload handed to the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionRequest {
    /// Where the upload was written.
    pub file_path: PathBuf,
    /// Detected type of the upload.
    pub file_type: FileType,
    /// Partition label.
    pub label: String,
}

/// Runs ingestion jobs against the preprocessor and indexer.
#[derive(Clone)]
pub struct IngestionPipeline {
    registry: Arc<JobRegistry>,
    metrics: Arc<JobMetrics>,
    preprocessor: Arc<dyn Preprocessor>,
    indexer: Arc<dyn Indexer>,
    processed_root: PathBuf,
}

impl IngestionPipeline {
    /// Pipeline writing converted documents below `processed_root`.
    pub fn new(
        registry: Arc<JobRegistry>,
        metrics: Arc<JobMetrics>,
        preprocessor: Arc<dyn Preprocessor>,
        indexer: Arc<dyn Indexer>,
        processed_root: PathBuf,
    ) -> Self {
        Self {
            registry,
            metrics,
            preprocessor,
            indexer,
            processed_root,
        }
    }

    /// Drive job `job_id` to a terminal status. Never returns an error: every failure ends up
    /// in the job record.
    pub async fn run(&self, job_id: JobId, request: IngestionRequest) {
        let ctx = JobContext {
            registry: Arc::clone(&self.registry),
            metrics: Arc::clone(&self.metrics),
            job_id,
        };
        ctx.run_contained(self.execute(&ctx, request)).await;
    }

    async fn execute(&self, ctx: &JobContext, request: IngestionRequest) -> Result<(), PipelineError> {
        let index_input = if request.file_type.needs_preprocessing() {
            self.preprocess(ctx, &request).await?
        } else {
            // Submission normally marks the stage skipped before the job is queued.
            ctx.update(|record| match record.progress.get(Stage::Preprocessing) {
                None => record.skip_stage(Stage::Preprocessing),
                Some(_) => Ok(()),
            })?;
            tracing::debug!(job_id = %ctx.job_id, "Markdown upload; preprocessing skipped");
            request.file_path.clone()
        };

        ctx.update(|record| record.begin_stage(Stage::Indexing, "Building index"))?;
        tracing::info!(job_id = %ctx.job_id, file = %index_input.display(), "Indexing document");
        let build = BuildRequest {
            directory: self.processed_root.clone(),
            files: vec![index_input],
            incremental: true,
            dedupe: true,
        };
        let outcome = guarded(self.indexer.build(build))
            .await
            .map_err(PipelineError::Indexing)?;

        ctx.update(|record| {
            record.record_build(&outcome)?;
            record.complete_stage(Stage::Indexing)?;
            record.complete("Completed")
        })?;
        tracing::info!(
            job_id = %ctx.job_id,
            documents = outcome.documents_processed,
            total = outcome.total_document_count,
            mode = ?outcome.mode,
            "Ingestion job completed"
        );
        Ok(())
    }

    async fn preprocess(
        &self,
        ctx: &JobContext,
        request: &IngestionRequest,
    ) -> Result<PathBuf, PipelineError> {
        ctx.update(|record| record.begin_stage(Stage::Preprocessing, "Converting document"))?;
        let output_dir = self.processed_root.join(&request.label);
        tracing::info!(
            job_id = %ctx.job_id,
            input = %request.file_path.display(),
            output_dir = %output_dir.display(),
            "Preprocessing document"
        );

        let output = guarded(self.preprocessor.convert(&request.file_path, &output_dir))
            .await
            .map_err(PipelineError::Preprocessing)?;

        ctx.update(|record| {
            record.record_preprocessed(output.output_path.display().to_string())?;
            record.complete_stage(Stage::Preprocessing)
        })?;
        Ok(output.output_path)
    }
}
