//! Index update pipeline: `pending → loading → updating → {completed | failed}`.

use std::path::PathBuf;
use std::sync::Arc;

use super::pipeline::{JobContext, PipelineError, guarded};
use super::registry::JobRegistry;
use super::types::{JobId, Stage};
use crate::index::{DocumentLoader, Indexer, UpdateSummary};
use crate::metrics::JobMetrics;

/// Runs index update jobs over the processed-documents tree.
#[derive(Clone)]
pub struct UpdatePipeline {
    registry: Arc<JobRegistry>,
    metrics: Arc<JobMetrics>,
    loader: Arc<dyn DocumentLoader>,
    indexer: Arc<dyn Indexer>,
    processed_root: PathBuf,
}

impl UpdatePipeline {
    /// Pipeline loading documents from `processed_root`.
    pub fn new(
        registry: Arc<JobRegistry>,
        metrics: Arc<JobMetrics>,
        loader: Arc<dyn DocumentLoader>,
        indexer: Arc<dyn Indexer>,
        processed_root: PathBuf,
    ) -> Self {
        Self {
            registry,
            metrics,
            loader,
            indexer,
            processed_root,
        }
    }

    /// Drive job `job_id` to a terminal status.
    pub async fn run(&self, job_id: JobId) {
        let ctx = JobContext {
            registry: Arc::clone(&self.registry),
            metrics: Arc::clone(&self.metrics),
            job_id,
        };
        ctx.run_contained(self.execute(&ctx)).await;
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), PipelineError> {
        ctx.update(|record| record.begin_stage(Stage::Loading, "Loading documents"))?;
        let documents = guarded(self.loader.load_documents(&self.processed_root))
            .await
            .map_err(PipelineError::Loading)?;
        let loaded = documents.len();
        ctx.update(|record| {
            record.record_documents_loaded(loaded)?;
            record.complete_stage(Stage::Loading)
        })?;
        tracing::info!(job_id = %ctx.job_id, documents = loaded, "Documents loaded");

        if documents.is_empty() {
            ctx.update(|record| {
                record.skip_stage(Stage::Updating)?;
                record.record_update(UpdateSummary::skipped())?;
                record.complete("No documents to update")
            })?;
            tracing::info!(job_id = %ctx.job_id, "No documents found; update skipped");
            return Ok(());
        }

        ctx.update(|record| record.begin_stage(Stage::Updating, "Updating index"))?;
        let root = self.processed_root.clone();
        let indexer = Arc::clone(&self.indexer);
        let summary = guarded(async move {
            let documents = indexer.enrich_metadata(documents, &root);
            indexer.update(documents).await
        })
        .await
        .map_err(PipelineError::Updating)?;

        tracing::info!(
            job_id = %ctx.job_id,
            checked = summary.documents_checked,
            added = summary.documents_added,
            "Index update completed"
        );
        ctx.update(|record| {
            record.record_update(summary)?;
            record.complete_stage(Stage::Updating)?;
            record.complete("Completed")
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexMode;
    use crate::jobs::testing::{Behavior, FakeIndexer, FakeLoader};
    use crate::jobs::types::{ErrorStage, JobDetails, JobRecord, JobStatus, StageState};

    async fn run(loader: FakeLoader, indexer: Arc<FakeIndexer>) -> JobRecord {
        let registry = Arc::new(JobRegistry::new());
        let pipeline = UpdatePipeline::new(
            Arc::clone(&registry),
            Arc::new(JobMetrics::new()),
            Arc::new(loader),
            indexer,
            PathBuf::from("/processed"),
        );
        let id = registry.submit(JobDetails::update());
        pipeline.run(id).await;
        registry.get(&id).expect("record")
    }

    fn details(record: &JobRecord) -> &crate::jobs::types::UpdateDetails {
        match &record.details {
            JobDetails::Update(details) => details,
            JobDetails::Ingestion(_) => panic!("update details expected"),
        }
    }

    #[tokio::test]
    async fn zero_documents_completes_as_skipped() {
        let indexer = Arc::new(FakeIndexer::new(Behavior::Succeed));
        let record = run(FakeLoader::with_documents(0), indexer.clone()).await;

        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.progress.get(Stage::Loading), Some(StageState::Completed));
        assert_eq!(record.progress.get(Stage::Updating), Some(StageState::Skipped));
        assert!(record.errors.is_empty());
        let result = details(&record).result.as_ref().expect("result");
        assert_eq!(result.mode, IndexMode::Skipped);
        assert_eq!(result.documents_added, 0);
        assert!(indexer.updated.lock().expect("updated").is_empty());
    }

    #[tokio::test]
    async fn loaded_documents_are_enriched_and_updated() {
        let indexer = Arc::new(FakeIndexer::new(Behavior::Succeed));
        let record = run(FakeLoader::with_documents(3), indexer.clone()).await;

        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.progress.get(Stage::Updating), Some(StageState::Completed));
        assert_eq!(details(&record).documents_loaded, 3);
        assert_eq!(details(&record).result.as_ref().map(|r| r.documents_added), Some(3));

        let updated = indexer.updated.lock().expect("updated");
        assert_eq!(updated.len(), 3);
        assert!(updated.iter().all(|doc| doc.metadata.label.as_deref() == Some("general")));
        assert!(updated.iter().all(|doc| doc.metadata.doc_hash.is_some()));
    }

    #[tokio::test]
    async fn loader_failure_fails_every_stage() {
        let record = run(
            FakeLoader::failing(),
            Arc::new(FakeIndexer::new(Behavior::Succeed)),
        )
        .await;

        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.errors.len(), 1);
        assert_eq!(record.errors[0].stage, ErrorStage::Loading);
        assert!(
            record
                .progress
                .iter()
                .all(|(_, state)| state == Some(StageState::Failed))
        );
    }

    #[tokio::test]
    async fn indexer_failure_and_panic_are_updating_errors() {
        for behavior in [Behavior::Fail, Behavior::Panic] {
            let record = run(
                FakeLoader::with_documents(2),
                Arc::new(FakeIndexer::new(behavior)),
            )
            .await;

            assert_eq!(record.status, JobStatus::Failed);
            assert_eq!(record.progress.get(Stage::Loading), Some(StageState::Completed));
            assert_eq!(record.progress.get(Stage::Updating), Some(StageState::Failed));
            assert_eq!(record.errors[0].stage, ErrorStage::Updating);
            assert!(details(&record).result.is_none());
        }
    }
}
