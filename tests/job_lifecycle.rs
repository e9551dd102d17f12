use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use docjobs::{
    api,
    index::{
        BuildOutcome, BuildRequest, Document, IndexError, IndexMode, IndexStats, Indexer,
        MarkdownLoader, UpdateSummary,
    },
    jobs::{
        Collaborators, ErrorStage, JobDetails, JobService, JobSettings, JobStatus, JobsApi, Stage,
        StageState, Upload,
    },
    preprocess::{PreprocessError, PreprocessOutput, Preprocessor},
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

/// Converter that always fails, standing in for an unreadable PDF.
struct BrokenConverter;

#[async_trait]
impl Preprocessor for BrokenConverter {
    async fn convert(
        &self,
        _input: &Path,
        _output_dir: &Path,
    ) -> Result<PreprocessOutput, PreprocessError> {
        Err(PreprocessError::Failed {
            code: 1,
            stderr: "no text layer".into(),
        })
    }
}

/// Converter that takes a while before producing `<stem>.md`.
struct SlowConverter(Duration);

#[async_trait]
impl Preprocessor for SlowConverter {
    async fn convert(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<PreprocessOutput, PreprocessError> {
        tokio::time::sleep(self.0).await;
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        Ok(PreprocessOutput {
            output_path: output_dir.join(format!("{stem}.md")),
        })
    }
}

/// Indexer that sleeps per file and fails for files whose name contains `poison`.
#[derive(Default)]
struct RecordingIndexer {
    delay: Duration,
    builds: Mutex<Vec<PathBuf>>,
    updated: Mutex<Vec<Document>>,
}

#[async_trait]
impl Indexer for RecordingIndexer {
    async fn build(&self, request: BuildRequest) -> Result<BuildOutcome, IndexError> {
        tokio::time::sleep(self.delay).await;
        let files = request.files.clone();
        self.builds
            .lock()
            .expect("builds lock")
            .extend(files.iter().cloned());
        if files
            .iter()
            .any(|file| file.to_string_lossy().contains("poison"))
        {
            return Err(IndexError::Task("embedding backend rejected chunk".into()));
        }
        let total = self.builds.lock().expect("builds lock").len();
        Ok(BuildOutcome {
            documents_processed: files.len(),
            total_document_count: total,
            mode: IndexMode::Incremental,
        })
    }

    async fn update(&self, documents: Vec<Document>) -> Result<UpdateSummary, IndexError> {
        let checked = documents.len();
        self.updated.lock().expect("updated lock").extend(documents);
        Ok(UpdateSummary {
            success: true,
            mode: IndexMode::Incremental,
            documents_checked: checked,
            documents_added: checked,
            message: format!("Added {checked} new documents to the index"),
        })
    }

    async fn stats(&self) -> Result<IndexStats, IndexError> {
        let builds = self.builds.lock().expect("builds lock").len() as u64;
        Ok(IndexStats {
            collection: "lifecycle".into(),
            exists: true,
            status: Some("green".into()),
            points_count: builds,
            indexed_vectors_count: builds,
            vector_size: 8,
        })
    }
}

struct Fixture {
    base: PathBuf,
    settings: JobSettings,
    indexer: Arc<RecordingIndexer>,
    service: Arc<JobService>,
}

impl Fixture {
    fn new(indexer: RecordingIndexer) -> Self {
        Self::with(Arc::new(BrokenConverter), indexer, 4)
    }

    fn with(
        preprocessor: Arc<dyn Preprocessor>,
        indexer: RecordingIndexer,
        max_concurrent_jobs: usize,
    ) -> Self {
        let base = std::env::temp_dir().join(format!("docjobs-lifecycle-{}", Uuid::new_v4()));
        let settings = JobSettings {
            documents_root: base.join("documents"),
            processed_root: base.join("processed_docs"),
            max_concurrent_jobs,
        };
        let indexer = Arc::new(indexer);
        let service = Arc::new(JobService::new(
            settings.clone(),
            Collaborators {
                preprocessor,
                loader: Arc::new(MarkdownLoader),
                indexer: indexer.clone(),
            },
        ));
        Self {
            base,
            settings,
            indexer,
            service,
        }
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.base).ok();
    }
}

fn markdown(filename: &str, label: Option<&str>) -> Upload {
    Upload {
        filename: filename.into(),
        label: label.map(str::to_string),
        bytes: format!("# {filename}\n\nSome body text.").into_bytes(),
    }
}

#[tokio::test]
async fn markdown_upload_completes_without_preprocessing() {
    let fixture = Fixture::new(RecordingIndexer::default());
    let submission = fixture
        .service
        .submit_ingestion(markdown("handbook.md", Some("hr")))
        .await
        .expect("accepted");
    let job_id = submission.receipt.job_id;
    submission.handle.wait().await;

    let record = fixture.service.ingestion_status(&job_id).expect("record");
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress.get(Stage::Preprocessing), Some(StageState::Skipped));
    assert_eq!(record.progress.get(Stage::Indexing), Some(StageState::Completed));
    assert!(record.errors.is_empty());
    assert!(record.completed_at.is_some());

    let JobDetails::Ingestion(details) = &record.details else {
        panic!("ingestion details expected");
    };
    assert_eq!(details.label, "hr");
    assert_eq!(details.doc_count, Some(1));
    assert_eq!(
        fixture.indexer.builds.lock().expect("builds")[0],
        fixture.settings.processed_root.join("hr").join("handbook.md")
    );
}

#[tokio::test]
async fn markdown_is_skipped_while_waiting_for_a_slot() {
    let fixture = Fixture::with(
        Arc::new(SlowConverter(Duration::from_millis(500))),
        RecordingIndexer::default(),
        1,
    );
    let pdf = fixture
        .service
        .submit_ingestion(Upload {
            filename: "slow.pdf".into(),
            label: None,
            bytes: b"%PDF-1.7".to_vec(),
        })
        .await
        .expect("accepted");
    let pdf_id = pdf.receipt.job_id;
    for _ in 0..100 {
        let record = fixture.service.ingestion_status(&pdf_id).expect("record");
        if record.status == JobStatus::Preprocessing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let queued = fixture
        .service
        .submit_ingestion(markdown("queued.md", None))
        .await
        .expect("accepted");
    let queued_id = queued.receipt.job_id;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let waiting = fixture.service.ingestion_status(&queued_id).expect("record");
    assert_eq!(waiting.status, JobStatus::Pending);
    assert_eq!(
        waiting.progress.get(Stage::Preprocessing),
        Some(StageState::Skipped)
    );
    assert_eq!(waiting.progress.get(Stage::Indexing), None);

    pdf.handle.wait().await;
    queued.handle.wait().await;
    let done = fixture.service.ingestion_status(&queued_id).expect("record");
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress.get(Stage::Preprocessing), Some(StageState::Skipped));
    assert_eq!(done.progress.get(Stage::Indexing), Some(StageState::Completed));
}

#[tokio::test]
async fn failed_pdf_conversion_leaves_indexing_unset() {
    let fixture = Fixture::new(RecordingIndexer::default());
    let submission = fixture
        .service
        .submit_ingestion(Upload {
            filename: "scan.pdf".into(),
            label: None,
            bytes: b"%PDF-1.7".to_vec(),
        })
        .await
        .expect("accepted");
    let job_id = submission.receipt.job_id;
    submission.handle.wait().await;

    let record = fixture.service.ingestion_status(&job_id).expect("record");
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.progress.get(Stage::Preprocessing), Some(StageState::Failed));
    assert_eq!(record.progress.get(Stage::Indexing), None);
    assert_eq!(record.errors.len(), 1);
    assert_eq!(record.errors[0].stage, ErrorStage::Preprocessing);
    assert!(record.errors[0].message.contains("no text layer"));
    assert!(fixture.indexer.builds.lock().expect("builds").is_empty());

    let metrics = fixture.service.metrics_snapshot();
    assert_eq!(metrics.jobs_failed, 1);
    assert_eq!(metrics.jobs_active, 0);
}

#[tokio::test]
async fn concurrent_jobs_do_not_affect_each_other() {
    let fixture = Fixture::new(RecordingIndexer {
        delay: Duration::from_millis(20),
        ..Default::default()
    });

    let mut submissions = Vec::new();
    for name in ["alpha.md", "poison.md", "gamma.md"] {
        submissions.push(
            fixture
                .service
                .submit_ingestion(markdown(name, None))
                .await
                .expect("accepted"),
        );
    }
    let ids: Vec<_> = submissions.iter().map(|s| s.receipt.job_id).collect();
    for submission in submissions {
        submission.handle.wait().await;
    }

    let statuses: Vec<_> = ids
        .iter()
        .map(|id| fixture.service.ingestion_status(id).expect("record"))
        .collect();
    assert_eq!(statuses[0].status, JobStatus::Completed);
    assert_eq!(statuses[1].status, JobStatus::Failed);
    assert_eq!(statuses[1].errors[0].stage, ErrorStage::Indexing);
    assert_eq!(statuses[2].status, JobStatus::Completed);
    assert!(statuses[0].errors.is_empty());
    assert!(statuses[2].errors.is_empty());

    let metrics = fixture.service.metrics_snapshot();
    assert_eq!(metrics.ingestion_submitted, 3);
    assert_eq!(metrics.jobs_completed, 2);
    assert_eq!(metrics.jobs_failed, 1);
}

#[tokio::test]
async fn update_without_documents_completes_as_skipped() {
    let fixture = Fixture::new(RecordingIndexer::default());
    let submission = fixture.service.submit_update();
    let job_id = submission.receipt.job_id;
    submission.handle.wait().await;

    let record = fixture.service.update_status(&job_id).expect("record");
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress.get(Stage::Loading), Some(StageState::Completed));
    assert_eq!(record.progress.get(Stage::Updating), Some(StageState::Skipped));
    let JobDetails::Update(details) = &record.details else {
        panic!("update details expected");
    };
    assert_eq!(details.documents_loaded, 0);
    assert_eq!(
        details.result.as_ref().map(|result| result.mode),
        Some(IndexMode::Skipped)
    );
}

#[tokio::test]
async fn update_enriches_uploaded_documents_with_labels() {
    let fixture = Fixture::new(RecordingIndexer::default());
    for (name, label) in [("a.md", Some("legal")), ("b.md", None)] {
        let submission = fixture
            .service
            .submit_ingestion(markdown(name, label))
            .await
            .expect("accepted");
        submission.handle.wait().await;
    }

    let submission = fixture.service.submit_update();
    let job_id = submission.receipt.job_id;
    submission.handle.wait().await;

    let record = fixture.service.update_status(&job_id).expect("record");
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress.get(Stage::Updating), Some(StageState::Completed));

    let updated = fixture.indexer.updated.lock().expect("updated");
    let mut labels: Vec<_> = updated
        .iter()
        .map(|doc| doc.metadata.label.clone().unwrap_or_default())
        .collect();
    labels.sort();
    assert_eq!(labels, vec!["general".to_string(), "legal".to_string()]);
    assert!(updated.iter().all(|doc| doc.metadata.doc_hash.is_some()));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let fixture = Fixture::new(RecordingIndexer::default());
    let id = Uuid::new_v4();
    assert!(fixture.service.ingestion_status(&id).is_none());
    assert!(fixture.service.update_status(&id).is_none());
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn upload_over_http_can_be_polled_to_completion() {
    let fixture = Fixture::new(RecordingIndexer::default());
    let app = api::create_router(fixture.service.clone());

    let boundary = "lifecycle-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"guide.md\"\r\n\r\n# Guide\r\n--{boundary}\r\nContent-Disposition: form-data; name=\"label\"\r\n\r\nops\r\n--{boundary}--\r\n"
    );
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/upload")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("upload response");
    assert_eq!(response.status(), StatusCode::OK);
    let accepted = json_body(response).await;
    let status_url = accepted["status_url"]
        .as_str()
        .expect("status url")
        .to_string();

    let mut last = Value::Null;
    for _ in 0..200 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(&status_url)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("status response");
        assert_eq!(response.status(), StatusCode::OK);
        last = json_body(response).await;
        if last["status"] == "completed" || last["status"] == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(last["success"], true);
    assert_eq!(last["status"], "completed");
    assert_eq!(last["kind"], "ingestion");
    assert_eq!(last["label"], "ops");
    assert_eq!(last["progress"]["preprocessing"], "skipped");
    assert_eq!(last["progress"]["indexing"], "completed");
    assert_eq!(last["errors"], Value::Array(Vec::new()));

    let update_path = status_url.replace("/api/upload/status", "/api/update_index/status");
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(update_path)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("status response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/stats")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("stats response");
    assert_eq!(response.status(), StatusCode::OK);
    let stats = json_body(response).await;
    assert_eq!(stats["stats"]["vector_store"]["points_count"], 1);
}
