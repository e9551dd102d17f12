//! HTTP surface for the document job service.
//!
//! - `POST /api/upload` – multipart upload (`file`, optional `label`); starts an ingestion job and
//!   returns its `job_id` and `status_url` immediately.
//! - `GET /api/upload/status/:job_id` – current record of an ingestion job.
//! - `POST /api/update_index` – start an incremental index update over processed documents.
//! - `GET /api/update_index/status/:job_id` – current record of an update job.
//! - `GET /api/documents` – uploaded and processed documents on disk.
//! - `GET /api/stats` – vector index size and health.
//! - `GET /metrics` – job counters since startup.
//! - `GET /commands` – machine-readable command catalog.
//!
//! Failures are reported as `{ "success": false, "error": "..." }`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::index::IndexStats;
use crate::jobs::{JobRecord, JobsApi, StoredDocument, SubmitError, SubmissionReceipt, Upload};
use crate::metrics::MetricsSnapshot;

/// Largest accepted request body.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Build the HTTP router over a job service.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: JobsApi + 'static,
{
    Router::new()
        .route("/api/upload", post(upload_document::<S>))
        .route("/api/upload/status/:job_id", get(ingestion_status::<S>))
        .route("/api/update_index", post(update_index::<S>))
        .route(
            "/api/update_index/status/:job_id",
            get(update_status::<S>),
        )
        .route("/api/documents", get(list_documents::<S>))
        .route("/api/stats", get(get_stats::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

/// Response body for accepted submissions.
#[derive(Serialize)]
struct SubmitResponse {
    success: bool,
    message: &'static str,
    #[serde(flatten)]
    receipt: SubmissionReceipt,
}

/// Accept an upload and start its ingestion job.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, AppError>
where
    S: JobsApi,
{
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut label = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                file = Some((filename, bytes.to_vec()));
            }
            "label" => label = Some(field.text().await?),
            _ => {}
        }
    }

    let Some((filename, bytes)) = file else {
        return Err(AppError::BadRequest("No file part in request".into()));
    };
    let receipt = service
        .submit_ingestion(Upload {
            filename,
            label,
            bytes,
        })
        .await?;
    Ok(Json(SubmitResponse {
        success: true,
        message: "File uploaded; processing started",
        receipt,
    }))
}

/// Start an index update job.
async fn update_index<S>(State(service): State<Arc<S>>) -> Json<SubmitResponse>
where
    S: JobsApi,
{
    Json(SubmitResponse {
        success: true,
        message: "Index update started",
        receipt: service.submit_update(),
    })
}

/// Response body for status queries.
#[derive(Serialize)]
struct StatusResponse {
    success: bool,
    #[serde(flatten)]
    job: JobRecord,
}

async fn ingestion_status<S>(
    State(service): State<Arc<S>>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>, AppError>
where
    S: JobsApi,
{
    let record = parse_job_id(&job_id).and_then(|id| service.ingestion_status(&id));
    status_response(record, &job_id)
}

async fn update_status<S>(
    State(service): State<Arc<S>>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>, AppError>
where
    S: JobsApi,
{
    let record = parse_job_id(&job_id).and_then(|id| service.update_status(&id));
    status_response(record, &job_id)
}

/// Malformed identifiers are treated like unknown ones.
fn parse_job_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}

fn status_response(
    record: Option<JobRecord>,
    job_id: &str,
) -> Result<Json<StatusResponse>, AppError> {
    record
        .map(|job| {
            Json(StatusResponse {
                success: true,
                job,
            })
        })
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))
}

/// Response body for `GET /api/documents`.
#[derive(Serialize)]
struct DocumentsResponse {
    success: bool,
    count: usize,
    documents: Vec<StoredDocument>,
}

async fn list_documents<S>(
    State(service): State<Arc<S>>,
) -> Result<Json<DocumentsResponse>, AppError>
where
    S: JobsApi,
{
    let documents = service.list_documents().await.map_err(|error| {
        tracing::error!(error = %error, "Failed to list documents");
        AppError::Internal(format!("Failed to list documents: {error}"))
    })?;
    Ok(Json(DocumentsResponse {
        success: true,
        count: documents.len(),
        documents,
    }))
}

#[derive(Serialize)]
struct StatsResponse {
    success: bool,
    stats: ServiceStats,
}

#[derive(Serialize)]
struct ServiceStats {
    vector_store: IndexStats,
    version: &'static str,
}

async fn get_stats<S>(State(service): State<Arc<S>>) -> Result<Json<StatsResponse>, AppError>
where
    S: JobsApi,
{
    let vector_store = service.index_stats().await.map_err(|error| {
        tracing::error!(error = %error, "Failed to read index stats");
        AppError::Internal(format!("Failed to read index stats: {error}"))
    })?;
    Ok(Json(StatsResponse {
        success: true,
        stats: ServiceStats {
            vector_store,
            version: env!("CARGO_PKG_VERSION"),
        },
    }))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: JobsApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/api/upload",
                description: "Upload a PDF or Markdown file (multipart fields `file` and optional `label`) and start an ingestion job. Returns { \"job_id\", \"status_url\" }.",
            },
            CommandDescriptor {
                name: "upload_status",
                method: "GET",
                path: "/api/upload/status/:job_id",
                description: "Poll an ingestion job: status, per-stage progress, errors, and document counts.",
            },
            CommandDescriptor {
                name: "update_index",
                method: "POST",
                path: "/api/update_index",
                description: "Start an incremental index update over all processed documents.",
            },
            CommandDescriptor {
                name: "update_index_status",
                method: "GET",
                path: "/api/update_index/status/:job_id",
                description: "Poll an index update job and read its result once completed.",
            },
            CommandDescriptor {
                name: "documents",
                method: "GET",
                path: "/api/documents",
                description: "List uploaded and processed documents with their labels.",
            },
            CommandDescriptor {
                name: "stats",
                method: "GET",
                path: "/api/stats",
                description: "Return vector index statistics (collection, point counts, health) and the service version.",
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return job counters (submitted, completed, failed, active).",
            },
        ],
    })
}

enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

impl From<SubmitError> for AppError {
    fn from(error: SubmitError) -> Self {
        match error {
            SubmitError::Validation(inner) => Self::BadRequest(inner.to_string()),
            storage @ SubmitError::Storage { .. } => {
                tracing::error!(error = %storage, "Failed to store upload");
                Self::Internal(storage.to_string())
            }
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(error: MultipartError) -> Self {
        Self::BadRequest(format!("Malformed multipart body: {error}"))
    }
}
