//! Background job orchestration and status tracking.
//!
//! A submission creates a pending [`JobRecord`] in the [`JobRegistry`] and hands exactly one
//! pipeline execution to the [`Dispatcher`]; the caller gets the job identifier back right away
//! and polls the registry for progress. Pipelines own their record while they run and write every
//! failure into it, so nothing raised in the background ever reaches the submitter.

/// Bounded spawning of pipeline executions.
pub mod dispatch;
pub mod ingestion;
mod pipeline;
/// Concurrent in-memory table of job records.
pub mod registry;
pub mod service;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;
pub mod update;
pub mod validate;

pub use dispatch::{Dispatcher, JobHandle};
pub use ingestion::{IngestionPipeline, IngestionRequest};
pub use registry::{JobRegistry, RegistryError};
pub use service::{
    Collaborators, JobService, JobSettings, JobsApi, Storage, StoredDocument, SubmitError,
    Submission, SubmissionReceipt, Upload,
};
pub use types::{
    ErrorEntry, ErrorStage, JobDetails, JobId, JobKind, JobRecord, JobStatus, Stage, StageState,
    TransitionError,
};
pub use update::UpdatePipeline;
pub use validate::{FileType, ValidationError};
