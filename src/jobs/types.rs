//! Job record model: lifecycle status, per-stage progress, and the error log.
//!
//! A [`JobRecord`] is only ever changed through the transition methods below, which enforce the
//! stage rules every job relies on:
//!
//! - a stage moves forward only: unset → in_progress → {completed | failed}, or straight from
//!   unset to skipped/failed;
//! - once a stage has failed, no later stage may start or complete;
//! - a finished job (completed or failed) accepts no further stage changes.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::clock::now_rfc3339;
use crate::index::{BuildOutcome, IndexMode, UpdateSummary};
use crate::jobs::validate::FileType;

/// Opaque identifier assigned to every submitted job.
pub type JobId = Uuid;

/// Family a job belongs to; decides which stages it tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Uploaded document flowing through preprocessing and indexing.
    Ingestion,
    /// Refresh of the index from already-processed documents.
    Update,
}

impl JobKind {
    /// Stages tracked for this kind, in execution order.
    pub fn stages(self) -> &'static [Stage] {
        match self {
            Self::Ingestion => &[Stage::Preprocessing, Stage::Indexing],
            Self::Update => &[Stage::Loading, Stage::Updating],
        }
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingestion => "ingestion",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named phase of a job pipeline. Ordering follows pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Conversion of a binary upload into Markdown.
    Preprocessing,
    /// Merge of the uploaded document into the index.
    Indexing,
    /// Enumeration of processed documents on disk.
    Loading,
    /// Incremental refresh of the index.
    Updating,
}

impl Stage {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preprocessing => "preprocessing",
            Self::Indexing => "indexing",
            Self::Loading => "loading",
            Self::Updating => "updating",
        }
    }

    fn running_status(self) -> JobStatus {
        match self {
            Self::Preprocessing => JobStatus::Preprocessing,
            Self::Indexing => JobStatus::Indexing,
            Self::Loading => JobStatus::Loading,
            Self::Updating => JobStatus::Updating,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single stage that has been touched. Untouched stages are `None` in
/// [`StageProgress`] and serialize as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Stage is executing.
    InProgress,
    /// Stage finished successfully.
    Completed,
    /// Stage finished with an error, or was abandoned by a failing job.
    Failed,
    /// Stage was not needed for this job.
    Skipped,
}

impl StageState {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Whether the stage can no longer change.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

fn describe(state: Option<StageState>) -> &'static str {
    state.map_or("unset", StageState::as_str)
}

/// Overall lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, no stage started yet.
    Pending,
    /// Preprocessing stage running.
    Preprocessing,
    /// Indexing stage running.
    Indexing,
    /// Loading stage running.
    Loading,
    /// Updating stage running.
    Updating,
    /// Finished successfully.
    Completed,
    /// Finished with at least one recorded error.
    Failed,
}

impl JobStatus {
    /// Whether the job has finished.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Stage attributed to a recorded error. `Unknown` covers faults outside any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    /// Raised by the preprocessor.
    Preprocessing,
    /// Raised while building the index.
    Indexing,
    /// Raised while loading documents.
    Loading,
    /// Raised while updating the index.
    Updating,
    /// Raised outside any stage.
    Unknown,
}

impl ErrorStage {
    /// Stage this error belongs to, if any.
    pub fn stage(self) -> Option<Stage> {
        match self {
            Self::Preprocessing => Some(Stage::Preprocessing),
            Self::Indexing => Some(Stage::Indexing),
            Self::Loading => Some(Stage::Loading),
            Self::Updating => Some(Stage::Updating),
            Self::Unknown => None,
        }
    }

    fn failure_label(self) -> &'static str {
        match self {
            Self::Preprocessing => "Preprocessing failed",
            Self::Indexing => "Indexing failed",
            Self::Loading => "Loading documents failed",
            Self::Updating => "Index update failed",
            Self::Unknown => "Job execution error",
        }
    }
}

impl From<Stage> for ErrorStage {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Preprocessing => Self::Preprocessing,
            Stage::Indexing => Self::Indexing,
            Stage::Loading => Self::Loading,
            Stage::Updating => Self::Updating,
        }
    }
}

impl fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage() {
            Some(stage) => stage.fmt(f),
            None => f.write_str("unknown"),
        }
    }
}

/// One entry of a job's append-only error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    /// Stage that raised the error.
    pub stage: ErrorStage,
    /// Human-readable failure description.
    pub message: String,
    /// RFC 3339 time the error was recorded.
    pub timestamp: String,
}

/// Rejected change to a job record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// Stage is not tracked by this job kind.
    #[error("stage {stage} is not tracked by {kind} jobs")]
    UnknownStage {
        /// Stage that was addressed.
        stage: Stage,
        /// Kind of the job.
        kind: JobKind,
    },
    /// Stage cannot move between the two states.
    #[error("stage {stage} cannot move from {from} to {to}")]
    Illegal {
        /// Stage that was addressed.
        stage: Stage,
        /// Current state.
        from: &'static str,
        /// Requested state.
        to: &'static str,
    },
    /// An earlier stage failed, so this one must not run.
    #[error("stage {stage} cannot advance after {failed} failed")]
    AfterFailure {
        /// Stage that was addressed.
        stage: Stage,
        /// Earlier stage that failed.
        failed: Stage,
    },
    /// The job already reached a terminal status.
    #[error("job already finished with status {0:?}")]
    Finished(JobStatus),
    /// A stage is still executing or has failed, so the job cannot complete.
    #[error("job cannot complete while stage {stage} is {state}")]
    Unresolved {
        /// Stage blocking completion.
        stage: Stage,
        /// Its state.
        state: &'static str,
    },
    /// Result data does not match the job kind.
    #[error("{kind} job cannot hold this result")]
    WrongKind {
        /// Kind of the job.
        kind: JobKind,
    },
}

/// Per-stage progress map keyed by stage, in pipeline order. `None` marks an unset stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StageProgress(BTreeMap<Stage, Option<StageState>>);

impl StageProgress {
    /// Progress for a new job of the given kind: every stage unset.
    pub fn for_kind(kind: JobKind) -> Self {
        Self(kind.stages().iter().map(|stage| (*stage, None)).collect())
    }

    /// State of a stage; `None` when unset or not tracked.
    pub fn get(&self, stage: Stage) -> Option<StageState> {
        self.0.get(&stage).copied().flatten()
    }

    /// Iterate over `(stage, state)` pairs in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, Option<StageState>)> + '_ {
        self.0.iter().map(|(stage, state)| (*stage, *state))
    }

    fn transition(
        &mut self,
        kind: JobKind,
        stage: Stage,
        next: StageState,
    ) -> Result<(), TransitionError> {
        let current = *self
            .0
            .get(&stage)
            .ok_or(TransitionError::UnknownStage { stage, kind })?;
        let allowed = matches!(
            (current, next),
            (
                None,
                StageState::InProgress | StageState::Skipped | StageState::Failed
            ) | (
                Some(StageState::InProgress),
                StageState::Completed | StageState::Failed
            )
        );
        if !allowed {
            return Err(TransitionError::Illegal {
                stage,
                from: describe(current),
                to: next.as_str(),
            });
        }
        if matches!(next, StageState::InProgress | StageState::Completed)
            && let Some(failed) = self.failed_before(stage)
        {
            return Err(TransitionError::AfterFailure { stage, failed });
        }
        self.0.insert(stage, Some(next));
        Ok(())
    }

    fn failed_before(&self, stage: Stage) -> Option<Stage> {
        self.0
            .range(..stage)
            .find(|(_, state)| **state == Some(StageState::Failed))
            .map(|(stage, _)| *stage)
    }

    /// Mark stages that never reached a terminal state as failed. Unset stages are included
    /// only when `include_unset` is true.
    fn resolve_unfinished(&mut self, include_unset: bool) {
        for state in self.0.values_mut() {
            match state {
                Some(StageState::InProgress) => *state = Some(StageState::Failed),
                None if include_unset => *state = Some(StageState::Failed),
                _ => {}
            }
        }
    }
}

/// Kind-specific metadata and results of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobDetails {
    /// Details of an ingestion job.
    Ingestion(IngestionDetails),
    /// Details of an index update job.
    Update(UpdateDetails),
}

impl JobDetails {
    /// Details for a new ingestion job.
    pub fn ingestion(filename: impl Into<String>, file_type: FileType, label: impl Into<String>) -> Self {
        Self::Ingestion(IngestionDetails {
            filename: filename.into(),
            file_type,
            label: label.into(),
            needs_preprocessing: file_type.needs_preprocessing(),
            preprocessed_path: None,
            doc_count: None,
            total_count: None,
            mode: None,
        })
    }

    /// Details for a new update job.
    pub fn update() -> Self {
        Self::Update(UpdateDetails::default())
    }

    /// Kind implied by these details.
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Ingestion(_) => JobKind::Ingestion,
            Self::Update(_) => JobKind::Update,
        }
    }
}

/// Upload metadata and indexing results of an ingestion job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionDetails {
    /// Sanitized name the upload was stored under.
    pub filename: String,
    /// Detected file type.
    pub file_type: FileType,
    /// Partition label the document was filed under.
    pub label: String,
    /// Whether the preprocessing stage runs for this file.
    pub needs_preprocessing: bool,
    /// Markdown produced by the preprocessor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocessed_path: Option<String>,
    /// Documents written to the index by this job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_count: Option<usize>,
    /// Documents held by the index after this job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
    /// Merge mode reported by the indexer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<IndexMode>,
}

/// Loading counters and the update result of an index update job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateDetails {
    /// Documents returned by the loader.
    pub documents_loaded: usize,
    /// Summary reported by the indexer, or the skip summary.
    pub result: Option<UpdateSummary>,
}

/// Trackable state of one submitted job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    /// Identifier assigned at submission.
    #[serde(rename = "job_id")]
    pub id: JobId,
    /// Overall lifecycle state.
    pub status: JobStatus,
    /// Human-readable label of the current phase.
    pub stage: Option<String>,
    /// Per-stage progress.
    pub progress: StageProgress,
    /// Append-only error log; empty while the job is healthy.
    pub errors: Vec<ErrorEntry>,
    /// RFC 3339 submission time.
    pub created_at: String,
    /// RFC 3339 time the job reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Kind-specific metadata and results.
    #[serde(flatten)]
    pub details: JobDetails,
}

impl JobRecord {
    /// Fresh pending record with every stage unset.
    pub fn new(id: JobId, details: JobDetails) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            stage: None,
            progress: StageProgress::for_kind(details.kind()),
            errors: Vec::new(),
            created_at: now_rfc3339(),
            completed_at: None,
            details,
        }
    }

    /// Kind of this job.
    pub fn kind(&self) -> JobKind {
        self.details.kind()
    }

    /// Whether the job has finished.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Start `stage`, making it the current phase.
    pub fn begin_stage(&mut self, stage: Stage, label: &str) -> Result<(), TransitionError> {
        self.ensure_active()?;
        self.progress
            .transition(self.kind(), stage, StageState::InProgress)?;
        self.status = stage.running_status();
        self.stage = Some(label.to_string());
        Ok(())
    }

    /// Mark a running stage as completed.
    pub fn complete_stage(&mut self, stage: Stage) -> Result<(), TransitionError> {
        self.ensure_active()?;
        self.progress
            .transition(self.kind(), stage, StageState::Completed)
    }

    /// Mark an unset stage as not needed.
    pub fn skip_stage(&mut self, stage: Stage) -> Result<(), TransitionError> {
        self.ensure_active()?;
        self.progress.transition(self.kind(), stage, StageState::Skipped)
    }

    /// Finish the job successfully. Every stage must be completed or skipped.
    pub fn complete(&mut self, label: &str) -> Result<(), TransitionError> {
        self.ensure_active()?;
        if let Some((stage, state)) = self
            .progress
            .iter()
            .find(|(_, state)| !matches!(state, Some(StageState::Completed | StageState::Skipped)))
        {
            return Err(TransitionError::Unresolved {
                stage,
                state: describe(state),
            });
        }
        self.status = JobStatus::Completed;
        self.stage = Some(label.to_string());
        self.completed_at = Some(now_rfc3339());
        Ok(())
    }

    /// Record a failure and move the job to `failed`.
    ///
    /// The failing stage and any stage still in progress become `failed`. Update jobs also fail
    /// their unset stages; ingestion jobs leave later stages unset because they never ran.
    /// Returns `false` without touching the record when the job had already completed.
    pub fn fail(&mut self, stage: ErrorStage, message: impl Into<String>) -> bool {
        if self.status == JobStatus::Completed {
            return false;
        }
        if let Some(failed) = stage.stage()
            && let Some(slot) = self.progress.0.get_mut(&failed)
            && !slot.is_some_and(StageState::is_terminal)
        {
            *slot = Some(StageState::Failed);
        }
        self.progress
            .resolve_unfinished(self.kind() == JobKind::Update);

        let timestamp = now_rfc3339();
        self.errors.push(ErrorEntry {
            stage,
            message: message.into(),
            timestamp: timestamp.clone(),
        });
        self.status = JobStatus::Failed;
        self.stage = Some(stage.failure_label().to_string());
        self.completed_at.get_or_insert(timestamp);
        true
    }

    /// Attach the preprocessor's output path.
    pub fn record_preprocessed(&mut self, path: impl Into<String>) -> Result<(), TransitionError> {
        self.ingestion_mut()?.preprocessed_path = Some(path.into());
        Ok(())
    }

    /// Attach the indexer's build counters.
    pub fn record_build(&mut self, outcome: &BuildOutcome) -> Result<(), TransitionError> {
        let details = self.ingestion_mut()?;
        details.doc_count = Some(outcome.documents_processed);
        details.total_count = Some(outcome.total_document_count);
        details.mode = Some(outcome.mode);
        Ok(())
    }

    /// Attach the number of documents the loader returned.
    pub fn record_documents_loaded(&mut self, count: usize) -> Result<(), TransitionError> {
        self.update_mut()?.documents_loaded = count;
        Ok(())
    }

    /// Attach the update summary.
    pub fn record_update(&mut self, summary: UpdateSummary) -> Result<(), TransitionError> {
        self.update_mut()?.result = Some(summary);
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), TransitionError> {
        if self.is_terminal() {
            Err(TransitionError::Finished(self.status))
        } else {
            Ok(())
        }
    }

    fn ingestion_mut(&mut self) -> Result<&mut IngestionDetails, TransitionError> {
        match &mut self.details {
            JobDetails::Ingestion(details) => Ok(details),
            JobDetails::Update(_) => Err(TransitionError::WrongKind {
                kind: JobKind::Update,
            }),
        }
    }

    fn update_mut(&mut self) -> Result<&mut UpdateDetails, TransitionError> {
        match &mut self.details {
            JobDetails::Update(details) => Ok(details),
            JobDetails::Ingestion(_) => Err(TransitionError::WrongKind {
                kind: JobKind::Ingestion,
            }),
        }
    }
}
