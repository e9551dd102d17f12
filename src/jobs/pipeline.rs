//! Failure containment shared by the ingestion and update pipelines.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use thiserror::Error;

use super::registry::{JobRegistry, RegistryError};
use super::types::{ErrorStage, JobId, JobRecord, JobStatus, TransitionError};
use crate::metrics::JobMetrics;

/// Failure raised inside a background execution, tagged with the stage it belongs to.
#[derive(Debug, Error)]
pub(crate) enum PipelineError {
    #[error("{0}")]
    Preprocessing(String),
    #[error("{0}")]
    Indexing(String),
    #[error("{0}")]
    Loading(String),
    #[error("{0}")]
    Updating(String),
    #[error("{0}")]
    Unexpected(String),
}

impl PipelineError {
    pub(crate) fn stage(&self) -> ErrorStage {
        match self {
            Self::Preprocessing(_) => ErrorStage::Preprocessing,
            Self::Indexing(_) => ErrorStage::Indexing,
            Self::Loading(_) => ErrorStage::Loading,
            Self::Updating(_) => ErrorStage::Updating,
            Self::Unexpected(_) => ErrorStage::Unknown,
        }
    }
}

impl From<RegistryError> for PipelineError {
    fn from(error: RegistryError) -> Self {
        Self::Unexpected(error.to_string())
    }
}

impl From<TransitionError> for PipelineError {
    fn from(error: TransitionError) -> Self {
        Self::Unexpected(error.to_string())
    }
}

/// Await a collaborator call, turning both its error and any panic into a message.
pub(crate) async fn guarded<T, E, F>(call: F) -> Result<T, String>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(error.to_string()),
        Err(panic) => Err(format!("panic: {}", panic_message(panic.as_ref()))),
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The one job a background execution owns, plus where to report to.
#[derive(Clone)]
pub(crate) struct JobContext {
    pub(crate) registry: Arc<JobRegistry>,
    pub(crate) metrics: Arc<JobMetrics>,
    pub(crate) job_id: JobId,
}

impl JobContext {
    /// Apply a fallible change to the owned record.
    pub(crate) fn update<R>(
        &self,
        change: impl FnOnce(&mut JobRecord) -> Result<R, TransitionError>,
    ) -> Result<R, PipelineError> {
        Ok(self.registry.mutate(&self.job_id, change)??)
    }

    /// Run `body` to completion, writing any error or panic into the record.
    pub(crate) async fn run_contained<F>(&self, body: F)
    where
        F: Future<Output = Result<(), PipelineError>>,
    {
        let error = match AssertUnwindSafe(body).catch_unwind().await {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(error),
            Err(panic) => Some(PipelineError::Unexpected(format!(
                "panic: {}",
                panic_message(panic.as_ref())
            ))),
        };
        if let Some(error) = error {
            self.record_failure(&error);
        }

        match self.registry.get(&self.job_id).map(|record| record.status) {
            Some(JobStatus::Completed) => self.metrics.record_completed(),
            Some(JobStatus::Failed) => self.metrics.record_failed(),
            status => {
                tracing::error!(job_id = %self.job_id, ?status, "Job ended without a terminal status");
            }
        }
    }

    fn record_failure(&self, error: &PipelineError) {
        let stage = error.stage();
        tracing::error!(job_id = %self.job_id, stage = %stage, error = %error, "Job failed");
        match self
            .registry
            .mutate(&self.job_id, |record| record.fail(stage, error.to_string()))
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(job_id = %self.job_id, "Ignoring failure reported after completion");
            }
            Err(lookup) => {
                tracing::error!(job_id = %self.job_id, error = %lookup, "Cannot record failure");
            }
        }
    }
}
