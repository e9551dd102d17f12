use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::pipeline::panic_message;
use super::types::JobId;

/// Hands pipeline executions to the Tokio runtime with a cap on how many run at once.
///
/// Dispatch never waits: the task is spawned immediately and queues on the semaphore itself.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    /// Allow at most `max_concurrent` jobs to execute simultaneously (minimum one).
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Spawn exactly one background execution of `job`.
    pub fn dispatch<F>(&self, job_id: JobId, job: F) -> JobHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let handle = tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::error!(job_id = %job_id, "Job dispatcher closed before the job could run");
                return;
            };
            tracing::debug!(job_id = %job_id, "Job started");
            if let Err(panic) = AssertUnwindSafe(job).catch_unwind().await {
                tracing::error!(
                    job_id = %job_id,
                    panic = %panic_message(panic.as_ref()),
                    "Job execution panicked"
                );
            }
        });
        JobHandle { job_id, handle }
    }

    /// Permits currently free.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Handle to a dispatched job execution.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    handle: JoinHandle<()>,
}

impl JobHandle {
    /// Identifier of the job this execution owns.
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Whether the execution has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the execution to finish.
    pub async fn wait(self) {
        if let Err(error) = self.handle.await {
            tracing::error!(job_id = %self.job_id, error = %error, "Job task did not complete");
        }
    }
}
