use std::sync::atomic::{AtomicU64, Ordering};

use crate::jobs::types::JobKind;

/// Thread-safe counters describing job activity since startup.
#[derive(Default)]
pub struct JobMetrics {
    ingestion_submitted: AtomicU64,
    update_submitted: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
}

impl JobMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly submitted job.
    pub fn record_submitted(&self, kind: JobKind) {
        let counter = match kind {
            JobKind::Ingestion => &self.ingestion_submitted,
            JobKind::Update => &self.update_submitted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job that reached `completed`.
    pub fn record_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job that reached `failed`.
    pub fn record_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let ingestion_submitted = self.ingestion_submitted.load(Ordering::Relaxed);
        let update_submitted = self.update_submitted.load(Ordering::Relaxed);
        let jobs_completed = self.jobs_completed.load(Ordering::Relaxed);
        let jobs_failed = self.jobs_failed.load(Ordering::Relaxed);
        MetricsSnapshot {
            ingestion_submitted,
            update_submitted,
            jobs_completed,
            jobs_failed,
            jobs_active: (ingestion_submitted + update_submitted)
                .saturating_sub(jobs_completed + jobs_failed),
        }
    }
}

/// Immutable view of job counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Ingestion jobs accepted since startup.
    pub ingestion_submitted: u64,
    /// Index update jobs accepted since startup.
    pub update_submitted: u64,
    /// Jobs that finished successfully.
    pub jobs_completed: u64,
    /// Jobs that finished with a failure.
    pub jobs_failed: u64,
    /// Jobs accepted but not yet terminal.
    pub jobs_active: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_submissions_and_outcomes() {
        let metrics = JobMetrics::new();
        metrics.record_submitted(JobKind::Ingestion);
        metrics.record_submitted(JobKind::Ingestion);
        metrics.record_submitted(JobKind::Update);
        metrics.record_completed();
        metrics.record_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ingestion_submitted, 2);
        assert_eq!(snapshot.update_submitted, 1);
        assert_eq!(snapshot.jobs_completed, 1);
        assert_eq!(snapshot.jobs_failed, 1);
        assert_eq!(snapshot.jobs_active, 1);
    }

    #[test]
    fn snapshot_starts_empty() {
        let snapshot = JobMetrics::new().snapshot();
        assert_eq!(snapshot.jobs_active, 0);
        assert_eq!(snapshot.jobs_completed, 0);
    }
}
