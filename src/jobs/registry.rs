use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use uuid::Uuid;

use super::types::{JobDetails, JobId, JobRecord};

/// Lookup failure against the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No job with this identifier exists.
    #[error("job {0} not found")]
    NotFound(JobId),
}

/// In-memory table of every job submitted since startup.
///
/// Records are never evicted. Each record has a single writer (the execution that owns the job)
/// and any number of readers; entry-level locking keeps readers from observing half-applied
/// updates.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<JobId, JobRecord>,
}

impl JobRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending record for a new job and return its identifier.
    pub fn submit(&self, details: JobDetails) -> JobId {
        loop {
            let id = Uuid::new_v4();
            if let Entry::Vacant(slot) = self.jobs.entry(id) {
                slot.insert(JobRecord::new(id, details));
                return id;
            }
        }
    }

    /// Snapshot of a record.
    pub fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    /// Apply `change` to a record while holding its write lock.
    pub fn mutate<R>(
        &self,
        id: &JobId,
        change: impl FnOnce(&mut JobRecord) -> R,
    ) -> Result<R, RegistryError> {
        let mut entry = self.jobs.get_mut(id).ok_or(RegistryError::NotFound(*id))?;
        Ok(change(entry.value_mut()))
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether no job was submitted yet.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
