//! Registry of live jobs.

use std::collections::HashMap;
use std::time::Instant;

use crate::job::JobId;
use crate::worker::IsolatedWorker;

/// A live job's registry entry.
pub struct JobEntry {
    /// Worker running the job. `None` when the worker failed to start and
    /// the job is only waiting for its error event.
    pub worker: Option<Box<dyn IsolatedWorker>>,
    pub out_name: String,
    pub submitted_at: Instant,
}

impl JobEntry {
    pub fn new(worker: Option<Box<dyn IsolatedWorker>>, out_name: impl Into<String>) -> Self {
        Self {
            worker,
            out_name: out_name.into(),
            submitted_at: Instant::now(),
        }
    }
}

impl std::fmt::Debug for JobEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEntry")
            .field("has_worker", &self.worker.is_some())
            .field("out_name", &self.out_name)
            .field("submitted_at", &self.submitted_at)
            .finish()
    }
}

/// Mapping from job id to its live entry.
///
/// Owned by one orchestrator and only touched from its task.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: HashMap<JobId, JobEntry>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job. Returns the previous entry if the id was already live.
    pub fn insert(&mut self, id: JobId, entry: JobEntry) -> Option<JobEntry> {
        self.jobs.insert(id, entry)
    }

    pub fn get(&self, id: JobId) -> Option<&JobEntry> {
        self.jobs.get(&id)
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id)
    }

    pub fn remove(&mut self, id: JobId) -> Option<JobEntry> {
        self.jobs.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Live job ids in ascending order.
    pub fn ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.jobs.keys().copied().collect();
        ids.sort();
        ids
    }
}
