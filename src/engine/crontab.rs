// src/engine/crontab.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use super::job::{Job, JobEntry};
use crate::errors::{AgentError, Result};
use crate::types::JobId;

/// Scheduled-job registry: at most one live entry per job ID.
///
/// The lock is only held for the map operation itself; executions hold an
/// `Arc<JobEntry>` and never block registry mutations.
#[derive(Debug, Default)]
pub struct CrontabRegistry {
    jobs: Mutex<HashMap<JobId, Arc<JobEntry>>>,
}

impl CrontabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Arc<JobEntry>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a job. Never replaces: an existing entry must be removed first.
    pub fn add_job(&self, job: Job) -> Result<Arc<JobEntry>> {
        let mut jobs = self.lock();
        if jobs.contains_key(&job.id) {
            return Err(AgentError::AlreadyScheduled(job.id));
        }
        let id = job.id;
        let entry = Arc::new(JobEntry::new(job));
        jobs.insert(id, Arc::clone(&entry));
        info!(job_id = id, "job scheduled");
        Ok(entry)
    }

    pub fn remove(&self, id: JobId) -> Option<Arc<JobEntry>> {
        let removed = self.lock().remove(&id);
        if removed.is_some() {
            debug!(job_id = id, "job unscheduled");
        }
        removed
    }

    pub fn get(&self, id: JobId) -> Option<Arc<JobEntry>> {
        self.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn snapshot(&self) -> Vec<Arc<JobEntry>> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel the running processes of `id`. The entry stays scheduled.
    pub fn kill_task(&self, id: JobId) -> usize {
        self.get(id).map(|entry| entry.kill()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CrontabJobRecord;

    fn job(id: JobId) -> Job {
        Job::from_record(CrontabJobRecord {
            id,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn add_never_replaces() {
        let registry = CrontabRegistry::new();
        registry.add_job(job(1)).unwrap();
        assert!(matches!(registry.add_job(job(1)), Err(AgentError::AlreadyScheduled(1))));

        assert!(registry.remove(1).is_some());
        registry.add_job(job(1)).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn kill_on_idle_or_unknown_job_is_noop() {
        let registry = CrontabRegistry::new();
        registry.add_job(job(1)).unwrap();
        assert_eq!(registry.kill_task(1), 0);
        assert_eq!(registry.kill_task(42), 0);
        assert!(registry.contains(1));
    }
}
