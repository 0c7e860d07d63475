// src/engine/job.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use super::schedule::Schedule;
use crate::errors::Result;
use crate::store::CrontabJobRecord;
use crate::types::JobId;

/// A scheduled job: identity, parsed calendar fields, the persisted record
/// and an optional market tag for its log lines.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub schedule: Schedule,
    pub value: CrontabJobRecord,
    pub market: Option<String>,
}

impl Job {
    pub fn from_record(value: CrontabJobRecord) -> Result<Self> {
        Ok(Self {
            id: value.id,
            schedule: Schedule::parse(&value.time_args)?,
            value,
            market: None,
        })
    }

    /// `MaxConcurrent`, with 0 meaning 1.
    pub fn max_concurrent(&self) -> usize {
        self.value.max_concurrent.max(1) as usize
    }
}

/// Live registry entry of a scheduled job and its running processes.
#[derive(Debug)]
pub struct JobEntry {
    pub job: Job,
    processes: Mutex<HashMap<u64, CancellationToken>>,
    next_process: AtomicU64,
}

impl JobEntry {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            processes: Mutex::new(HashMap::new()),
            next_process: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, CancellationToken>> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a process slot, or `None` when `MaxConcurrent` processes are
    /// already running.
    pub fn begin(self: &Arc<Self>) -> Option<ProcessGuard> {
        let mut processes = self.lock();
        if processes.len() >= self.job.max_concurrent() {
            return None;
        }
        let process_id = self.next_process.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        processes.insert(process_id, token.clone());
        Some(ProcessGuard {
            entry: Arc::clone(self),
            process_id,
            token,
        })
    }

    pub fn running(&self) -> usize {
        self.lock().len()
    }

    /// Cancel every running process; returns how many were signalled.
    pub fn kill(&self) -> usize {
        let processes = self.lock();
        for token in processes.values() {
            token.cancel();
        }
        processes.len()
    }
}

/// A running process of a [`JobEntry`]; releases its slot on drop.
#[derive(Debug)]
pub struct ProcessGuard {
    entry: Arc<JobEntry>,
    pub process_id: u64,
    pub token: CancellationToken,
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.entry.lock().remove(&self.process_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(max_concurrent: u32) -> Arc<JobEntry> {
        let record = CrontabJobRecord {
            id: 3,
            max_concurrent,
            ..Default::default()
        };
        Arc::new(JobEntry::new(Job::from_record(record).unwrap()))
    }

    #[test]
    fn max_concurrent_bounds_processes() {
        let entry = entry(2);
        let a = entry.begin().unwrap();
        let b = entry.begin().unwrap();
        assert!(entry.begin().is_none());
        assert_ne!(a.process_id, b.process_id);

        drop(a);
        assert_eq!(entry.running(), 1);
        assert!(entry.begin().is_some());
    }

    #[test]
    fn zero_max_concurrent_means_one() {
        let entry = entry(0);
        let _running = entry.begin().unwrap();
        assert!(entry.begin().is_none());
    }

    #[test]
    fn kill_cancels_running_tokens() {
        let entry = entry(1);
        let guard = entry.begin().unwrap();
        assert_eq!(entry.kill(), 1);
        assert!(guard.token.is_cancelled());
        drop(guard);
        assert_eq!(entry.kill(), 0);
    }
}
