// src/engine/tmp.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::types::JobId;

#[derive(Debug)]
struct TmpRun {
    job_id: JobId,
    token: CancellationToken,
}

/// Ephemeral runs (manual `Exec`/`Execs`) currently in flight.
///
/// Runs are registered for the duration of their execution only; they are
/// invisible to the scheduler but reachable by kill requests.
#[derive(Debug, Default)]
pub struct TmpJobs {
    runs: Arc<Mutex<HashMap<u64, TmpRun>>>,
    seq: AtomicU64,
}

impl TmpJobs {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, TmpRun>> {
        lock_runs(&self.runs)
    }

    pub fn register(&self, job_id: JobId) -> TmpGuard {
        let run_id = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        self.lock().insert(
            run_id,
            TmpRun {
                job_id,
                token: token.clone(),
            },
        );
        TmpGuard {
            runs: Arc::clone(&self.runs),
            run_id,
            token,
        }
    }

    pub fn contains(&self, job_id: JobId) -> bool {
        self.lock().values().any(|run| run.job_id == job_id)
    }

    pub fn running(&self, job_id: JobId) -> usize {
        self.lock().values().filter(|run| run.job_id == job_id).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every ephemeral run of `job_id`.
    pub fn kill(&self, job_id: JobId) -> usize {
        let runs = self.lock();
        let mut killed = 0;
        for run in runs.values().filter(|run| run.job_id == job_id) {
            run.token.cancel();
            killed += 1;
        }
        killed
    }
}

fn lock_runs(runs: &Mutex<HashMap<u64, TmpRun>>) -> MutexGuard<'_, HashMap<u64, TmpRun>> {
    runs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registration of one ephemeral run; deregisters on drop.
#[derive(Debug)]
pub struct TmpGuard {
    runs: Arc<Mutex<HashMap<u64, TmpRun>>>,
    run_id: u64,
    pub token: CancellationToken,
}

impl TmpGuard {
    /// Ephemeral process IDs are unique per agent, not per job.
    pub fn process_id(&self) -> u64 {
        self.run_id
    }
}

impl Drop for TmpGuard {
    fn drop(&mut self) {
        lock_runs(&self.runs).remove(&self.run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_deregisters_on_drop() {
        let tmp = TmpJobs::new();
        let guard = tmp.register(5);
        assert!(tmp.contains(5));
        drop(guard);
        assert!(!tmp.contains(5));
        assert!(tmp.is_empty());
    }

    #[test]
    fn kill_targets_only_the_given_job() {
        let tmp = TmpJobs::new();
        let a = tmp.register(1);
        let b = tmp.register(2);
        assert_eq!(tmp.kill(1), 1);
        assert!(a.token.is_cancelled());
        assert!(!b.token.is_cancelled());
        assert_eq!(tmp.kill(9), 0);
    }
}
