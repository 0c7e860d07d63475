// src/engine/daemon.rs

//! Supervised daemon jobs.
//!
//! A daemon's command is restarted every time it exits, until it is popped,
//! fails with `failed_restart` unset, or exhausts `retry_num` restarts. The
//! registry has its own lock, so daemon lifecycle never waits on the
//! scheduled-job registry and vice versa.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::NodeContext;
use crate::exec::CommandUnit;
use crate::store::{DaemonJobRecord, Filter, JobStore};
use crate::types::{JobId, JobKind, JobStatus};

#[derive(Debug)]
struct DaemonHandle {
    cancel: CancellationToken,
    generation: u64,
}

type DaemonMap = Arc<Mutex<HashMap<JobId, DaemonHandle>>>;

fn lock(map: &DaemonMap) -> MutexGuard<'_, HashMap<JobId, DaemonHandle>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Why a supervision loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Popped,
    Failed,
    RetriesExhausted,
}

#[derive(Debug)]
pub struct DaemonSupervisor {
    ctx: NodeContext,
    store: Arc<dyn JobStore>,
    restart_delay: Duration,
    jobs: DaemonMap,
    generation: AtomicU64,
}

impl DaemonSupervisor {
    pub fn new(ctx: NodeContext, store: Arc<dyn JobStore>, restart_delay: Duration) -> Self {
        Self {
            ctx,
            store,
            restart_delay,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Start supervising `record`. Returns `false` if it is already running.
    pub fn add(&self, record: DaemonJobRecord) -> bool {
        let id = record.id;
        let cancel = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        {
            let mut jobs = lock(&self.jobs);
            if jobs.contains_key(&id) {
                return false;
            }
            jobs.insert(
                id,
                DaemonHandle {
                    cancel: cancel.clone(),
                    generation,
                },
            );
        }

        info!(job_id = id, name = %record.name, "daemon job started");
        let supervision = Supervision {
            ctx: self.ctx.clone(),
            store: Arc::clone(&self.store),
            restart_delay: self.restart_delay,
            jobs: Arc::clone(&self.jobs),
            record,
            cancel,
            generation,
        };
        tokio::spawn(supervision.run());
        true
    }

    /// Stop supervising `id` and terminate its process. Returns whether it
    /// was running.
    pub fn pop_job(&self, id: JobId) -> bool {
        let handle = lock(&self.jobs).remove(&id);
        match handle {
            Some(handle) => {
                handle.cancel.cancel();
                info!(job_id = id, "daemon job stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, id: JobId) -> bool {
        lock(&self.jobs).contains_key(&id)
    }

    pub fn ids(&self) -> Vec<JobId> {
        lock(&self.jobs).keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.jobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Supervision {
    ctx: NodeContext,
    store: Arc<dyn JobStore>,
    restart_delay: Duration,
    jobs: DaemonMap,
    record: DaemonJobRecord,
    cancel: CancellationToken,
    generation: u64,
}

impl Supervision {
    async fn run(self) {
        let id = self.record.id;
        let reason = self.supervise().await;

        if reason == StopReason::Popped {
            return;
        }

        // Only clear our own registration; a newer add may have replaced it.
        {
            let mut jobs = lock(&self.jobs);
            if jobs.get(&id).is_some_and(|h| h.generation == self.generation) {
                jobs.remove(&id);
            }
        }
        warn!(job_id = id, ?reason, "daemon job exited and will not be restarted");
        let marked = self
            .store
            .daemon()
            .update(&Filter::by_id(id), &mut |r| r.status = JobStatus::Stop);
        if let Err(err) = marked {
            warn!(job_id = id, error = %err, "failed to mark daemon job stopped");
        }
    }

    async fn supervise(&self) -> StopReason {
        let id = self.record.id;
        let mut restarts = 0u32;
        loop {
            let report = CommandUnit::new(&self.ctx, JobKind::Daemon, id, self.record.commands.clone())
                .label(self.record.name.clone())
                .settings(self.record.process_settings())
                .cancel_token(self.cancel.clone())
                .launch()
                .await;

            if self.cancel.is_cancelled() {
                return StopReason::Popped;
            }
            if let Some(err) = report.outcome.error() {
                warn!(job_id = id, error = %err, "daemon job failed");
                if !self.record.failed_restart {
                    return StopReason::Failed;
                }
            }
            if self.record.retry_num > 0 && restarts >= self.record.retry_num {
                return StopReason::RetriesExhausted;
            }
            restarts += 1;

            tokio::select! {
                _ = self.cancel.cancelled() => return StopReason::Popped,
                _ = tokio::time::sleep(self.restart_delay) => {}
            }
            info!(job_id = id, restarts, "restarting daemon job");
        }
    }
}
