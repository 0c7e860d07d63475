// src/depend/coordinator.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{DependEntry, DependKey, DependTransport};
use crate::context::NodeContext;
use crate::errors::Result;
use crate::exec::{CommandUnit, ExecError, ProcessSettings};
use crate::types::{JobId, JobKind};

/// Receiving half of the step queue, consumed by [`DependCoordinator::spawn_worker`].
#[derive(Debug)]
pub struct DependQueue(mpsc::Receiver<DependEntry>);

/// Queues dependency steps for this node and tracks the steps this node's
/// jobs are waiting on.
pub struct DependCoordinator {
    ctx: NodeContext,
    pending: Mutex<HashMap<DependKey, oneshot::Sender<DependEntry>>>,
    /// Cancellation handles of the steps queued or running on this node.
    steps: Mutex<HashMap<DependKey, CancellationToken>>,
    step_timeout: Duration,
    queue: mpsc::Sender<DependEntry>,
    transport: Arc<dyn DependTransport>,
}

impl fmt::Debug for DependCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependCoordinator")
            .field("node", &self.ctx.node_addr)
            .field("pending", &self.pending_len())
            .field("steps", &self.lock_steps().len())
            .field("transport", &self.transport)
            .finish()
    }
}

/// Outcome of waiting on a job's dependencies.
#[derive(Debug)]
pub struct Resolution {
    /// Output of the finished steps, in declaration order.
    pub content: Vec<u8>,
    pub result: std::result::Result<(), ExecError>,
}

impl DependCoordinator {
    /// `step_timeout` bounds every step this node runs.
    pub fn new(
        ctx: NodeContext,
        queue_size: usize,
        step_timeout: Duration,
        transport: Arc<dyn DependTransport>,
    ) -> (Arc<Self>, DependQueue) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let coordinator = Arc::new(Self {
            ctx,
            pending: Mutex::new(HashMap::new()),
            steps: Mutex::new(HashMap::new()),
            step_timeout,
            queue: tx,
            transport,
        });
        (coordinator, DependQueue(rx))
    }

    pub fn node_addr(&self) -> &str {
        &self.ctx.node_addr
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<DependKey, oneshot::Sender<DependEntry>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_steps(&self) -> MutexGuard<'_, HashMap<DependKey, CancellationToken>> {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Steps this node is still waiting on.
    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }

    /// Enqueue a step for execution on this node. Returns immediately;
    /// `false` means the queue is full or the worker is gone.
    pub fn exec_depend(&self, entry: DependEntry) -> bool {
        let (key, job_id, name) = (entry.key(), entry.job_id, entry.name.clone());
        // Registered before sending so the worker always finds the handle.
        self.lock_steps().insert(key.clone(), CancellationToken::new());
        let rejected = match self.queue.try_send(entry) {
            Ok(()) => {
                info!(job_id, name = %name, "dependency step queued");
                return true;
            }
            Err(TrySendError::Full(_)) => "dependency queue full; step rejected",
            Err(TrySendError::Closed(_)) => "dependency worker stopped; step rejected",
        };
        self.lock_steps().remove(&key);
        warn!(job_id, name = %name, "{rejected}");
        false
    }

    /// Cancel a step queued or running on this node. A step that has not
    /// started yet is skipped by the worker.
    pub fn cancel_step(&self, key: &DependKey) -> bool {
        match self.lock_steps().remove(key) {
            Some(token) => {
                token.cancel();
                debug!(?key, "dependency step cancelled");
                true
            }
            None => false,
        }
    }

    /// Completion callback for a step declared on this node.
    ///
    /// Returns `false` when no job is waiting for these keys: unknown entry,
    /// already completed, or the waiter gave up.
    pub fn set_depend_done(&self, mut entry: DependEntry) -> bool {
        let key = entry.key();
        let Some(waiter) = self.lock_pending().remove(&key) else {
            debug!(?key, "completion for unknown dependency step");
            return false;
        };
        entry.done = true;
        waiter.send(entry).is_ok()
    }

    /// Register interest in the completion of `entry`.
    pub fn declare(self: &Arc<Self>, entry: &DependEntry) -> DependWaiter {
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(entry.key(), tx);
        DependWaiter {
            key: entry.key(),
            name: entry.name.clone(),
            rx,
            coordinator: Arc::downgrade(self),
        }
    }

    /// Drop every pending step of a job and cancel the ones running here;
    /// returns how many waits were dropped.
    pub fn forget_job(&self, job_id: JobId) -> usize {
        self.lock_steps().retain(|key, token| {
            if key.job_id == job_id {
                token.cancel();
            }
            key.job_id != job_id
        });

        let mut pending = self.lock_pending();
        let before = pending.len();
        pending.retain(|key, _| key.job_id != job_id);
        before - pending.len()
    }

    /// Send each entry to its node and wait for all of them, up to `limit`.
    pub async fn resolve(
        self: &Arc<Self>,
        entries: Vec<DependEntry>,
        limit: Duration,
        cancel: &CancellationToken,
    ) -> Resolution {
        let mut content = Vec::new();

        let mut waiters = Vec::with_capacity(entries.len());
        for entry in entries {
            let waiter = self.declare(&entry);
            let (name, dest) = (entry.name.clone(), entry.dest.clone());
            match self.route_exec(entry).await {
                Ok(true) => waiters.push(waiter),
                Ok(false) => {
                    return Resolution {
                        content,
                        result: Err(ExecError::Depend(format!("{name}: rejected by node '{dest}'"))),
                    };
                }
                Err(err) => {
                    return Resolution {
                        content,
                        result: Err(ExecError::Depend(format!("{name}: {err}"))),
                    };
                }
            }
        }

        let collect = async {
            for mut waiter in waiters {
                let done = waiter.wait().await?;
                content.extend_from_slice(&done.log_content);
                if let Some(err) = done.err.filter(|e| !e.is_empty()) {
                    return Err(ExecError::Depend(format!("{}: {err}", waiter.name)));
                }
            }
            Ok::<(), ExecError>(())
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(ExecError::Depend("cancelled".to_string())),
            res = tokio::time::timeout(limit, collect) => {
                res.unwrap_or_else(|_| Err(ExecError::Depend(format!("timed out after {limit:?}"))))
            }
        };
        Resolution { content, result }
    }

    async fn route_exec(&self, entry: DependEntry) -> Result<bool> {
        if self.ctx.is_local(&entry.dest) {
            return Ok(self.exec_depend(entry));
        }
        let dest = entry.dest.clone();
        self.transport.exec_depend(&dest, entry).await
    }

    async fn route_done(&self, entry: DependEntry) -> Result<bool> {
        if self.ctx.is_local(&entry.from) {
            return Ok(self.set_depend_done(entry));
        }
        let from = entry.from.clone();
        self.transport.set_depend_done(&from, entry).await
    }

    /// Consume queued steps until `shutdown` fires or the coordinator is dropped.
    pub fn spawn_worker(self: &Arc<Self>, queue: DependQueue, shutdown: CancellationToken) -> JoinHandle<()> {
        let coordinator = Arc::downgrade(self);
        tokio::spawn(async move {
            let DependQueue(mut rx) = queue;
            loop {
                let entry = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(entry) => entry,
                        None => break,
                    },
                };
                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };
                tokio::spawn(async move { coordinator.run_step(entry).await });
            }
            debug!("dependency worker stopped");
        })
    }

    async fn run_step(&self, mut entry: DependEntry) {
        let key = entry.key();
        let Some(token) = self.lock_steps().get(&key).cloned() else {
            debug!(job_id = entry.job_id, name = %entry.name, "dependency step withdrawn before start");
            return;
        };

        let report = CommandUnit::new(&self.ctx, JobKind::Crontab, entry.job_id, entry.commands.clone())
            .label(entry.name.clone())
            .settings(ProcessSettings {
                kill_child_process: true,
                ..Default::default()
            })
            .export_log(true)
            .ignore_file_log(true)
            .cancel_token(token)
            .timeout(Some(self.step_timeout))
            .launch()
            .await;

        // A timed-out step still reports; only a withdrawn one stays silent.
        let withdrawn = self.lock_steps().remove(&key).is_none();
        if withdrawn {
            info!(job_id = entry.job_id, name = %entry.name, "dependency step cancelled; not reported");
            return;
        }

        entry.done = true;
        entry.log_content = report.content;
        entry.err = report.outcome.error().map(str::to_string);

        let (job_id, name, from) = (entry.job_id, entry.name.clone(), entry.from.clone());
        match self.route_done(entry).await {
            Ok(true) => debug!(job_id, name = %name, "dependency step reported"),
            Ok(false) => warn!(job_id, name = %name, from = %from, "dependency completion not accepted"),
            Err(err) => warn!(job_id, name = %name, from = %from, error = %err, "dependency completion undeliverable"),
        }
    }
}

/// Handle on one declared step. Dropping it withdraws the pending entry.
#[derive(Debug)]
pub struct DependWaiter {
    key: DependKey,
    name: String,
    rx: oneshot::Receiver<DependEntry>,
    coordinator: Weak<DependCoordinator>,
}

impl DependWaiter {
    pub async fn wait(&mut self) -> std::result::Result<DependEntry, ExecError> {
        (&mut self.rx)
            .await
            .map_err(|_| ExecError::Depend(format!("{}: step dropped", self.name)))
    }
}

impl Drop for DependWaiter {
    fn drop(&mut self) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.lock_pending().remove(&self.key);
            coordinator.cancel_step(&self.key);
        }
    }
}
