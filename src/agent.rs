// src/agent.rs

//! The agent: one node's registries, dependency coordinator and runner,
//! wired to a job store and a dependency transport.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AgentSettings;
use crate::context::NodeContext;
use crate::depend::{DependCoordinator, DependTransport};
use crate::engine::{CrontabRegistry, DaemonSupervisor, Job, JobRunner, Scheduler, TmpJobs};
use crate::errors::Result;
use crate::store::{CrontabJobRecord, DaemonJobRecord, Filter, JobStore};
use crate::types::{JobId, JobStatus};

const KILL_POLL: Duration = Duration::from_millis(20);

#[derive(Debug)]
pub struct Agent {
    ctx: NodeContext,
    settings: AgentSettings,
    store: Arc<dyn JobStore>,
    crontab: Arc<CrontabRegistry>,
    daemons: DaemonSupervisor,
    tmp: Arc<TmpJobs>,
    depend: Arc<DependCoordinator>,
    runner: JobRunner,
    started_at: Instant,
    shutdown: CancellationToken,
}

impl Agent {
    /// Build the agent and start its dependency worker.
    pub fn new(
        ctx: NodeContext,
        settings: AgentSettings,
        store: Arc<dyn JobStore>,
        transport: Arc<dyn DependTransport>,
    ) -> Arc<Self> {
        let shutdown = CancellationToken::new();
        let (depend, queue) = DependCoordinator::new(
            ctx.clone(),
            settings.depend_queue_size,
            settings.depend_timeout,
            transport,
        );
        depend.spawn_worker(queue, shutdown.clone());

        let tmp = Arc::new(TmpJobs::new());
        let runner = JobRunner::new(
            ctx.clone(),
            Arc::clone(&store),
            Arc::clone(&depend),
            Arc::clone(&tmp),
            settings.depend_timeout,
        );
        let daemons = DaemonSupervisor::new(ctx.clone(), Arc::clone(&store), settings.daemon_restart_delay);

        Arc::new(Self {
            ctx,
            settings,
            store,
            crontab: Arc::new(CrontabRegistry::new()),
            daemons,
            tmp,
            depend,
            runner,
            started_at: Instant::now(),
            shutdown,
        })
    }

    pub fn ctx(&self) -> &NodeContext {
        &self.ctx
    }

    pub fn store(&self) -> &dyn JobStore {
        self.store.as_ref()
    }

    pub fn crontab(&self) -> &CrontabRegistry {
        &self.crontab
    }

    pub fn daemons(&self) -> &DaemonSupervisor {
        &self.daemons
    }

    pub fn tmp_jobs(&self) -> &TmpJobs {
        &self.tmp
    }

    pub fn depend(&self) -> &Arc<DependCoordinator> {
        &self.depend
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Start the once-per-second tick loop.
    pub fn start_scheduler(&self) -> JoinHandle<()> {
        Scheduler::new(
            Arc::clone(&self.crontab),
            self.runner.clone(),
            Arc::clone(&self.ctx.clock),
        )
        .spawn(self.shutdown.clone())
    }

    /// Push a crontab record into the live registry.
    pub fn schedule(&self, record: CrontabJobRecord) -> Result<()> {
        let job = Job::from_record(record)?;
        self.crontab.add_job(job)?;
        Ok(())
    }

    /// Kill and unschedule a crontab job.
    pub async fn evict(&self, id: JobId) {
        self.kill_task(id).await;
        self.crontab.remove(id);
    }

    /// Terminate every running process of `id`, scheduled or ephemeral, and
    /// wait up to the kill grace period for them to be reaped. A job that is
    /// not running is left untouched.
    pub async fn kill_task(&self, id: JobId) -> usize {
        let killed = self.crontab.kill_task(id) + self.tmp.kill(id);
        if killed == 0 {
            return 0;
        }
        info!(job_id = id, killed, "kill requested");

        let deadline = Instant::now() + self.settings.kill_grace;
        while self.running(id) > 0 {
            if Instant::now() >= deadline {
                warn!(job_id = id, grace = ?self.settings.kill_grace, "killed job still running after grace period");
                break;
            }
            tokio::time::sleep(KILL_POLL).await;
        }
        killed
    }

    /// Running processes of `id` across the scheduled and ephemeral sets.
    pub fn running(&self, id: JobId) -> usize {
        let scheduled = self.crontab.get(id).map(|e| e.running()).unwrap_or(0);
        scheduled + self.tmp.running(id)
    }

    /// Start supervising a daemon record.
    pub fn start_daemon(&self, record: DaemonJobRecord) -> bool {
        self.daemons.add(record)
    }

    /// Start every crontab job left in `timing`/`running` and every daemon
    /// left in `running`. Returns `(crontab, daemon)` counts.
    pub fn recover(&self) -> Result<(usize, usize)> {
        let crontab_jobs = self.store.crontab().find(
            &Filter::default().statuses(&[JobStatus::Timing, JobStatus::Running]),
            None,
        )?;
        let mut scheduled = 0;
        for record in crontab_jobs {
            let id = record.id;
            match self.schedule(record) {
                Ok(()) => scheduled += 1,
                Err(err) => warn!(job_id = id, error = %err, "failed to recover crontab job"),
            }
        }
        self.store.crontab().update(
            &Filter::default().statuses(&[JobStatus::Running]),
            &mut |r| {
                r.status = JobStatus::Timing;
                r.process_num = 0;
            },
        )?;

        let daemon_jobs = self
            .store
            .daemon()
            .find(&Filter::default().statuses(&[JobStatus::Running]), None)?;
        let mut daemons = 0;
        for record in daemon_jobs {
            if self.daemons.add(record) {
                daemons += 1;
            }
        }

        info!(crontab = scheduled, daemon = daemons, "jobs recovered");
        Ok((scheduled, daemons))
    }

    /// Stop the scheduler and dependency worker and terminate everything
    /// still running.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        for entry in self.crontab.snapshot() {
            self.kill_task(entry.job.id).await;
        }
        for id in self.daemons.ids() {
            self.daemons.pop_job(id);
        }
        info!("agent stopped");
    }
}
