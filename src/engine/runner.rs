// src/engine/runner.rs

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::job::JobEntry;
use super::tmp::TmpJobs;
use crate::context::NodeContext;
use crate::depend::{DependCoordinator, DependEntry};
use crate::exec::{CommandUnit, LaunchReport};
use crate::store::{CrontabJobRecord, Filter, JobStore};
use crate::types::{JobKind, JobStatus};

/// Market tag of runs triggered through the `Exec` RPC.
pub const MANUAL_MARKET: &str = "manual";

/// Turns crontab records into executions: dependencies first, then the
/// job's own command unit, with store bookkeeping around both.
#[derive(Clone)]
pub struct JobRunner {
    ctx: NodeContext,
    store: Arc<dyn JobStore>,
    depend: Arc<DependCoordinator>,
    tmp: Arc<TmpJobs>,
    depend_timeout: Duration,
    seq: Arc<AtomicU64>,
}

impl fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRunner")
            .field("node", &self.ctx.node_addr)
            .field("depend_timeout", &self.depend_timeout)
            .finish_non_exhaustive()
    }
}

impl JobRunner {
    pub fn new(
        ctx: NodeContext,
        store: Arc<dyn JobStore>,
        depend: Arc<DependCoordinator>,
        tmp: Arc<TmpJobs>,
        depend_timeout: Duration,
    ) -> Self {
        Self {
            ctx,
            store,
            depend,
            tmp,
            depend_timeout,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// One scheduled execution of `entry`. Returns `None` when the trigger
    /// was skipped because `MaxConcurrent` processes are already running.
    pub async fn run_scheduled(&self, entry: Arc<JobEntry>) -> Option<LaunchReport> {
        let Some(guard) = entry.begin() else {
            warn!(
                job_id = entry.job.id,
                max_concurrent = entry.job.max_concurrent(),
                "max concurrent reached; trigger skipped"
            );
            return None;
        };
        let report = self
            .execute(
                &entry.job.value,
                guard.process_id,
                guard.token.clone(),
                entry.job.market.clone(),
                false,
            )
            .await;
        Some(report)
    }

    /// Run `record` once outside the schedule as an ephemeral job.
    pub async fn run_once(&self, record: &CrontabJobRecord, market: Option<String>, export: bool) -> LaunchReport {
        let guard = self.tmp.register(record.id);
        self.execute(record, guard.process_id(), guard.token.clone(), market, export)
            .await
    }

    async fn execute(
        &self,
        record: &CrontabJobRecord,
        process_id: u64,
        token: CancellationToken,
        market: Option<String>,
        export: bool,
    ) -> LaunchReport {
        info!(job_id = record.id, process_id, name = %record.name, "job started");
        self.mark_started(record);

        let unit = CommandUnit::new(&self.ctx, JobKind::Crontab, record.id, record.commands.clone())
            .label(record.name.clone())
            .market(market)
            .settings(record.process_settings())
            .export_log(export)
            .cancel_token(token.clone())
            .timeout(Some(Duration::from_secs(record.timeout_secs)));

        let report = if record.depends.is_empty() {
            unit.launch().await
        } else {
            let entries = self.depend_entries(record, process_id);
            let resolution = self.depend.resolve(entries, self.depend_timeout, &token).await;
            let unit = unit.initial_content(&resolution.content);
            match resolution.result {
                Ok(()) => unit.launch().await,
                Err(err) => {
                    warn!(job_id = record.id, process_id, error = %err, "dependencies failed; job not run");
                    unit.reject(err)
                }
            }
        };

        info!(
            job_id = record.id,
            process_id,
            cost_ms = report.cost.as_millis() as u64,
            success = report.outcome.is_success(),
            "job finished"
        );
        self.mark_finished(record, &report);
        report
    }

    fn depend_entries(&self, record: &CrontabJobRecord, process_id: u64) -> Vec<DependEntry> {
        let job_unique_id = format!(
            "{}-{}-{}-{}",
            record.id,
            process_id,
            self.ctx.clock.now().timestamp_micros(),
            self.seq.fetch_add(1, Ordering::Relaxed)
        );
        record
            .depends
            .iter()
            .enumerate()
            .map(|(id, spec)| DependEntry {
                job_id: record.id,
                process_id,
                job_unique_id: job_unique_id.clone(),
                id,
                from: self.ctx.node_addr.clone(),
                dest: if spec.dest.is_empty() {
                    self.ctx.node_addr.clone()
                } else {
                    spec.dest.clone()
                },
                name: if spec.name.is_empty() {
                    format!("{}-depend-{id}", record.name)
                } else {
                    spec.name.clone()
                },
                commands: spec.commands.clone(),
                ..Default::default()
            })
            .collect()
    }

    fn mark_started(&self, record: &CrontabJobRecord) {
        let updated = self.store.crontab().update(&Filter::by_id(record.id), &mut |r| {
            r.process_num += 1;
            if r.status == JobStatus::Timing {
                r.status = JobStatus::Running;
            }
        });
        if let Err(err) = updated {
            warn!(job_id = record.id, error = %err, "failed to record job start");
        }
    }

    fn mark_finished(&self, record: &CrontabJobRecord, report: &LaunchReport) {
        let exit_status = match report.outcome.error() {
            None => "success".to_string(),
            Some(err) => err.to_string(),
        };
        let updated = self.store.crontab().update(&Filter::by_id(record.id), &mut |r| {
            r.process_num = r.process_num.saturating_sub(1);
            r.last_exec_time = Some(report.started_at);
            r.last_cost_ms = report.cost.as_millis() as u64;
            r.last_exit_status = exit_status.clone();
            if r.status == JobStatus::Running && r.process_num == 0 {
                r.status = JobStatus::Timing;
            }
        });
        match updated {
            Ok(_) => debug!(job_id = record.id, "job bookkeeping updated"),
            Err(err) => warn!(job_id = record.id, error = %err, "failed to record job result"),
        }
    }
}
