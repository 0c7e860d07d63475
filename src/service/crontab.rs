// src/service/crontab.rs

use std::sync::Arc;

use tracing::{info, warn};

use super::proto::{
    ActionJobsArgs, EditCrontabJobArgs, ExecCrontabJobReply, GetJobArgs, JobPage, QueryJobArgs,
    SearchLogArgs, SearchLogResult,
};
use super::{log_date_dir, log_file_name, paging, LogFinder};
use crate::agent::Agent;
use crate::depend::DependEntry;
use crate::engine::MANUAL_MARKET;
use crate::errors::{AgentError, Result};
use crate::store::{CrontabJobRecord, Filter, JobTable};
use crate::types::{JobKind, JobStatus, Scope};

/// `CrontabJob.*` RPCs.
#[derive(Debug, Clone)]
pub struct CrontabJobService {
    agent: Arc<Agent>,
}

impl CrontabJobService {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent }
    }

    fn table(&self) -> &dyn JobTable<CrontabJobRecord> {
        self.agent.store().crontab()
    }

    pub fn list(&self, args: QueryJobArgs) -> Result<JobPage<CrontabJobRecord>> {
        let filter = Filter::scoped(args.scope).search(&args.search_txt);
        let paging = paging(&args.scope, args.page, args.pagesize);
        Ok(JobPage {
            total: self.table().count(&filter)?,
            list: self.table().find(&filter, Some(&paging))?,
            page: paging.page,
            pagesize: paging.pagesize,
        })
    }

    pub fn get(&self, args: GetJobArgs) -> Result<CrontabJobRecord> {
        self.table().take(&Filter::scoped(args.scope).ids(vec![args.job_id]))
    }

    /// ID 0 inserts. Otherwise the live entry is killed and evicted, the
    /// record saved (audit fields kept) and, if it was scheduled,
    /// scheduled again with the new definition.
    pub async fn edit(&self, args: EditCrontabJobArgs) -> Result<CrontabJobRecord> {
        let mut job = args.job;
        job.max_concurrent = job.max_concurrent.max(1);

        if job.id == 0 {
            if job.created_user_id == 0 {
                job.created_user_id = args.scope.user_id;
            }
            if job.group_id == 0 {
                job.group_id = args.scope.group_id;
            }
            return self.table().insert(job);
        }

        self.agent.evict(job.id).await;
        let saved = self.table().save(&Filter::scoped(args.scope), job)?;
        if matches!(saved.status, JobStatus::Timing | JobStatus::Running) {
            self.agent.schedule(saved.clone())?;
        }
        Ok(saved)
    }

    /// Move `unaudited` records to `ok`. Only the group matters here, not
    /// the creator.
    pub fn audit(&self, args: ActionJobsArgs) -> Result<Vec<CrontabJobRecord>> {
        let scope = Scope {
            root: true,
            ..args.scope
        };
        let filter = Filter::scoped(scope)
            .ids(args.job_ids)
            .statuses(&[JobStatus::Unaudited]);
        self.table().update(&filter, &mut |r| r.status = JobStatus::Ok)
    }

    /// Push `ok`/`stop` records into the live registry and mark them `timing`.
    pub fn start(&self, args: ActionJobsArgs) -> Result<Vec<CrontabJobRecord>> {
        if args.job_ids.is_empty() {
            return Err(AgentError::EmptyIds);
        }
        let filter = Filter::scoped(args.scope)
            .ids(args.job_ids)
            .statuses(&[JobStatus::Ok, JobStatus::Stop]);
        let records = self.table().find(&filter, None)?;

        let mut started = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id;
            match self.agent.schedule(record) {
                Ok(()) => {}
                Err(AgentError::AlreadyScheduled(_)) => warn!(job_id = id, "job already scheduled"),
                Err(err) => return Err(err),
            }
            started.extend(self.table().update(&Filter::by_id(id), &mut |r| r.status = JobStatus::Timing)?);
        }
        info!(count = started.len(), "crontab jobs started");
        Ok(started)
    }

    /// Kill and evict `timing`/`running` records, then mark them `stop`.
    pub async fn stop(&self, args: ActionJobsArgs) -> Result<Vec<CrontabJobRecord>> {
        let filter = Filter::scoped(args.scope)
            .ids(args.job_ids)
            .statuses(&[JobStatus::Timing, JobStatus::Running]);
        let records = self.table().find(&filter, None)?;
        for record in &records {
            self.agent.evict(record.id).await;
        }
        let ids = records.iter().map(|r| r.id).collect();
        self.table().update(&Filter::default().ids(ids), &mut |r| {
            r.status = JobStatus::Stop;
            r.process_num = 0;
        })
    }

    pub async fn delete(&self, args: ActionJobsArgs) -> Result<Vec<CrontabJobRecord>> {
        let filter = Filter::scoped(args.scope).ids(args.job_ids);
        let records = self.table().find(&filter, None)?;
        for record in &records {
            self.agent.evict(record.id).await;
            let dropped = self.agent.depend().forget_job(record.id);
            if dropped > 0 {
                warn!(job_id = record.id, dropped, "pending dependency steps dropped");
            }
        }
        let ids = records.iter().map(|r| r.id).collect();
        self.table().soft_delete(&Filter::default().ids(ids))
    }

    /// Terminate running processes of the given jobs. They stay scheduled.
    pub async fn kill(&self, args: ActionJobsArgs) -> Result<Vec<CrontabJobRecord>> {
        let records = self.table().find(&Filter::scoped(args.scope).ids(args.job_ids), None)?;
        if records.is_empty() {
            return Err(AgentError::RecordNotFound);
        }
        for record in &records {
            self.agent.kill_task(record.id).await;
        }
        Ok(records)
    }

    /// Fire ephemeral runs in the background.
    pub fn execs(&self, args: ActionJobsArgs) -> Result<Vec<CrontabJobRecord>> {
        let records = self.table().find(&Filter::scoped(args.scope).ids(args.job_ids), None)?;
        for record in records.iter().cloned() {
            let runner = self.agent.runner().clone();
            tokio::spawn(async move { runner.run_once(&record, None, false).await });
        }
        Ok(records)
    }

    /// Run once, synchronously, and return the captured output.
    pub async fn exec(&self, args: GetJobArgs) -> Result<ExecCrontabJobReply> {
        let job = self.get(args)?;
        let report = self
            .agent
            .runner()
            .run_once(&job, Some(MANUAL_MARKET.to_string()), true)
            .await;
        Ok(ExecCrontabJobReply {
            job,
            content: report.content,
        })
    }

    pub fn log(&self, args: SearchLogArgs) -> Result<SearchLogResult> {
        log_search(&self.agent, JobKind::Crontab, &args)
    }

    pub fn exec_depend(&self, entry: DependEntry) -> bool {
        self.agent.depend().exec_depend(entry)
    }

    pub fn set_depend_done(&self, entry: DependEntry) -> bool {
        self.agent.depend().set_depend_done(entry)
    }
}

pub(super) fn log_search(agent: &Agent, kind: JobKind, args: &SearchLogArgs) -> Result<SearchLogResult> {
    let path = agent
        .ctx()
        .log_dir(kind)
        .join(log_date_dir(&args.date)?)
        .join(log_file_name(args.job_id));
    LogFinder::new(&args.pattern, args.pagesize)?
        .tail(args.is_tail)
        .search(&path, args.offset)
}
