// src/service/daemon.rs

use std::sync::Arc;

use chrono::Local;
use tracing::info;

use super::crontab::log_search;
use super::paging;
use super::proto::{ActionJobsArgs, EditDaemonJobArgs, GetJobArgs, JobPage, QueryJobArgs, SearchLogArgs, SearchLogResult};
use crate::agent::Agent;
use crate::errors::Result;
use crate::store::{DaemonJobRecord, Filter, JobTable};
use crate::types::{JobKind, JobStatus};

/// `DaemonJob.*` RPCs.
#[derive(Debug, Clone)]
pub struct DaemonJobService {
    agent: Arc<Agent>,
}

impl DaemonJobService {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent }
    }

    fn table(&self) -> &dyn JobTable<DaemonJobRecord> {
        self.agent.store().daemon()
    }

    pub fn list(&self, args: QueryJobArgs) -> Result<JobPage<DaemonJobRecord>> {
        let filter = Filter::scoped(args.scope).search(&args.search_txt);
        let paging = paging(&args.scope, args.page, args.pagesize);
        Ok(JobPage {
            total: self.table().count(&filter)?,
            list: self.table().find(&filter, Some(&paging))?,
            page: paging.page,
            pagesize: paging.pagesize,
        })
    }

    pub fn get(&self, args: GetJobArgs) -> Result<DaemonJobRecord> {
        self.table().take(&Filter::scoped(args.scope).ids(vec![args.job_id]))
    }

    /// ID 0 inserts. Otherwise the running daemon is popped, the record
    /// saved and restarted if it was running.
    pub fn edit(&self, args: EditDaemonJobArgs) -> Result<DaemonJobRecord> {
        let mut job = args.job;
        if job.id == 0 {
            if job.created_user_id == 0 {
                job.created_user_id = args.scope.user_id;
            }
            if job.group_id == 0 {
                job.group_id = args.scope.group_id;
            }
            return self.table().insert(job);
        }

        self.agent.daemons().pop_job(job.id);
        let saved = self.table().save(&Filter::scoped(args.scope), job)?;
        if saved.status == JobStatus::Running {
            self.agent.start_daemon(saved.clone());
        }
        Ok(saved)
    }

    pub fn audit(&self, args: ActionJobsArgs) -> Result<Vec<DaemonJobRecord>> {
        let filter = Filter::scoped(args.scope)
            .ids(args.job_ids)
            .statuses(&[JobStatus::Unaudited]);
        self.table().update(&filter, &mut |r| r.status = JobStatus::Ok)
    }

    /// Start supervising `ok`/`stop` records and mark them `running`.
    pub fn start(&self, args: ActionJobsArgs) -> Result<Vec<DaemonJobRecord>> {
        let filter = Filter::scoped(args.scope)
            .ids(args.job_ids)
            .statuses(&[JobStatus::Ok, JobStatus::Stop]);
        let records = self.table().find(&filter, None)?;
        let ids = records.iter().map(|r| r.id).collect();

        let now = Local::now();
        let started = self.table().update(&Filter::default().ids(ids), &mut |r| {
            r.status = JobStatus::Running;
            r.start_at = Some(now);
        })?;
        for record in &started {
            self.agent.start_daemon(record.clone());
        }
        info!(count = started.len(), "daemon jobs started");
        Ok(started)
    }

    pub fn stop(&self, args: ActionJobsArgs) -> Result<Vec<DaemonJobRecord>> {
        let filter = Filter::scoped(args.scope)
            .ids(args.job_ids)
            .statuses(&[JobStatus::Running, JobStatus::Timing]);
        let records = self.table().find(&filter, None)?;
        for record in &records {
            self.agent.daemons().pop_job(record.id);
        }
        let ids = records.iter().map(|r| r.id).collect();
        self.table().update(&Filter::default().ids(ids), &mut |r| r.status = JobStatus::Stop)
    }

    pub fn delete(&self, args: ActionJobsArgs) -> Result<Vec<DaemonJobRecord>> {
        let records = self.table().find(&Filter::scoped(args.scope).ids(args.job_ids), None)?;
        for record in &records {
            self.agent.daemons().pop_job(record.id);
        }
        let ids = records.iter().map(|r| r.id).collect();
        self.table().soft_delete(&Filter::default().ids(ids))
    }

    pub fn log(&self, args: SearchLogArgs) -> Result<SearchLogResult> {
        log_search(&self.agent, JobKind::Daemon, &args)
    }
}
