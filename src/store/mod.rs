// src/store/mod.rs

//! Job store collaborator.
//!
//! The agent never owns job definitions; it reads and mutates them through
//! the [`JobStore`] interface: scoped filters, counting, ordered/paged finds,
//! scoped saves and soft deletes. [`memory::MemoryStore`] is the in-process
//! implementation used for seeded configs and tests.

use std::cmp::Reverse;
use std::fmt::Debug;

use crate::errors::{AgentError, Result};
use crate::types::{JobId, JobStatus, Scope};

pub mod memory;
pub mod records;

pub use memory::{MemoryStore, MemoryTable};
pub use records::{CrontabJobRecord, DaemonJobRecord, DependSpec, JobRecord, TimeArgs};

/// Record selection. Unset fields do not constrain; soft-deleted records
/// never match.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub ids: Option<Vec<JobId>>,
    pub scope: Option<Scope>,
    pub statuses: Option<Vec<JobStatus>>,
    pub search: Option<String>,
}

impl Filter {
    pub fn scoped(scope: Scope) -> Self {
        Self {
            scope: Some(scope),
            ..Default::default()
        }
    }

    pub fn by_id(id: JobId) -> Self {
        Self::default().ids(vec![id])
    }

    pub fn ids(mut self, ids: Vec<JobId>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn statuses(mut self, statuses: &[JobStatus]) -> Self {
        self.statuses = Some(statuses.to_vec());
        self
    }

    pub fn search(mut self, text: &str) -> Self {
        if !text.is_empty() {
            self.search = Some(text.to_string());
        }
        self
    }

    pub fn matches<R: JobRecord>(&self, record: &R) -> bool {
        if record.deleted_at().is_some() {
            return false;
        }
        if let Some(ids) = &self.ids {
            if !ids.contains(&record.id()) {
                return false;
            }
        }
        if let Some(scope) = &self.scope {
            if !scope.allows(record.group_id(), record.created_user_id()) {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&record.status()) {
                return false;
            }
        }
        if let Some(text) = &self.search {
            if !record.matches_text(text) {
                return false;
            }
        }
        true
    }
}

/// Ordering + pagination: the caller's own records first, then newest ID.
#[derive(Debug, Clone, Copy)]
pub struct Paging {
    pub owner_first: u64,
    /// 1-based.
    pub page: u64,
    pub pagesize: u64,
}

impl Paging {
    pub fn apply<R: JobRecord>(&self, mut records: Vec<R>) -> Vec<R> {
        records.sort_by_key(|r| (r.created_user_id() != self.owner_first, Reverse(r.id())));
        let page = self.page.max(1);
        let skip = usize::try_from((page - 1).saturating_mul(self.pagesize)).unwrap_or(usize::MAX);
        let take = usize::try_from(self.pagesize).unwrap_or(usize::MAX);
        records.into_iter().skip(skip).take(take).collect()
    }
}

/// Generic query/update interface over one table of job records.
pub trait JobTable<R: JobRecord>: Send + Sync {
    fn count(&self, filter: &Filter) -> Result<u64>;

    fn find(&self, filter: &Filter, paging: Option<&Paging>) -> Result<Vec<R>>;

    /// First match or [`AgentError::RecordNotFound`].
    fn take(&self, filter: &Filter) -> Result<R> {
        self.find(filter, None)?
            .into_iter()
            .next()
            .ok_or(AgentError::RecordNotFound)
    }

    /// Insert a record. ID 0 allocates a fresh ID.
    fn insert(&self, record: R) -> Result<R>;

    /// Replace the record with `record.id()` if it matches `filter`, keeping
    /// its audit fields.
    fn save(&self, filter: &Filter, record: R) -> Result<R>;

    /// Apply `change` to every match; returns the updated records.
    fn update(&self, filter: &Filter, change: &mut dyn FnMut(&mut R)) -> Result<Vec<R>>;

    /// Mark every match deleted; returns them as they were before deletion.
    fn soft_delete(&self, filter: &Filter) -> Result<Vec<R>>;
}

pub trait JobStore: Send + Sync + Debug {
    fn crontab(&self) -> &dyn JobTable<CrontabJobRecord>;
    fn daemon(&self) -> &dyn JobTable<DaemonJobRecord>;
}
