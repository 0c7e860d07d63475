// src/store/memory.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Local;

use super::{CrontabJobRecord, DaemonJobRecord, Filter, JobRecord, JobStore, JobTable, Paging};
use crate::errors::{AgentError, Result};
use crate::types::JobId;

struct Rows<R> {
    next_id: JobId,
    rows: BTreeMap<JobId, R>,
}

/// Mutex-guarded table of records.
pub struct MemoryTable<R> {
    inner: Mutex<Rows<R>>,
}

impl<R> Default for MemoryTable<R> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Rows {
                next_id: 1,
                rows: BTreeMap::new(),
            }),
        }
    }
}

impl<R> fmt::Debug for MemoryTable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.lock().rows.len();
        f.debug_struct("MemoryTable").field("rows", &len).finish()
    }
}

impl<R> MemoryTable<R> {
    fn lock(&self) -> MutexGuard<'_, Rows<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R: JobRecord> JobTable<R> for MemoryTable<R> {
    fn count(&self, filter: &Filter) -> Result<u64> {
        let rows = self.lock();
        Ok(rows.rows.values().filter(|r| filter.matches(*r)).count() as u64)
    }

    fn find(&self, filter: &Filter, paging: Option<&Paging>) -> Result<Vec<R>> {
        let found: Vec<R> = {
            let rows = self.lock();
            rows.rows.values().filter(|r| filter.matches(*r)).cloned().collect()
        };
        Ok(match paging {
            Some(paging) => paging.apply(found),
            None => found,
        })
    }

    fn insert(&self, mut record: R) -> Result<R> {
        let mut rows = self.lock();
        if record.id() == 0 {
            record.set_id(rows.next_id);
        } else if rows.rows.contains_key(&record.id()) {
            return Err(AgentError::DuplicateRecord(record.id()));
        }
        rows.next_id = rows.next_id.max(record.id() + 1);
        record.stamp(Local::now());
        rows.rows.insert(record.id(), record.clone());
        Ok(record)
    }

    fn save(&self, filter: &Filter, mut record: R) -> Result<R> {
        let mut rows = self.lock();
        let stored = rows
            .rows
            .get_mut(&record.id())
            .filter(|stored| filter.matches(&**stored))
            .ok_or(AgentError::RecordNotFound)?;
        record.keep_audit_fields(stored);
        record.stamp(Local::now());
        *stored = record.clone();
        Ok(record)
    }

    fn update(&self, filter: &Filter, change: &mut dyn FnMut(&mut R)) -> Result<Vec<R>> {
        let now = Local::now();
        let mut rows = self.lock();
        let mut updated = Vec::new();
        for record in rows.rows.values_mut().filter(|r| filter.matches(&**r)) {
            change(record);
            record.stamp(now);
            updated.push(record.clone());
        }
        Ok(updated)
    }

    fn soft_delete(&self, filter: &Filter) -> Result<Vec<R>> {
        let now = Local::now();
        let mut rows = self.lock();
        let mut deleted = Vec::new();
        for record in rows.rows.values_mut().filter(|r| filter.matches(&**r)) {
            deleted.push(record.clone());
            record.set_deleted_at(now);
        }
        Ok(deleted)
    }
}

/// In-process job store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    crontab: MemoryTable<CrontabJobRecord>,
    daemon: MemoryTable<DaemonJobRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryStore {
    fn crontab(&self) -> &dyn JobTable<CrontabJobRecord> {
        &self.crontab
    }

    fn daemon(&self) -> &dyn JobTable<DaemonJobRecord> {
        &self.daemon
    }
}
