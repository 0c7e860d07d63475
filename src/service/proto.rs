// src/service/proto.rs

//! Request and reply records of the RPC surface. Transport-agnostic: the
//! wire encoding belongs to whatever carries them.

use serde::{Deserialize, Serialize};

use crate::store::{CrontabJobRecord, DaemonJobRecord};
use crate::types::{CleanUnit, JobId, Scope};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryJobArgs {
    #[serde(flatten)]
    pub scope: Scope,
    pub search_txt: String,
    /// 1-based.
    pub page: u64,
    pub pagesize: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobPage<T> {
    pub list: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub pagesize: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GetJobArgs {
    #[serde(flatten)]
    pub scope: Scope,
    pub job_id: JobId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionJobsArgs {
    #[serde(flatten)]
    pub scope: Scope,
    pub job_ids: Vec<JobId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditCrontabJobArgs {
    #[serde(flatten)]
    pub scope: Scope,
    pub job: CrontabJobRecord,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditDaemonJobArgs {
    #[serde(flatten)]
    pub scope: Scope,
    pub job: DaemonJobRecord,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecCrontabJobReply {
    pub job: CrontabJobRecord,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchLogArgs {
    #[serde(flatten)]
    pub scope: Scope,
    pub job_id: JobId,
    /// `YYYY/MM/DD`; empty means today.
    pub date: String,
    /// Regex; empty matches every line.
    pub pattern: String,
    /// Byte offset to continue from. In tail mode 0 means end of file.
    pub offset: u64,
    pub pagesize: usize,
    pub is_tail: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLogResult {
    pub content: Vec<u8>,
    pub offset: u64,
    pub file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanLogFilesArgs {
    pub unit: CleanUnit,
    pub offset: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanLogFilesReply {
    pub total: u64,
    /// Human-readable freed size.
    pub size: String,
}
