// src/store/records.rs

//! Persisted job records as exchanged with the job store and RPC callers.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::exec::ProcessSettings;
use crate::types::{JobId, JobStatus};

/// Calendar fields of a crontab job. Each is a set-or-wildcard expression;
/// empty means wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeArgs {
    pub second: String,
    pub minute: String,
    pub hour: String,
    pub day: String,
    pub month: String,
    pub weekday: String,
}

/// A step that must complete before the declaring job runs its own commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependSpec {
    pub name: String,
    /// Node that runs the step; empty means this node.
    pub dest: String,
    pub commands: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrontabJobRecord {
    pub id: JobId,
    pub name: String,
    /// Argv groups; more than one group runs as a pipe chain.
    pub commands: Vec<Vec<String>>,
    pub work_dir: String,
    pub work_user: String,
    pub work_env: Vec<String>,
    pub time_args: TimeArgs,
    pub max_concurrent: u32,
    /// 0 disables the timeout.
    pub timeout_secs: u64,
    pub kill_child_process: bool,
    pub depends: Vec<DependSpec>,

    pub group_id: u64,
    pub created_user_id: u64,
    pub created_username: String,
    pub status: JobStatus,
    pub last_exec_time: Option<DateTime<Local>>,
    pub last_cost_ms: u64,
    pub last_exit_status: String,
    pub process_num: u32,
    pub created_at: Option<DateTime<Local>>,
    pub updated_at: Option<DateTime<Local>>,
    pub deleted_at: Option<DateTime<Local>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonJobRecord {
    pub id: JobId,
    pub name: String,
    pub commands: Vec<Vec<String>>,
    pub work_dir: String,
    pub work_user: String,
    pub work_env: Vec<String>,
    /// Restart after a failed exit.
    pub failed_restart: bool,
    /// Maximum number of restarts; 0 means unlimited.
    pub retry_num: u32,
    pub kill_child_process: bool,

    pub group_id: u64,
    pub created_user_id: u64,
    pub created_username: String,
    pub status: JobStatus,
    pub start_at: Option<DateTime<Local>>,
    pub created_at: Option<DateTime<Local>>,
    pub updated_at: Option<DateTime<Local>>,
    pub deleted_at: Option<DateTime<Local>>,
}

fn settings_from(work_dir: &str, work_user: &str, work_env: &[String], kill_child_process: bool) -> ProcessSettings {
    ProcessSettings {
        dir: (!work_dir.is_empty()).then(|| PathBuf::from(work_dir)),
        env: work_env.to_vec(),
        user: (!work_user.is_empty()).then(|| work_user.to_string()),
        kill_child_process,
    }
}

impl CrontabJobRecord {
    pub fn process_settings(&self) -> ProcessSettings {
        settings_from(&self.work_dir, &self.work_user, &self.work_env, self.kill_child_process)
    }
}

impl DaemonJobRecord {
    pub fn process_settings(&self) -> ProcessSettings {
        settings_from(&self.work_dir, &self.work_user, &self.work_env, self.kill_child_process)
    }
}

/// What the store needs to know about a record to filter, scope and audit it.
pub trait JobRecord: Clone + Send + Sync + 'static {
    fn id(&self) -> JobId;
    fn set_id(&mut self, id: JobId);
    fn group_id(&self) -> u64;
    fn created_user_id(&self) -> u64;
    fn status(&self) -> JobStatus;
    fn set_status(&mut self, status: JobStatus);
    fn matches_text(&self, needle: &str) -> bool;
    fn deleted_at(&self) -> Option<DateTime<Local>>;
    fn set_deleted_at(&mut self, at: DateTime<Local>);
    fn stamp(&mut self, now: DateTime<Local>);
    /// Copy fields an edit must never overwrite from the stored version.
    fn keep_audit_fields(&mut self, stored: &Self);
}

fn commands_contain(commands: &[Vec<String>], needle: &str) -> bool {
    commands.iter().flatten().any(|token| token.contains(needle))
}

impl JobRecord for CrontabJobRecord {
    fn id(&self) -> JobId {
        self.id
    }

    fn set_id(&mut self, id: JobId) {
        self.id = id;
    }

    fn group_id(&self) -> u64 {
        self.group_id
    }

    fn created_user_id(&self) -> u64 {
        self.created_user_id
    }

    fn status(&self) -> JobStatus {
        self.status
    }

    fn set_status(&mut self, status: JobStatus) {
        self.status = status;
    }

    fn matches_text(&self, needle: &str) -> bool {
        self.name.contains(needle) || commands_contain(&self.commands, needle)
    }

    fn deleted_at(&self) -> Option<DateTime<Local>> {
        self.deleted_at
    }

    fn set_deleted_at(&mut self, at: DateTime<Local>) {
        self.deleted_at = Some(at);
    }

    fn stamp(&mut self, now: DateTime<Local>) {
        self.created_at.get_or_insert(now);
        self.updated_at = Some(now);
    }

    fn keep_audit_fields(&mut self, stored: &Self) {
        self.created_at = stored.created_at;
        self.deleted_at = stored.deleted_at;
        self.created_user_id = stored.created_user_id;
        self.created_username = stored.created_username.clone();
        self.group_id = stored.group_id;
        self.last_cost_ms = stored.last_cost_ms;
        self.last_exec_time = stored.last_exec_time;
        self.last_exit_status = stored.last_exit_status.clone();
        self.process_num = stored.process_num;
    }
}

impl JobRecord for DaemonJobRecord {
    fn id(&self) -> JobId {
        self.id
    }

    fn set_id(&mut self, id: JobId) {
        self.id = id;
    }

    fn group_id(&self) -> u64 {
        self.group_id
    }

    fn created_user_id(&self) -> u64 {
        self.created_user_id
    }

    fn status(&self) -> JobStatus {
        self.status
    }

    fn set_status(&mut self, status: JobStatus) {
        self.status = status;
    }

    fn matches_text(&self, needle: &str) -> bool {
        self.name.contains(needle) || commands_contain(&self.commands, needle)
    }

    fn deleted_at(&self) -> Option<DateTime<Local>> {
        self.deleted_at
    }

    fn set_deleted_at(&mut self, at: DateTime<Local>) {
        self.deleted_at = Some(at);
    }

    fn stamp(&mut self, now: DateTime<Local>) {
        self.created_at.get_or_insert(now);
        self.updated_at = Some(now);
    }

    fn keep_audit_fields(&mut self, stored: &Self) {
        self.created_at = stored.created_at;
        self.deleted_at = stored.deleted_at;
        self.created_user_id = stored.created_user_id;
        self.created_username = stored.created_username.clone();
        self.group_id = stored.group_id;
        self.start_at = stored.start_at;
    }
}
