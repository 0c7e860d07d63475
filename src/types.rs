use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a persisted crontab or daemon job.
pub type JobId = u64;

/// Group whose members see every record regardless of ownership.
pub const SUPER_GROUP_ID: u64 = 1;

/// Lifecycle status stored on job records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created but not yet approved by an operator.
    Unaudited,
    /// Approved and idle.
    #[default]
    Ok,
    /// Registered with the scheduler, waiting for its next tick.
    Timing,
    /// At least one process is currently executing.
    Running,
    /// Explicitly stopped.
    Stop,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Unaudited => "unaudited",
            JobStatus::Ok => "ok",
            JobStatus::Timing => "timing",
            JobStatus::Running => "running",
            JobStatus::Stop => "stop",
        };
        f.write_str(s)
    }
}

/// Which family of job a log file or registry entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Crontab,
    Daemon,
}

impl JobKind {
    /// Directory under the log root holding this kind's log files.
    pub fn log_dir_name(self) -> &'static str {
        match self {
            JobKind::Crontab => "crontab_task",
            JobKind::Daemon => "daemon_job",
        }
    }
}

/// Caller identity used to scope every query against the job store.
///
/// - `group_id == SUPER_GROUP_ID`: every record is visible.
/// - `root`: every record of `group_id` is visible.
/// - otherwise: only records created by `user_id` inside `group_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Scope {
    pub user_id: u64,
    pub group_id: u64,
    pub root: bool,
}

impl Scope {
    pub fn super_group() -> Self {
        Self {
            user_id: 0,
            group_id: SUPER_GROUP_ID,
            root: true,
        }
    }

    pub fn allows(&self, group_id: u64, created_user_id: u64) -> bool {
        if self.group_id == SUPER_GROUP_ID {
            return true;
        }
        if self.root {
            return self.group_id == group_id;
        }
        self.group_id == group_id && self.user_id == created_user_id
    }
}

/// Time unit accepted by the log cleaning RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanUnit {
    Day,
    Month,
}

impl FromStr for CleanUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" => Ok(CleanUnit::Day),
            "month" => Ok(CleanUnit::Month),
            other => Err(format!(
                "invalid clean unit: {other} (expected \"day\" or \"month\")"
            )),
        }
    }
}
