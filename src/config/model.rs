// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::{CrontabJobRecord, DaemonJobRecord};

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [agent]
/// node_addr = "10.0.0.5:20001"
/// log_path = "/var/log/crontabd"
/// depend_timeout = "10m"
///
/// [[crontab_job]]
/// id = 1
/// name = "backup"
/// enabled = true
/// commands = [["tar", "czf", "/tmp/etc.tgz", "/etc"]]
/// time_args = { second = "0", minute = "0", hour = "3" }
///
/// [[daemon_job]]
/// id = 1
/// name = "worker"
/// enabled = true
/// commands = [["./worker", "--serve"]]
/// failed_restart = true
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub crontab_job: Vec<SeedCrontabJob>,

    #[serde(default)]
    pub daemon_job: Vec<SeedDaemonJob>,
}

/// `[agent]` section. Durations use the `<n>ms|s|m|h` grammar.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentSection {
    /// Written into log prefixes; also this node's dependency routing tag.
    pub node_addr: String,
    pub log_path: PathBuf,
    pub verbose_job_log: bool,
    pub depend_queue_size: usize,
    pub depend_timeout: String,
    pub daemon_restart_delay: String,
    /// How long a kill request waits for processes to go away before
    /// logging a warning.
    pub kill_grace: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            node_addr: "127.0.0.1:20001".to_string(),
            log_path: PathBuf::from("logs"),
            verbose_job_log: false,
            depend_queue_size: 100,
            depend_timeout: "10m".to_string(),
            daemon_restart_delay: "3s".to_string(),
            kill_grace: "5s".to_string(),
        }
    }
}

/// `[[crontab_job]]` entry: a record plus whether to schedule it at boot.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedCrontabJob {
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub job: CrontabJobRecord,
}

/// `[[daemon_job]]` entry: a record plus whether to start it at boot.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedDaemonJob {
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub job: DaemonJobRecord,
}

/// Agent settings with durations parsed.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub node_addr: String,
    pub log_path: PathBuf,
    pub verbose_job_log: bool,
    pub depend_queue_size: usize,
    pub depend_timeout: Duration,
    pub daemon_restart_delay: Duration,
    pub kill_grace: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            node_addr: "127.0.0.1:20001".to_string(),
            log_path: PathBuf::from("logs"),
            verbose_job_log: false,
            depend_queue_size: 100,
            depend_timeout: Duration::from_secs(600),
            daemon_restart_delay: Duration::from_secs(3),
            kill_grace: Duration::from_secs(5),
        }
    }
}

/// Validated configuration. Construct through `ConfigFile::try_from`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub agent: AgentSettings,
    pub crontab_jobs: Vec<SeedCrontabJob>,
    pub daemon_jobs: Vec<SeedDaemonJob>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        agent: AgentSettings,
        crontab_jobs: Vec<SeedCrontabJob>,
        daemon_jobs: Vec<SeedDaemonJob>,
    ) -> Self {
        Self {
            agent,
            crontab_jobs,
            daemon_jobs,
        }
    }
}
