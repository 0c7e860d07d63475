#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use crontabd::agent::Agent;
use crontabd::clock::Clock;
use crontabd::config::AgentSettings;
use crontabd::context::NodeContext;
use crontabd::depend::{DependTransport, LocalOnlyTransport};
use crontabd::store::{CrontabJobRecord, DaemonJobRecord, DependSpec, MemoryStore, TimeArgs};
use crontabd::types::JobStatus;
use tempfile::TempDir;

pub fn argv(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|s| s.to_string()).collect()
}

/// Builder for `CrontabJobRecord`.
pub struct CrontabJobBuilder {
    job: CrontabJobRecord,
}

impl CrontabJobBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            job: CrontabJobRecord {
                name: name.to_string(),
                max_concurrent: 1,
                group_id: 2,
                created_user_id: 1,
                ..Default::default()
            },
        }
    }

    pub fn id(mut self, id: u64) -> Self {
        self.job.id = id;
        self
    }

    /// Append one argv group; several groups form a pipe chain.
    pub fn command(mut self, tokens: &[&str]) -> Self {
        self.job.commands.push(argv(tokens));
        self
    }

    /// Every field a wildcard: fires every second.
    pub fn every_second(mut self) -> Self {
        self.job.time_args = TimeArgs::default();
        self
    }

    /// A schedule that never matches inside the test's lifetime.
    pub fn never(mut self) -> Self {
        self.job.time_args = TimeArgs {
            month: "2".to_string(),
            day: "31".to_string(),
            ..Default::default()
        };
        self
    }

    pub fn depend(mut self, name: &str, dest: &str, commands: &[&[&str]]) -> Self {
        self.job.depends.push(DependSpec {
            name: name.to_string(),
            dest: dest.to_string(),
            commands: commands.iter().map(|c| argv(c)).collect(),
        });
        self
    }

    pub fn max_concurrent(mut self, n: u32) -> Self {
        self.job.max_concurrent = n;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.job.timeout_secs = secs;
        self
    }

    pub fn kill_child_process(mut self, kill: bool) -> Self {
        self.job.kill_child_process = kill;
        self
    }

    pub fn owner(mut self, group_id: u64, user_id: u64) -> Self {
        self.job.group_id = group_id;
        self.job.created_user_id = user_id;
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn build(self) -> CrontabJobRecord {
        self.job
    }
}

/// Builder for `DaemonJobRecord`.
pub struct DaemonJobBuilder {
    job: DaemonJobRecord,
}

impl DaemonJobBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            job: DaemonJobRecord {
                name: name.to_string(),
                group_id: 2,
                created_user_id: 1,
                ..Default::default()
            },
        }
    }

    pub fn command(mut self, tokens: &[&str]) -> Self {
        self.job.commands.push(argv(tokens));
        self
    }

    pub fn failed_restart(mut self, restart: bool) -> Self {
        self.job.failed_restart = restart;
        self
    }

    pub fn retry_num(mut self, n: u32) -> Self {
        self.job.retry_num = n;
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn build(self) -> DaemonJobRecord {
        self.job
    }
}

/// Settings with short delays suited to tests.
pub fn test_settings(node_addr: &str, log_path: &std::path::Path) -> AgentSettings {
    AgentSettings {
        node_addr: node_addr.to_string(),
        log_path: log_path.to_path_buf(),
        verbose_job_log: false,
        depend_queue_size: 16,
        depend_timeout: Duration::from_secs(10),
        daemon_restart_delay: Duration::from_millis(50),
        kill_grace: Duration::from_secs(5),
    }
}

/// An agent with an in-memory store and its own temporary log root.
pub struct TestAgent {
    pub dir: TempDir,
    pub agent: Arc<Agent>,
}

impl TestAgent {
    pub fn new(node_addr: &str) -> Self {
        Self::with_transport(node_addr, Arc::new(LocalOnlyTransport))
    }

    pub fn with_transport(node_addr: &str, transport: Arc<dyn DependTransport>) -> Self {
        Self::build(node_addr, transport, None)
    }

    pub fn with_clock(node_addr: &str, clock: Arc<dyn Clock>) -> Self {
        Self::build(node_addr, Arc::new(LocalOnlyTransport), Some(clock))
    }

    fn build(node_addr: &str, transport: Arc<dyn DependTransport>, clock: Option<Arc<dyn Clock>>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = test_settings(node_addr, dir.path());
        let mut ctx = NodeContext::new(node_addr, dir.path());
        if let Some(clock) = clock {
            ctx = ctx.with_clock(clock);
        }
        let agent = Agent::new(ctx, settings, Arc::new(MemoryStore::new()), transport);
        Self { dir, agent }
    }

    /// Read `<log root>/<kind dir>/<today>/<id>.log` as a string.
    pub fn read_log(&self, kind_dir: &str, id: u64) -> String {
        let today = chrono::Local::now().format("%Y/%m/%d").to_string();
        let path = self.dir.path().join(kind_dir).join(today).join(format!("{id}.log"));
        std::fs::read_to_string(path).unwrap_or_default()
    }
}
