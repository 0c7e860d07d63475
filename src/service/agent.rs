// src/service/agent.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::Local;
use tracing::info;

use super::clean::{cutoff, dir_size, human_size, remove_older_than};
use super::proto::{CleanLogFilesArgs, CleanLogFilesReply};
use crate::agent::Agent;
use crate::errors::Result;

/// Node-level RPCs: liveness, host information and log cleanup.
#[derive(Debug, Clone)]
pub struct AgentService {
    agent: Arc<Agent>,
}

impl AgentService {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent }
    }

    pub fn ping(&self) -> Result<()> {
        Ok(())
    }

    pub async fn system_info(&self) -> Result<BTreeMap<String, String>> {
        let ctx = self.agent.ctx();
        let log_root = ctx.log_root.clone();
        let log_size = tokio::task::spawn_blocking(move || dir_size(&log_root))
            .await
            .map_err(anyhow::Error::from)?;
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let mut info = BTreeMap::new();
        info.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());
        info.insert("pid".to_string(), std::process::id().to_string());
        info.insert("node_addr".to_string(), ctx.node_addr.clone());
        info.insert("os".to_string(), std::env::consts::OS.to_string());
        info.insert("arch".to_string(), std::env::consts::ARCH.to_string());
        info.insert("cpu_count".to_string(), cpus.to_string());
        info.insert("uptime".to_string(), format!("{}s", self.agent.uptime().as_secs()));
        info.insert("crontab_jobs".to_string(), self.agent.crontab().len().to_string());
        info.insert("daemon_jobs".to_string(), self.agent.daemons().len().to_string());
        info.insert("tmp_jobs".to_string(), self.agent.tmp_jobs().len().to_string());
        info.insert("pending_depends".to_string(), self.agent.depend().pending_len().to_string());
        info.insert("log_size".to_string(), human_size(log_size));
        Ok(info)
    }

    /// Remove log files last modified before `now - offset`.
    pub async fn clean_log_files(&self, args: CleanLogFilesArgs) -> Result<CleanLogFilesReply> {
        let cutoff = SystemTime::from(cutoff(Local::now(), args.unit, args.offset)?);
        let root = self.agent.ctx().log_root.clone();
        let (total, size) = tokio::task::spawn_blocking(move || remove_older_than(&root, cutoff))
            .await
            .map_err(anyhow::Error::from)??;
        info!(total, size, "log files cleaned");
        Ok(CleanLogFilesReply {
            total,
            size: human_size(size),
        })
    }
}
