// src/context.rs

//! Per-node settings shared by every command unit launched on this agent.

use std::path::PathBuf;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::types::JobKind;

/// Settings every execution on this node needs: the address written into log
/// prefixes (and used as the local dependency routing tag), the log root and
/// the clock driving rotation.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub node_addr: String,
    pub log_root: PathBuf,
    pub verbose_job_log: bool,
    pub clock: Arc<dyn Clock>,
}

impl NodeContext {
    pub fn new(node_addr: impl Into<String>, log_root: impl Into<PathBuf>) -> Self {
        Self {
            node_addr: node_addr.into(),
            log_root: log_root.into(),
            verbose_job_log: false,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_verbose_job_log(mut self, verbose: bool) -> Self {
        self.verbose_job_log = verbose;
        self
    }

    /// `<log_root>/<kind dir>`, the base for dated log paths.
    pub fn log_dir(&self, kind: JobKind) -> PathBuf {
        self.log_root.join(kind.log_dir_name())
    }

    /// Whether `node` designates this agent. An empty tag means "local".
    pub fn is_local(&self, node: &str) -> bool {
        node.is_empty() || node == self.node_addr
    }
}
