use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crontabd::depend::transport::TransportFuture;
use crontabd::depend::{DependCoordinator, DependEntry, DependTransport};
use crontabd::errors::AgentError;

/// Dependency transport linking coordinators of several in-process agents
/// by node address, as if each were a separate node.
#[derive(Debug, Default)]
pub struct InProcessCluster {
    nodes: Mutex<HashMap<String, Weak<DependCoordinator>>>,
}

impl InProcessCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn join(&self, coordinator: &Arc<DependCoordinator>) {
        self.nodes
            .lock()
            .unwrap()
            .insert(coordinator.node_addr().to_string(), Arc::downgrade(coordinator));
    }

    fn lookup(&self, node: &str) -> Result<Arc<DependCoordinator>, AgentError> {
        self.nodes
            .lock()
            .unwrap()
            .get(node)
            .and_then(Weak::upgrade)
            .ok_or_else(|| AgentError::NoRoute(node.to_string()))
    }
}

impl DependTransport for InProcessCluster {
    fn exec_depend<'a>(&'a self, node: &'a str, entry: DependEntry) -> TransportFuture<'a> {
        Box::pin(async move { Ok(self.lookup(node)?.exec_depend(entry)) })
    }

    fn set_depend_done<'a>(&'a self, node: &'a str, entry: DependEntry) -> TransportFuture<'a> {
        Box::pin(async move { Ok(self.lookup(node)?.set_depend_done(entry)) })
    }
}
