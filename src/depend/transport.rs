// src/depend/transport.rs

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;

use super::DependEntry;
use crate::errors::{AgentError, Result};

pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

/// Delivery of dependency traffic to other nodes.
///
/// The coordinator handles entries addressed to its own node directly and
/// only calls the transport for remote `dest` / `from` tags.
pub trait DependTransport: Send + Sync + Debug {
    /// Ask `node` to run `entry`. Returns the node's acknowledgement.
    fn exec_depend<'a>(&'a self, node: &'a str, entry: DependEntry) -> TransportFuture<'a>;

    /// Report a finished step back to the node that declared it.
    fn set_depend_done<'a>(&'a self, node: &'a str, entry: DependEntry) -> TransportFuture<'a>;
}

/// Transport for an agent without peers: every remote node is unreachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalOnlyTransport;

impl DependTransport for LocalOnlyTransport {
    fn exec_depend<'a>(&'a self, node: &'a str, _entry: DependEntry) -> TransportFuture<'a> {
        Box::pin(async move { Err(AgentError::NoRoute(node.to_string())) })
    }

    fn set_depend_done<'a>(&'a self, node: &'a str, _entry: DependEntry) -> TransportFuture<'a> {
        Box::pin(async move { Err(AgentError::NoRoute(node.to_string())) })
    }
}
