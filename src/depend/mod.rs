// src/depend/mod.rs

//! Dependency hand-off between jobs.
//!
//! A job that declares dependencies turns each into a [`DependEntry`], sends
//! it to the node that should run it and waits until every entry comes back
//! through `set_depend_done`. The captured output of the finished steps is
//! handed to the declaring job, whose own commands only run if every step
//! succeeded.

use serde::{Deserialize, Serialize};

use crate::types::JobId;

pub mod coordinator;
pub mod transport;

pub use coordinator::{DependCoordinator, DependQueue, DependWaiter, Resolution};
pub use transport::{DependTransport, LocalOnlyTransport};

/// Identity shared by the declaring job and the node running the step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependKey {
    pub job_id: JobId,
    pub process_id: u64,
    pub job_unique_id: String,
    pub id: usize,
}

/// One step of a dependency chain, as exchanged between nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependEntry {
    pub job_id: JobId,
    pub process_id: u64,
    pub job_unique_id: String,
    /// Position of the step in the declaring job's dependency list.
    pub id: usize,
    /// Node that declared the step and waits for its completion.
    pub from: String,
    /// Node that runs the step.
    pub dest: String,
    pub name: String,
    pub commands: Vec<Vec<String>>,
    pub done: bool,
    pub log_content: Vec<u8>,
    pub err: Option<String>,
}

impl DependEntry {
    pub fn key(&self) -> DependKey {
        DependKey {
            job_id: self.job_id,
            process_id: self.process_id,
            job_unique_id: self.job_unique_id.clone(),
            id: self.id,
        }
    }
}
