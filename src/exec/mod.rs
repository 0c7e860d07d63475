// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`process`] builds OS commands (dir, env, run-as user, own process
//!   group) and terminates them on cancellation.
//! - [`pipeline`] runs argv groups as a pipe chain with zombie-safe reaping.
//! - [`log_writer`] persists output into dated, lazily rotated job log files.
//! - [`capture`] keeps the in-memory copy returned to RPC callers.
//! - [`command_unit`] drives one execution attempt end to end.

pub mod capture;
pub mod command_unit;
pub mod error;
pub mod log_writer;
pub mod pipeline;
pub mod process;

pub use capture::OutputCapture;
pub use command_unit::{CommandUnit, LaunchReport, NO_OUTPUT_NOTICE};
pub use error::ExecError;
pub use log_writer::LogWriter;
pub use process::ProcessSettings;

/// Result of one execution attempt, as seen by registries and callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Failed(String),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobOutcome::Success => None,
            JobOutcome::Failed(reason) => Some(reason),
        }
    }
}

impl From<&Result<(), ExecError>> for JobOutcome {
    fn from(result: &Result<(), ExecError>) -> Self {
        match result {
            Ok(()) => JobOutcome::Success,
            Err(err) => JobOutcome::Failed(err.to_string()),
        }
    }
}
