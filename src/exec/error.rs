// src/exec/error.rs

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Failure of a single execution attempt.
///
/// The `Display` text is what ends up in job logs after the
/// `[<node> <label>]` prefix, so variants keep it short.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("invalid args")]
    InvalidArgs,

    #[error("unknown user '{user}': {reason}")]
    UnknownUser { user: String, reason: String },

    #[error("exec {program}: {source}")]
    Start {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("pipe {program}: {source}")]
    Pipe {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("wait {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program}: {status}")]
    Exit { program: String, status: ExitStatus },

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("dependency failed: {0}")]
    Depend(String),

    #[error("panic: {0}")]
    Panicked(String),
}
