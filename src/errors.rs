// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::exec::ExecError;
use crate::types::JobId;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("record not found")]
    RecordNotFound,

    #[error("duplicate record id {0}")]
    DuplicateRecord(JobId),

    #[error("empty ids")]
    EmptyIds,

    #[error("job {0} is already scheduled")]
    AlreadyScheduled(JobId),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("invalid log date '{0}' (expected YYYY/MM/DD)")]
    InvalidLogDate(String),

    #[error("invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("no route to node '{0}'")]
    NoRoute(String),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AgentError>;
