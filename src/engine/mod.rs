// src/engine/mod.rs

//! Job orchestration engine.
//!
//! This module ties together:
//! - the calendar matcher ([`schedule`])
//! - the scheduled-job registry ([`crontab`]) and its live entries ([`job`])
//! - the daemon supervisor ([`daemon`])
//! - the ephemeral run set ([`tmp`])
//! - execution of a job with its dependencies ([`runner`])
//! - the once-per-second tick loop ([`scheduler`])

pub mod crontab;
pub mod daemon;
pub mod job;
pub mod runner;
pub mod schedule;
pub mod scheduler;
pub mod tmp;

pub use crontab::CrontabRegistry;
pub use daemon::DaemonSupervisor;
pub use job::{Job, JobEntry, ProcessGuard};
pub use runner::{JobRunner, MANUAL_MARKET};
pub use schedule::Schedule;
pub use scheduler::Scheduler;
pub use tmp::{TmpGuard, TmpJobs};
