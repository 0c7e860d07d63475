// src/service/mod.rs

//! RPC service surface exposed to the control plane.
//!
//! Every operation is a plain async method taking a request record and
//! returning a reply record; authorization scoping is expressed as a
//! [`crate::types::Scope`] on each request and enforced through store
//! filters.

pub mod agent;
pub mod clean;
pub mod crontab;
pub mod daemon;
pub mod log_finder;
pub mod proto;

use std::path::PathBuf;

use chrono::{Local, NaiveDate};

pub use agent::AgentService;
pub use crontab::CrontabJobService;
pub use daemon::DaemonJobService;
pub use log_finder::LogFinder;

use crate::errors::{AgentError, Result};
use crate::store::Paging;
use crate::types::{JobId, Scope};

/// `YYYY/MM/DD` directory of a log search; empty means today.
fn log_date_dir(date: &str) -> Result<PathBuf> {
    let date = if date.is_empty() {
        Local::now().date_naive()
    } else {
        NaiveDate::parse_from_str(date, "%Y/%m/%d").map_err(|_| AgentError::InvalidLogDate(date.to_string()))?
    };
    Ok(crate::exec::log_writer::date_dir(date))
}

fn log_file_name(job_id: JobId) -> String {
    format!("{job_id}.log")
}

fn paging(scope: &Scope, page: u64, pagesize: u64) -> Paging {
    Paging {
        owner_first: scope.user_id,
        page: page.max(1),
        pagesize: if pagesize == 0 { 20 } else { pagesize },
    }
}
