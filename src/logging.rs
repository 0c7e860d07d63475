// src/logging.rs

//! Agent diagnostics for `crontabd`.
//!
//! Two streams of text leave a node: what jobs print, which
//! [`crate::exec::LogWriter`] files under the log root per job and day, and
//! what the agent itself reports about scheduling, dependency routing and
//! process supervision, which goes through `tracing` to STDERR. This module
//! only sets up the second.
//!
//! The filter comes from `--log-level` when given, else from `CRONTABD_LOG`
//! (a level such as `debug` or a full directive such as
//! `crontabd::depend=trace,info`), else `info`.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Environment variable holding the diagnostics filter.
pub const LOG_ENV: &str = "CRONTABD_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let directive = filter_directive(cli_level, env.as_deref());
    let (filter, rejected) = match EnvFilter::try_new(&directive) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new(DEFAULT_DIRECTIVE), Some(e)),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("installing log subscriber: {e}"))?;

    if let Some(e) = rejected {
        tracing::warn!(directive = %directive, error = %e, "bad {LOG_ENV} filter; using {DEFAULT_DIRECTIVE}");
    }
    Ok(())
}

/// The filter directive in effect for the given flag and environment value.
fn filter_directive(cli_level: Option<LogLevel>, env: Option<&str>) -> String {
    if let Some(level) = cli_level {
        return level_name(level).to_string();
    }
    match env.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_lowercase(),
        _ => DEFAULT_DIRECTIVE.to_string(),
    }
}

fn level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
