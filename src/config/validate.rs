// src/config/validate.rs

use std::collections::HashSet;
use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{AgentSection, AgentSettings, ConfigFile, RawConfigFile};
use crate::engine::Schedule;
use crate::errors::{AgentError, Result};
use crate::exec::process::filter_empty;
use crate::types::JobId;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AgentError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let agent = validate_agent(&raw.agent)?;
        validate_crontab_jobs(&raw)?;
        validate_daemon_jobs(&raw)?;
        Ok(ConfigFile::new_unchecked(agent, raw.crontab_job, raw.daemon_job))
    }
}

fn duration_field(name: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| AgentError::ConfigError(format!("[agent].{name}: {e}")))
}

fn validate_agent(section: &AgentSection) -> Result<AgentSettings> {
    if section.node_addr.trim().is_empty() {
        return Err(AgentError::ConfigError(
            "[agent].node_addr must not be empty".to_string(),
        ));
    }
    if section.depend_queue_size == 0 {
        return Err(AgentError::ConfigError(
            "[agent].depend_queue_size must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(AgentSettings {
        node_addr: section.node_addr.trim().to_string(),
        log_path: section.log_path.clone(),
        verbose_job_log: section.verbose_job_log,
        depend_queue_size: section.depend_queue_size,
        depend_timeout: duration_field("depend_timeout", &section.depend_timeout)?,
        daemon_restart_delay: duration_field("daemon_restart_delay", &section.daemon_restart_delay)?,
        kill_grace: duration_field("kill_grace", &section.kill_grace)?,
    })
}

fn validate_commands(table: &str, name: &str, commands: &[Vec<String>]) -> Result<()> {
    if commands.is_empty() {
        return Err(AgentError::ConfigError(format!(
            "{table} '{name}' has no commands"
        )));
    }
    if commands.iter().any(|argv| filter_empty(argv).is_empty()) {
        return Err(AgentError::ConfigError(format!(
            "{table} '{name}' has an empty command group"
        )));
    }
    Ok(())
}

fn ensure_unique(table: &str, seen: &mut HashSet<JobId>, id: JobId) -> Result<()> {
    if id != 0 && !seen.insert(id) {
        return Err(AgentError::ConfigError(format!(
            "{table} id {id} is used more than once"
        )));
    }
    Ok(())
}

fn validate_crontab_jobs(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for seed in &cfg.crontab_job {
        let job = &seed.job;
        ensure_unique("[[crontab_job]]", &mut seen, job.id)?;
        validate_commands("[[crontab_job]]", &job.name, &job.commands)?;
        for dep in &job.depends {
            validate_commands("dependency of", &job.name, &dep.commands)?;
        }
        Schedule::parse(&job.time_args).map_err(|e| {
            AgentError::ConfigError(format!("[[crontab_job]] '{}': {e}", job.name))
        })?;
    }
    Ok(())
}

fn validate_daemon_jobs(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for seed in &cfg.daemon_job {
        ensure_unique("[[daemon_job]]", &mut seen, seed.job.id)?;
        validate_commands("[[daemon_job]]", &seed.job.name, &seed.job.commands)?;
    }
    Ok(())
}
