// src/lib.rs

pub mod agent;
pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod depend;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod service;
pub mod store;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use tracing::{debug, info};

use crate::agent::Agent;
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::context::NodeContext;
use crate::depend::LocalOnlyTransport;
use crate::store::{JobStore, MemoryStore};
use crate::types::JobStatus;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the job store, seeded from the config
/// - the agent (registries, dependency worker) and boot recovery
/// - the scheduler tick loop
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let ctx = NodeContext::new(cfg.agent.node_addr.clone(), cfg.agent.log_path.clone())
        .with_verbose_job_log(cfg.agent.verbose_job_log);

    let store = Arc::new(MemoryStore::new());
    seed_store(store.as_ref(), &cfg)?;

    let agent = Agent::new(ctx, cfg.agent.clone(), store, Arc::new(LocalOnlyTransport));
    agent.recover()?;
    let scheduler = agent.start_scheduler();

    info!(node = %cfg.agent.node_addr, log_path = %cfg.agent.log_path.display(), "crontabd started");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    agent.shutdown().await;
    scheduler.await?;
    Ok(())
}

/// Insert the config's seed jobs. Enabled crontab jobs enter `timing`,
/// enabled daemon jobs enter `running`, so boot recovery starts them.
pub fn seed_store(store: &dyn JobStore, cfg: &ConfigFile) -> crate::errors::Result<(usize, usize)> {
    for seed in &cfg.crontab_jobs {
        let mut job = seed.job.clone();
        job.max_concurrent = job.max_concurrent.max(1);
        if seed.enabled {
            job.status = JobStatus::Timing;
        }
        store.crontab().insert(job)?;
    }

    let now = Local::now();
    for seed in &cfg.daemon_jobs {
        let mut job = seed.job.clone();
        if seed.enabled {
            job.status = JobStatus::Running;
            job.start_at = Some(now);
        }
        store.daemon().insert(job)?;
    }

    debug!(
        crontab = cfg.crontab_jobs.len(),
        daemon = cfg.daemon_jobs.len(),
        "job store seeded"
    );
    Ok((cfg.crontab_jobs.len(), cfg.daemon_jobs.len()))
}

/// Simple dry-run output: print agent settings and seeded jobs.
fn print_dry_run(cfg: &ConfigFile) {
    println!("crontabd dry-run");
    println!("  agent.node_addr = {}", cfg.agent.node_addr);
    println!("  agent.log_path = {}", cfg.agent.log_path.display());
    println!("  agent.verbose_job_log = {}", cfg.agent.verbose_job_log);
    println!("  agent.depend_queue_size = {}", cfg.agent.depend_queue_size);
    println!("  agent.depend_timeout = {:?}", cfg.agent.depend_timeout);
    println!("  agent.daemon_restart_delay = {:?}", cfg.agent.daemon_restart_delay);
    println!("  agent.kill_grace = {:?}", cfg.agent.kill_grace);
    println!();

    println!("crontab jobs ({}):", cfg.crontab_jobs.len());
    for seed in &cfg.crontab_jobs {
        let job = &seed.job;
        println!("  - [{}] {}", job.id, job.name);
        println!("      commands: {:?}", job.commands);
        let t = &job.time_args;
        println!(
            "      schedule: {:?} {:?} {:?} {:?} {:?} {:?}",
            t.second, t.minute, t.hour, t.day, t.month, t.weekday
        );
        if !job.depends.is_empty() {
            println!("      depends: {:?}", job.depends.iter().map(|d| &d.name).collect::<Vec<_>>());
        }
        println!("      enabled: {}", seed.enabled);
    }

    println!("daemon jobs ({}):", cfg.daemon_jobs.len());
    for seed in &cfg.daemon_jobs {
        let job = &seed.job;
        println!("  - [{}] {}", job.id, job.name);
        println!("      commands: {:?}", job.commands);
        println!("      failed_restart: {}, retry_num: {}", job.failed_restart, job.retry_num);
        println!("      enabled: {}", seed.enabled);
    }

    debug!("dry-run complete (no execution)");
}
