// src/engine/scheduler.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, SubsecRound};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::crontab::CrontabRegistry;
use super::runner::JobRunner;
use crate::clock::Clock;

/// Once-per-second tick loop firing every registered job whose schedule
/// matches the current wall-clock second.
#[derive(Debug)]
pub struct Scheduler {
    registry: Arc<CrontabRegistry>,
    runner: JobRunner,
    clock: Arc<dyn Clock>,
    last_tick: Option<DateTime<Local>>,
}

impl Scheduler {
    pub fn new(registry: Arc<CrontabRegistry>, runner: JobRunner, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            runner,
            clock,
            last_tick: None,
        }
    }

    /// Fire every job due at `now`. A second is only evaluated once, so a
    /// late or duplicated tick never runs a job twice. Returns how many
    /// executions were spawned.
    pub fn tick(&mut self, now: DateTime<Local>) -> usize {
        let now = now.trunc_subsecs(0);
        if self.last_tick.is_some_and(|last| last >= now) {
            return 0;
        }
        self.last_tick = Some(now);

        let mut fired = 0;
        for entry in self.registry.snapshot() {
            if entry.job.schedule.matches(&now) {
                let runner = self.runner.clone();
                tokio::spawn(async move { runner.run_scheduled(entry).await });
                fired += 1;
            }
        }
        if fired > 0 {
            debug!(fired, at = %now, "scheduler tick");
        }
        fired
    }

    pub fn spawn(mut self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("scheduler started");
            let mut interval = tokio::time::interval(Duration::from_millis(250));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let now = self.clock.now();
                        self.tick(now);
                    }
                }
            }
            info!("scheduler stopped");
        })
    }
}
