mod common;

use std::sync::Arc;

use chrono::{Duration, Local};
use common::{init_tracing, wait_until, CrontabJobBuilder, TestAgent, TestResult};
use crontabd::clock::Clock;
use crontabd::engine::{CrontabRegistry, Job, Scheduler};
use crontabd::store::{JobTable, TimeArgs};
use crontabd_test_utils::clock::ManualClock;

#[tokio::test]
async fn tick_fires_due_jobs_once_per_second() -> TestResult {
    init_tracing();
    let test = TestAgent::new("127.0.0.1:20001");
    let clock = Arc::new(ManualClock::at(2026, 7, 1, 12, 0, 4));

    let mut record = CrontabJobBuilder::new("at-five").command(&["true"]).build();
    record.time_args = TimeArgs {
        second: "5".to_string(),
        ..Default::default()
    };
    let record = test.agent.store().crontab().insert(record)?;
    let never = test
        .agent
        .store()
        .crontab()
        .insert(CrontabJobBuilder::new("never").never().command(&["true"]).build())?;

    let registry = Arc::new(CrontabRegistry::new());
    registry.add_job(Job::from_record(record)?)?;
    registry.add_job(Job::from_record(never)?)?;
    let mut scheduler = Scheduler::new(Arc::clone(&registry), test.agent.runner().clone(), clock.clone());

    assert_eq!(scheduler.tick(clock.now()), 0);
    clock.advance(Duration::seconds(1));
    assert_eq!(scheduler.tick(clock.now()), 1);
    // Same second again, and a sub-second later tick.
    assert_eq!(scheduler.tick(clock.now()), 0);
    assert_eq!(scheduler.tick(clock.now() + Duration::milliseconds(600)), 0);
    // A tick from the past is ignored as well.
    assert_eq!(scheduler.tick(clock.now() - Duration::seconds(30)), 0);

    clock.advance(Duration::seconds(60));
    assert_eq!(scheduler.tick(clock.now()), 1);
    Ok(())
}

#[tokio::test]
async fn running_scheduler_fires_a_frozen_second_only_once() -> TestResult {
    let clock = Arc::new(ManualClock::new(Local::now()));
    let test = TestAgent::with_clock("127.0.0.1:20001", clock.clone());
    let record = test.agent.store().crontab().insert(
        CrontabJobBuilder::new("every")
            .every_second()
            .command(&["echo", "tick"])
            .build(),
    )?;
    test.agent.schedule(record.clone())?;

    let handle = test.agent.start_scheduler();
    let log_dir = test.dir.path().join("crontab_task");
    let log_path = crontabd::exec::log_writer::dated_log_path(&log_dir, clock.now().date_naive(), record.id);
    assert!(wait_until(|| std::fs::read_to_string(&log_path).is_ok_and(|s| !s.is_empty())).await);

    tokio::time::sleep(std::time::Duration::from_millis(800)).await;
    assert_eq!(std::fs::read_to_string(&log_path)?, "tick\n");

    clock.advance(Duration::seconds(1));
    assert!(wait_until(|| std::fs::read_to_string(&log_path).is_ok_and(|s| s == "tick\ntick\n")).await);

    test.agent.shutdown().await;
    handle.await?;
    Ok(())
}
