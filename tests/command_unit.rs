mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeZone;
use common::{argv, init_tracing, with_timeout, TestResult};
use crontabd::context::NodeContext;
use crontabd::exec::log_writer::dated_log_path;
use crontabd::exec::{CommandUnit, ExecError, NO_OUTPUT_NOTICE};
use crontabd::types::JobKind;
use crontabd_test_utils::clock::ManualClock;

const NODE: &str = "10.0.0.1:20001";

fn context(dir: &std::path::Path) -> (NodeContext, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at(2026, 3, 14, 9, 30, 0));
    let ctx = NodeContext::new(NODE, dir).with_clock(clock.clone());
    (ctx, clock)
}

fn log_file(ctx: &NodeContext, clock: &ManualClock, id: u64) -> std::path::PathBuf {
    use crontabd::clock::Clock;
    dated_log_path(&ctx.log_dir(JobKind::Crontab), clock.now().date_naive(), id)
}

#[tokio::test]
async fn silent_command_logs_the_no_output_notice_once() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let (ctx, clock) = context(dir.path());

    let report = CommandUnit::new(&ctx, JobKind::Crontab, 7, vec![argv(&["true"])])
        .label("silent")
        .launch()
        .await;

    assert!(report.outcome.is_success());
    let log = std::fs::read(log_file(&ctx, &clock, 7))?;
    assert_eq!(log, NO_OUTPUT_NOTICE.to_vec());
    Ok(())
}

#[tokio::test]
async fn market_tag_decorates_every_line() -> TestResult {
    let dir = tempfile::tempdir()?;
    let (ctx, clock) = context(dir.path());

    let report = CommandUnit::new(&ctx, JobKind::Crontab, 8, vec![argv(&["printf", "a\\nb\\n"])])
        .market(Some("manual".to_string()))
        .export_log(true)
        .launch()
        .await;

    assert!(report.outcome.is_success());
    let log = std::fs::read_to_string(log_file(&ctx, &clock, 8))?;
    assert_eq!(log, "[manual]a\n[manual]b\n");
    assert_eq!(String::from_utf8(report.content)?, log);
    Ok(())
}

#[tokio::test]
async fn pipe_chain_output_reaches_the_log() -> TestResult {
    let dir = tempfile::tempdir()?;
    let (ctx, clock) = context(dir.path());

    let report = CommandUnit::new(
        &ctx,
        JobKind::Crontab,
        9,
        vec![argv(&["echo", "hello"]), argv(&["wc", "-l"])],
    )
    .launch()
    .await;

    assert!(report.outcome.is_success());
    let log = std::fs::read_to_string(log_file(&ctx, &clock, 9))?;
    assert_eq!(log.trim(), "1");
    Ok(())
}

#[tokio::test]
async fn failure_is_logged_with_node_and_label() -> TestResult {
    let dir = tempfile::tempdir()?;
    let (ctx, clock) = context(dir.path());

    let report = CommandUnit::new(&ctx, JobKind::Crontab, 10, vec![argv(&["false"])])
        .label("nightly")
        .launch()
        .await;

    assert_eq!(report.outcome.error(), Some("false: exit status: 1"));
    let log = std::fs::read_to_string(log_file(&ctx, &clock, 10))?;
    assert!(
        log.ends_with(&format!("[{NODE} nightly] false: exit status: 1\n")),
        "unexpected log: {log:?}"
    );
    Ok(())
}

#[tokio::test]
async fn content_is_empty_unless_exported() -> TestResult {
    let dir = tempfile::tempdir()?;
    let (ctx, _clock) = context(dir.path());

    let report = CommandUnit::new(&ctx, JobKind::Crontab, 11, vec![argv(&["echo", "hi"])])
        .launch()
        .await;

    assert!(report.outcome.is_success());
    assert!(report.content.is_empty());
    Ok(())
}

#[tokio::test]
async fn ignore_file_log_keeps_output_in_memory_only() -> TestResult {
    let dir = tempfile::tempdir()?;
    let (ctx, clock) = context(dir.path());

    let report = CommandUnit::new(&ctx, JobKind::Crontab, 12, vec![argv(&["echo", "hi"])])
        .export_log(true)
        .ignore_file_log(true)
        .launch()
        .await;

    assert_eq!(String::from_utf8(report.content)?, "hi\n");
    assert!(!log_file(&ctx, &clock, 12).exists());
    Ok(())
}

#[tokio::test]
async fn seeded_content_precedes_command_output() -> TestResult {
    let dir = tempfile::tempdir()?;
    let (ctx, clock) = context(dir.path());

    let report = CommandUnit::new(&ctx, JobKind::Crontab, 13, vec![argv(&["echo", "main"])])
        .initial_content(b"dep\n")
        .export_log(true)
        .launch()
        .await;

    assert_eq!(String::from_utf8(report.content)?, "dep\nmain\n");
    let log = std::fs::read_to_string(log_file(&ctx, &clock, 13))?;
    assert_eq!(log, "dep\nmain\n");
    Ok(())
}

#[tokio::test]
async fn timeout_stops_a_long_command() -> TestResult {
    let dir = tempfile::tempdir()?;
    let (ctx, _clock) = context(dir.path());

    let report = with_timeout(
        CommandUnit::new(&ctx, JobKind::Crontab, 14, vec![argv(&["sleep", "30"])])
            .timeout(Some(Duration::from_millis(300)))
            .launch(),
    )
    .await;

    let expected = ExecError::TimedOut(Duration::from_millis(300)).to_string();
    assert_eq!(report.outcome.error(), Some(expected.as_str()));
    assert!(report.cost < Duration::from_secs(10));
    Ok(())
}

#[tokio::test]
async fn rejected_unit_records_the_reason_without_running() -> TestResult {
    let dir = tempfile::tempdir()?;
    let (ctx, clock) = context(dir.path());

    let report = CommandUnit::new(&ctx, JobKind::Crontab, 15, vec![argv(&["echo", "never"])])
        .label("blocked")
        .initial_content(b"dep output\n")
        .export_log(true)
        .reject(ExecError::Depend("fetch".to_string()));

    assert_eq!(report.cost, Duration::ZERO);
    let log = std::fs::read_to_string(log_file(&ctx, &clock, 15))?;
    assert_eq!(log, format!("dep output\n[{NODE} blocked] dependency failed: fetch\n"));
    assert_eq!(String::from_utf8(report.content)?, log);
    Ok(())
}

#[tokio::test]
async fn verbose_lines_carry_a_timestamp() -> TestResult {
    let dir = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(
        chrono::Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single().ok_or("ambiguous")?,
    ));
    let ctx = NodeContext::new(NODE, dir.path())
        .with_clock(clock.clone())
        .with_verbose_job_log(true);

    let report = CommandUnit::new(&ctx, JobKind::Crontab, 16, vec![argv(&["echo", "x"])])
        .label("v")
        .export_log(true)
        .launch()
        .await;

    assert_eq!(
        String::from_utf8(report.content)?,
        format!("[2026-01-02 03:04:05 {NODE} v] x\n")
    );
    Ok(())
}

#[tokio::test]
async fn explicit_log_path_overrides_the_dated_layout() -> TestResult {
    let dir = tempfile::tempdir()?;
    let (ctx, clock) = context(dir.path());
    let pinned = dir.path().join("custom").join("run.log");

    let report = CommandUnit::new(&ctx, JobKind::Crontab, 17, vec![argv(&["echo", "pinned"])])
        .log_path(Some(pinned.clone()))
        .launch()
        .await;

    assert!(report.outcome.is_success());
    assert_eq!(std::fs::read_to_string(&pinned)?, "pinned\n");
    assert!(!log_file(&ctx, &clock, 17).exists());
    Ok(())
}

#[tokio::test]
async fn background_child_does_not_hold_the_job_open() -> TestResult {
    let dir = tempfile::tempdir()?;
    let (ctx, _clock) = context(dir.path());

    let report = with_timeout(
        CommandUnit::new(
            &ctx,
            JobKind::Crontab,
            18,
            vec![argv(&["sh", "-c", "echo started; sleep 4 &"])],
        )
        .export_log(true)
        .launch(),
    )
    .await;

    assert!(report.outcome.is_success());
    assert!(report.cost < Duration::from_secs(2), "took {:?}", report.cost);
    assert!(String::from_utf8(report.content)?.contains("started\n"));
    Ok(())
}

#[tokio::test]
async fn seeded_content_survives_a_spawn_failure() -> TestResult {
    let dir = tempfile::tempdir()?;
    let (ctx, clock) = context(dir.path());

    let report = CommandUnit::new(&ctx, JobKind::Crontab, 19, vec![argv(&["/no/such/bin"])])
        .initial_content(b"dep\n")
        .launch()
        .await;

    assert!(report.outcome.error().is_some());
    let log = std::fs::read_to_string(log_file(&ctx, &clock, 19))?;
    assert!(log.starts_with("dep\n"), "log was {log:?}");
    assert!(log.lines().count() >= 2);
    Ok(())
}
