mod common;

use std::time::Duration;

use common::{argv, init_tracing, unreaped_child, with_timeout, TestResult};
use crontabd::exec::pipeline::execute;
use crontabd::exec::{ExecError, ProcessSettings};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn echo_piped_into_wc_counts_one_line() -> TestResult {
    init_tracing();
    let chain = vec![argv(&["echo", "a"]), argv(&["wc", "-l"])];

    let run = execute(&chain, &ProcessSettings::default(), &CancellationToken::new()).await;

    assert!(run.result.is_ok(), "{:?}", run.result);
    assert_eq!(String::from_utf8(run.stdout)?.trim(), "1");
    assert_eq!(run.pids.len(), 2);
    Ok(())
}

#[tokio::test]
async fn failing_upstream_stage_wins_and_every_stage_is_reaped() -> TestResult {
    init_tracing();
    let chain = vec![
        argv(&["sh", "-c", "echo x; exit 3"]),
        argv(&["cat"]),
        argv(&["sh", "-c", "cat >/dev/null; exit 4"]),
    ];

    let run = execute(&chain, &ProcessSettings::default(), &CancellationToken::new()).await;

    match &run.result {
        Err(ExecError::Exit { program, status }) => {
            assert_eq!(program, "sh");
            assert_eq!(status.code(), Some(3));
        }
        other => panic!("expected first stage's exit error, got {other:?}"),
    }
    assert!(String::from_utf8_lossy(&run.stderr).contains("exit status: 3"));

    assert_eq!(run.pids.len(), 3);
    for pid in run.pids {
        assert!(!unreaped_child(pid), "stage {pid} left unreaped");
    }
    Ok(())
}

#[tokio::test]
async fn failing_middle_stage_is_reported() -> TestResult {
    let chain = vec![argv(&["echo", "a"]), argv(&["false"]), argv(&["cat"])];

    let run = execute(&chain, &ProcessSettings::default(), &CancellationToken::new()).await;

    assert!(matches!(&run.result, Err(ExecError::Exit { program, .. }) if program == "false"));
    for pid in run.pids {
        assert!(!unreaped_child(pid));
    }
    Ok(())
}

#[tokio::test]
async fn start_failure_reaps_already_started_stages() -> TestResult {
    let chain = vec![argv(&["sleep", "5"]), argv(&["/definitely/not/a/binary"])];

    let run = with_timeout(execute(&chain, &ProcessSettings::default(), &CancellationToken::new())).await;

    assert!(matches!(&run.result, Err(ExecError::Start { .. })), "{:?}", run.result);
    assert!(String::from_utf8_lossy(&run.stderr).contains("/definitely/not/a/binary"));
    for pid in run.pids {
        assert!(!unreaped_child(pid));
    }
    Ok(())
}

#[tokio::test]
async fn stderr_of_every_stage_is_captured() -> TestResult {
    let chain = vec![
        argv(&["sh", "-c", "echo first >&2; echo data"]),
        argv(&["sh", "-c", "cat; echo second >&2"]),
    ];

    let run = execute(&chain, &ProcessSettings::default(), &CancellationToken::new()).await;

    assert!(run.result.is_ok());
    assert_eq!(run.stdout, b"data\n".to_vec());
    let stderr = String::from_utf8(run.stderr)?;
    assert!(stderr.contains("first") && stderr.contains("second"));
    Ok(())
}

#[tokio::test]
async fn cancellation_terminates_the_chain() -> TestResult {
    let chain = vec![argv(&["sleep", "30"]), argv(&["cat"])];
    let settings = ProcessSettings {
        kill_child_process: true,
        ..Default::default()
    };
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let run = with_timeout(execute(&chain, &settings, &cancel)).await;

    assert!(run.result.is_err());
    for pid in run.pids {
        assert!(!unreaped_child(pid));
    }
    Ok(())
}

#[tokio::test]
async fn empty_chain_is_invalid() {
    let run = execute(&[], &ProcessSettings::default(), &CancellationToken::new()).await;
    assert!(matches!(run.result, Err(ExecError::InvalidArgs)));
}
