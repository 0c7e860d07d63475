// src/exec/pipeline.rs

//! Pipe-chain executor.
//!
//! Runs a sequence of commands where stage `k`'s stdout feeds stage `k+1`'s
//! stdin, like shell `|`. The first stage reads from `/dev/null`; the last
//! stage's stdout and every stage's stderr are accumulated in memory.
//!
//! Reaping rules:
//! - Stages are started left to right. If a start fails, the stages already
//!   running are killed and waited on before the error is returned.
//! - Once all stages run, they are waited on right to left. A failing stage
//!   never short-circuits the unwind, so every started process is reaped
//!   exactly once.
//! - The parent drops its copy of each intermediate pipe end as soon as the
//!   consuming stage has been spawned, so a reader sees EOF as soon as its
//!   writer exits, whatever happens further down the chain.
//! - The reported error is the one of the upstream-most failing stage; its
//!   text is also appended to the stderr buffer.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::process::{build_command, terminate, CancelObserver, ProcessSettings};
use super::ExecError;

/// Everything a pipe chain produced.
#[derive(Debug)]
pub struct PipeRun {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// PIDs of every stage that was started, in chain order.
    pub pids: Vec<u32>,
    pub result: Result<(), ExecError>,
}

struct PipeStage {
    program: String,
    pid: Option<u32>,
    child: Child,
}

/// Execute `chain` with the given settings, honouring `cancel`.
pub async fn execute(
    chain: &[Vec<String>],
    settings: &ProcessSettings,
    cancel: &CancellationToken,
) -> PipeRun {
    let mut run = PipeRun {
        stdout: Vec::new(),
        stderr: Vec::new(),
        pids: Vec::new(),
        result: Ok(()),
    };

    if chain.is_empty() {
        run.result = Err(ExecError::InvalidArgs);
        return run;
    }

    let mut stages: Vec<PipeStage> = Vec::with_capacity(chain.len());
    let mut stderr_tasks: Vec<JoinHandle<Vec<u8>>> = Vec::with_capacity(chain.len());
    let mut stdout_task: Option<JoinHandle<Vec<u8>>> = None;
    let mut upstream: Option<Stdio> = None;

    for (idx, argv) in chain.iter().enumerate() {
        let last = idx + 1 == chain.len();
        let started = spawn_stage(argv, settings, upstream.take());

        let (stage, stdout, stderr_task) = match started {
            Ok(parts) => parts,
            Err(err) => {
                warn!(stage = idx, error = %err, "pipe stage failed to start; reaping started stages");
                reap_after_failed_start(&mut stages, settings.kill_child_process).await;
                for task in stderr_tasks {
                    task.abort();
                }
                if let Some(task) = stdout_task {
                    task.abort();
                }
                run.stderr.extend_from_slice(format!("{err}\n").as_bytes());
                run.result = Err(err);
                return run;
            }
        };

        stderr_tasks.push(stderr_task);
        if let Some(pid) = stage.pid {
            run.pids.push(pid);
        }

        if last {
            stdout_task = stdout.map(drain);
        } else {
            let program = stage.program.clone();
            let converted: std::io::Result<Stdio> = match stdout {
                Some(out) => out.try_into(),
                None => Err(std::io::Error::other("stdout was not captured")),
            };
            match converted {
                Ok(stdio) => upstream = Some(stdio),
                Err(source) => {
                    stages.push(stage);
                    reap_after_failed_start(&mut stages, settings.kill_child_process).await;
                    let err = ExecError::Pipe { program, source };
                    run.stderr.extend_from_slice(format!("{err}\n").as_bytes());
                    run.result = Err(err);
                    return run;
                }
            }
        }

        stages.push(stage);
    }

    let observer = CancelObserver::watch(cancel.clone(), run.pids.clone(), settings.kill_child_process);

    // Right-to-left unwind. Overwriting keeps the upstream-most failure.
    let mut failure: Option<ExecError> = None;
    while let Some(mut stage) = stages.pop() {
        if let Err(err) = wait_stage(&mut stage).await {
            debug!(program = %stage.program, error = %err, "pipe stage failed");
            failure = Some(err);
        }
    }
    drop(observer);

    if let Some(task) = stdout_task {
        run.stdout = task.await.unwrap_or_default();
    }
    for task in stderr_tasks {
        run.stderr.extend(task.await.unwrap_or_default());
    }

    if let Some(err) = failure {
        run.stderr.extend_from_slice(format!("{err}\n").as_bytes());
        run.result = Err(err);
    }
    run
}

fn spawn_stage(
    argv: &[String],
    settings: &ProcessSettings,
    stdin: Option<Stdio>,
) -> Result<(PipeStage, Option<ChildStdout>, JoinHandle<Vec<u8>>), ExecError> {
    let prepared = build_command(argv, settings)?;
    let program = prepared.program;
    let mut command = prepared.command;

    command
        .stdin(stdin.unwrap_or_else(Stdio::null))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|source| ExecError::Start {
        program: program.clone(),
        source,
    })?;
    // Releases the parent's handle on the upstream read end.
    drop(command);

    let pid = child.id();
    let stdout = child.stdout.take();
    let stderr_task = match child.stderr.take() {
        Some(stderr) => drain(stderr),
        None => tokio::spawn(async { Vec::new() }),
    };

    debug!(program = %program, pid, "pipe stage started");
    Ok((PipeStage { program, pid, child }, stdout, stderr_task))
}

async fn wait_stage(stage: &mut PipeStage) -> Result<(), ExecError> {
    let status = stage.child.wait().await.map_err(|source| ExecError::Wait {
        program: stage.program.clone(),
        source,
    })?;

    if status.success() {
        Ok(())
    } else {
        Err(ExecError::Exit {
            program: stage.program.clone(),
            status,
        })
    }
}

async fn reap_after_failed_start(stages: &mut Vec<PipeStage>, kill_tree: bool) {
    while let Some(mut stage) = stages.pop() {
        if let Some(pid) = stage.pid {
            terminate(pid, kill_tree);
        }
        if let Err(e) = stage.child.wait().await {
            warn!(program = %stage.program, error = %e, "failed to reap pipe stage");
        }
    }
}

fn drain<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf).await {
            debug!(error = %e, "pipe output reader stopped early");
        }
        buf
    })
}
