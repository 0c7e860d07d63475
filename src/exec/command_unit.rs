// src/exec/command_unit.rs

//! Command unit: one execution attempt of a job's argv groups.
//!
//! A unit owns everything its execution touches (argument lists, process
//! settings, log writer, output capture) and is consumed by [`CommandUnit::launch`].
//! A single argv group streams stdout/stderr line by line into the log while
//! the process runs; several groups run as a pipe chain whose buffered
//! output is flushed after the chain has been fully reaped.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::clock::{Clock, TIME_LAYOUT};
use crate::context::NodeContext;
use crate::types::{JobId, JobKind};

use super::capture::OutputCapture;
use super::log_writer::LogWriter;
use super::pipeline;
use super::process::{build_command, CancelObserver, ProcessSettings};
use super::{ExecError, JobOutcome};

/// Written when a single command produced nothing on either stream, so the
/// log always shows that the job ran.
pub const NO_OUTPUT_NOTICE: &[u8] = b"[system] command finished with no output\n";

/// How long output already in flight is still collected once the process exits.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(200);

/// What a finished launch hands back to its caller.
#[derive(Debug, Clone)]
pub struct LaunchReport {
    pub job_id: JobId,
    pub outcome: JobOutcome,
    /// Captured output (seeded content plus, when exporting, every line).
    pub content: Vec<u8>,
    pub started_at: DateTime<Local>,
    pub cost: Duration,
}

/// Decorations applied to every line a unit writes.
#[derive(Debug, Clone)]
struct LinePrefix {
    node_addr: String,
    label: String,
    market: Option<String>,
    verbose: bool,
    clock: Arc<dyn Clock>,
}

impl LinePrefix {
    fn stamp(&self) -> String {
        format!(
            "[{} {} {}] ",
            self.clock.now().format(TIME_LAYOUT),
            self.node_addr,
            self.label
        )
    }

    /// `[<ts> <node> <label>] ` (verbose only) then `[<market>]` then the
    /// line, newline-terminated.
    fn decorate(&self, line: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(line.len() + 64);
        if self.verbose {
            out.extend_from_slice(self.stamp().as_bytes());
        }
        if let Some(market) = self.market.as_deref().filter(|m| !m.is_empty()) {
            out.push(b'[');
            out.extend_from_slice(market.as_bytes());
            out.push(b']');
        }
        out.extend_from_slice(line);
        if !out.ends_with(b"\n") {
            out.push(b'\n');
        }
        out
    }

    fn error_line(&self, err: &ExecError) -> Vec<u8> {
        let prefix = if self.verbose {
            self.stamp()
        } else {
            format!("[{} {}] ", self.node_addr, self.label)
        };
        format!("{prefix}{err}\n").into_bytes()
    }
}

/// Where a failure is recorded when the unit itself was lost to a panic.
#[derive(Debug)]
struct FailureSink {
    prefix: LinePrefix,
    log: LogWriter,
    export: bool,
}

impl FailureSink {
    fn record(mut self, err: &ExecError) -> Vec<u8> {
        let line = self.prefix.error_line(err);
        self.log.write(&line);
        self.log.close();
        if self.export { line } else { Vec::new() }
    }
}

#[derive(Debug)]
pub struct CommandUnit {
    job_id: JobId,
    args: Vec<Vec<String>>,
    settings: ProcessSettings,
    prefix: LinePrefix,
    log: LogWriter,
    content: OutputCapture,
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl CommandUnit {
    pub fn new(ctx: &NodeContext, kind: JobKind, job_id: JobId, args: Vec<Vec<String>>) -> Self {
        Self {
            job_id,
            args,
            settings: ProcessSettings::default(),
            prefix: LinePrefix {
                node_addr: ctx.node_addr.clone(),
                label: String::new(),
                market: None,
                verbose: ctx.verbose_job_log,
                clock: Arc::clone(&ctx.clock),
            },
            log: LogWriter::new(ctx.log_dir(kind), job_id, Arc::clone(&ctx.clock)),
            content: OutputCapture::new(false),
            cancel: CancellationToken::new(),
            timeout: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.prefix.label = label.into();
        self
    }

    pub fn market(mut self, market: Option<String>) -> Self {
        self.prefix.market = market;
        self
    }

    pub fn settings(mut self, settings: ProcessSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn export_log(mut self, export: bool) -> Self {
        self.content.set_export(export);
        self
    }

    pub fn ignore_file_log(mut self, ignore: bool) -> Self {
        self.log = self.log.ignore_file_log(ignore);
        self
    }

    pub fn log_path(mut self, path: Option<PathBuf>) -> Self {
        self.log = self.log.with_fixed_path(path);
        self
    }

    /// Content written to the log ahead of the unit's own output.
    pub fn initial_content(mut self, bytes: &[u8]) -> Self {
        self.content.seed(bytes);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Cancel the execution once `limit` has elapsed. Zero disables it.
    pub fn timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit.filter(|d| !d.is_zero());
        self
    }

    /// Record a failure that kept the unit from running at all (e.g. a
    /// failed dependency). Seeded content and the error line still reach
    /// the log.
    pub fn reject(mut self, err: ExecError) -> LaunchReport {
        let started_at = self.prefix.clock.now();
        let job_id = self.job_id;
        self.log.open();
        self.flush_seeded_content();
        self.record_failure(&err);
        LaunchReport {
            job_id,
            outcome: JobOutcome::Failed(err.to_string()),
            content: self.release(),
            started_at,
            cost: Duration::ZERO,
        }
    }

    /// Run the unit to completion.
    ///
    /// Execution happens on its own task so that a panic is contained and
    /// turned into a failed outcome. The log handle is closed on every path.
    pub async fn launch(self) -> LaunchReport {
        let started_at = self.prefix.clock.now();
        let start = Instant::now();
        let job_id = self.job_id;
        let fallback = FailureSink {
            prefix: self.prefix.clone(),
            log: self.log.detached(),
            export: self.content.is_exporting(),
        };

        let (content, result) = match tokio::spawn(self.run()).await {
            Ok((mut unit, result)) => {
                if let Err(err) = &result {
                    unit.record_failure(err);
                }
                (unit.release(), result)
            }
            Err(join_err) => {
                let reason = if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    "execution task cancelled".to_string()
                };
                error!(job_id, panic = %reason, "command unit panicked; recovered as failed execution");
                let err = ExecError::Panicked(reason);
                (fallback.record(&err), Err(err))
            }
        };

        let cost = start.elapsed();
        debug!(job_id, ?cost, success = result.is_ok(), "command unit finished");

        LaunchReport {
            job_id,
            outcome: JobOutcome::from(&result),
            content,
            started_at,
            cost,
        }
    }

    async fn run(mut self) -> (Self, Result<(), ExecError>) {
        self.log.open();
        self.flush_seeded_content();
        let deadline = self
            .timeout
            .map(|limit| Deadline::arm(limit, self.cancel.clone()));
        let result = if self.args.len() > 1 {
            self.pipe_exec().await
        } else {
            self.exec().await
        };
        let result = match (result, deadline) {
            (Err(_), Some(deadline)) if deadline.fired() => Err(ExecError::TimedOut(deadline.limit)),
            (result, _) => result,
        };
        (self, result)
    }

    /// Close the log handle and hand back the captured output.
    fn release(mut self) -> Vec<u8> {
        self.log.close();
        self.content.into_bytes()
    }

    async fn exec(&mut self) -> Result<(), ExecError> {
        let argv = self.args.first().ok_or(ExecError::InvalidArgs)?;
        debug!(job_id = self.job_id, ?argv, "cmd exec");

        let prepared = build_command(argv, &self.settings)?;
        let program = prepared.program;
        let mut command = prepared.command;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| ExecError::Start {
            program: program.clone(),
            source,
        })?;
        drop(command);

        let _observer = child.id().map(|pid| {
            CancelObserver::watch(self.cancel.clone(), vec![pid], self.settings.kill_child_process)
        });

        // Readers start before the wait so logging is concurrent with the run.
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(64);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, tx.clone()));
        }
        drop(tx);

        // The unit ends with the process, not with its pipes: a background
        // grandchild may hold them open long after the exit.
        let mut has_output = false;
        let mut open = true;
        let wait = child.wait();
        tokio::pin!(wait);
        let status = loop {
            tokio::select! {
                status = &mut wait => break status,
                line = rx.recv(), if open => match line {
                    Some(line) => {
                        has_output = true;
                        self.emit(&line);
                    }
                    None => open = false,
                },
            }
        };

        if open {
            let drain = async {
                while let Some(line) = rx.recv().await {
                    has_output = true;
                    self.emit(&line);
                }
            };
            if tokio::time::timeout(OUTPUT_DRAIN_GRACE, drain).await.is_err() {
                debug!(job_id = self.job_id, "output still held open after exit; detaching readers");
            }
        }
        for reader in readers {
            reader.abort();
        }
        drop(rx);
        if !has_output {
            self.emit(NO_OUTPUT_NOTICE);
        }

        let status = status.map_err(|source| ExecError::Wait {
            program: program.clone(),
            source,
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(ExecError::Exit { program, status })
        }
    }

    async fn pipe_exec(&mut self) -> Result<(), ExecError> {
        let run = pipeline::execute(&self.args, &self.settings, &self.cancel).await;
        debug!(job_id = self.job_id, pids = ?run.pids, "pipe chain reaped");

        for line in split_lines(&run.stdout) {
            self.emit(line);
        }
        for line in split_lines(&run.stderr) {
            self.emit(line);
        }
        run.result
    }

    fn emit(&mut self, line: &[u8]) {
        let line = self.prefix.decorate(line);
        self.content.record(&line);
        self.log.write(&line);
    }

    fn flush_seeded_content(&mut self) {
        if !self.content.as_bytes().is_empty() {
            let seeded = self.content.as_bytes().to_vec();
            self.log.write(&seeded);
        }
    }

    fn record_failure(&mut self, err: &ExecError) {
        let line = self.prefix.error_line(err);
        self.log.write(&line);
        self.content.record(&line);
    }
}

/// Cancels a token once the limit elapses; disarmed on drop.
struct Deadline {
    limit: Duration,
    fired: Arc<AtomicBool>,
    timer: JoinHandle<()>,
}

impl Deadline {
    fn arm(limit: Duration, cancel: CancellationToken) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let timer = tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(limit) => {
                    flag.store(true, Ordering::SeqCst);
                    cancel.cancel();
                }
            }
        });
        Self { limit, fired, timer }
    }

    fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

fn spawn_line_reader<R>(reader: R, tx: mpsc::Sender<Vec<u8>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        loop {
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "output reader stopped");
                    break;
                }
            }
        }
    })
}

fn split_lines(buf: &[u8]) -> impl Iterator<Item = &[u8]> {
    buf.split_inclusive(|b| *b == b'\n').filter(|line| !line.is_empty())
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
