// src/exec/process.rs

//! Platform process primitives: building a `tokio::process::Command` with the
//! job's working directory, environment and run-as user, and terminating a
//! process (or its whole process group) when an execution is cancelled.

use std::path::PathBuf;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::{Pid, User};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ExecError;

/// Per-process settings shared by every stage of a command unit.
#[derive(Debug, Clone, Default)]
pub struct ProcessSettings {
    pub dir: Option<PathBuf>,
    /// `KEY=VALUE` entries added on top of the agent's environment.
    pub env: Vec<String>,
    pub user: Option<String>,
    /// Kill the whole process group (descendants included) on cancellation.
    pub kill_child_process: bool,
}

/// A command ready to be spawned, plus the program name used in errors.
#[derive(Debug)]
pub struct PreparedCommand {
    pub program: String,
    pub command: Command,
}

/// Drop empty tokens (e.g. produced by splitting on repeated spaces).
pub fn filter_empty(argv: &[String]) -> Vec<String> {
    argv.iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build the OS command for one argv group.
///
/// Every child is started as the leader of its own process group so that a
/// kill can reach its descendants with a single `killpg`.
pub fn build_command(argv: &[String], settings: &ProcessSettings) -> Result<PreparedCommand, ExecError> {
    let argv = filter_empty(argv);
    let (program, args) = argv.split_first().ok_or(ExecError::InvalidArgs)?;

    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true).process_group(0);

    if let Some(dir) = settings.dir.as_ref().filter(|d| !d.as_os_str().is_empty()) {
        command.current_dir(dir);
    }

    for entry in &settings.env {
        match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                command.env(key, value);
            }
            _ => warn!(entry = %entry, "ignoring malformed environment entry"),
        }
    }

    if let Some(name) = settings.user.as_deref().filter(|u| !u.is_empty()) {
        let user = User::from_name(name)
            .map_err(|e| ExecError::UnknownUser {
                user: name.to_string(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| ExecError::UnknownUser {
                user: name.to_string(),
                reason: "no such user".to_string(),
            })?;
        command.uid(user.uid.as_raw()).gid(user.gid.as_raw());
    }

    Ok(PreparedCommand {
        program: program.clone(),
        command,
    })
}

/// Send SIGKILL to `pid`, or to its process group when `kill_tree` is set.
///
/// A process that already exited is not an error.
pub fn terminate(pid: u32, kill_tree: bool) {
    let Ok(raw) = i32::try_from(pid) else {
        warn!(pid, "pid out of range; not signalling");
        return;
    };
    let target = Pid::from_raw(raw);
    let res = if kill_tree {
        signal::killpg(target, Signal::SIGKILL)
    } else {
        signal::kill(target, Signal::SIGKILL)
    };

    match res {
        Ok(()) => debug!(pid, kill_tree, "sent SIGKILL"),
        Err(Errno::ESRCH) => debug!(pid, "process already gone"),
        Err(e) => warn!(pid, kill_tree, error = %e, "failed to signal process"),
    }
}

/// Background observer translating a cancelled token into process
/// termination. Dropping the observer detaches it, which must happen as soon
/// as the observed processes have been reaped.
#[derive(Debug)]
pub struct CancelObserver {
    handle: JoinHandle<()>,
}

impl CancelObserver {
    pub fn watch(token: CancellationToken, pids: Vec<u32>, kill_tree: bool) -> Self {
        let handle = tokio::spawn(async move {
            token.cancelled().await;
            debug!(?pids, kill_tree, "execution cancelled; terminating processes");
            for pid in pids {
                terminate(pid, kill_tree);
            }
        });
        Self { handle }
    }
}

impl Drop for CancelObserver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tokens_are_dropped() {
        let argv = vec!["".to_string(), " echo ".to_string(), "  ".to_string(), "hi".to_string()];
        assert_eq!(filter_empty(&argv), vec!["echo", "hi"]);
    }

    #[test]
    fn blank_argv_is_invalid() {
        let err = build_command(&[" ".to_string()], &ProcessSettings::default()).unwrap_err();
        assert!(matches!(err, ExecError::InvalidArgs));
    }

    #[test]
    fn unknown_user_is_rejected_before_spawn() {
        let settings = ProcessSettings {
            user: Some("no-such-user-crontabd".to_string()),
            ..Default::default()
        };
        let err = build_command(&["true".to_string()], &settings).unwrap_err();
        assert!(matches!(err, ExecError::UnknownUser { .. }));
    }
}
