#![allow(dead_code)]

use std::error::Error;

pub use crontabd_test_utils::builders::{argv, CrontabJobBuilder, DaemonJobBuilder, TestAgent};
pub use crontabd_test_utils::{init_tracing, wait_until, with_timeout};

pub type TestResult = Result<(), Box<dyn Error>>;

/// Whether `pid` is gone, or a zombie left to whoever it was reparented to.
pub fn process_gone(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Err(_) => true,
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
    }
}

/// Whether `pid` is still our unreaped child.
pub fn unreaped_child(pid: u32) -> bool {
    use nix::sys::wait::{waitpid, WaitPidFlag};
    use nix::unistd::Pid;

    // ECHILD means it is not our child any more: already reaped.
    waitpid(Pid::from_raw(pid as i32), Some(WaitPidFlag::WNOHANG)).is_ok()
}
