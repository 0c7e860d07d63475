// src/exec/log_writer.rs

//! Per-job log file writer with lazy date rotation.
//!
//! Files live at `<dir>/<YYYY>/<MM>/<DD>/<job_id>.log`. Every write
//! recomputes today's path from the clock; when it differs from the open
//! file, the old handle is closed and the new file is opened in append mode
//! before writing. A job running across midnight therefore rolls its log
//! mid-execution, and every write lands in exactly one file.
//!
//! Persistence is best-effort: open and write failures are reported through
//! `tracing` and the bytes are dropped, never failing the job.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::types::JobId;

#[derive(Debug)]
pub struct LogWriter {
    dir: PathBuf,
    job_id: JobId,
    fixed_path: Option<PathBuf>,
    ignore: bool,
    clock: Arc<dyn Clock>,
    current: Option<(PathBuf, File)>,
}

impl LogWriter {
    pub fn new(dir: impl Into<PathBuf>, job_id: JobId, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            job_id,
            fixed_path: None,
            ignore: false,
            clock,
            current: None,
        }
    }

    /// Pin the writer to an explicit file. A pinned writer never rotates.
    pub fn with_fixed_path(mut self, path: Option<PathBuf>) -> Self {
        self.fixed_path = path;
        self
    }

    /// Turn every write into a no-op (in-memory capture only).
    pub fn ignore_file_log(mut self, ignore: bool) -> Self {
        self.ignore = ignore;
        self
    }

    /// Same destination settings, no open handle.
    pub fn detached(&self) -> Self {
        Self {
            dir: self.dir.clone(),
            job_id: self.job_id,
            fixed_path: self.fixed_path.clone(),
            ignore: self.ignore,
            clock: Arc::clone(&self.clock),
            current: None,
        }
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        dated_log_path(&self.dir, date, self.job_id)
    }

    fn target_path(&self) -> PathBuf {
        match &self.fixed_path {
            Some(path) => path.clone(),
            None => self.path_for(self.clock.now().date_naive()),
        }
    }

    /// Open today's file up front so the log exists even before output
    /// arrives.
    pub fn open(&mut self) {
        if self.ignore {
            return;
        }
        self.ensure_open();
    }

    pub fn write(&mut self, bytes: &[u8]) {
        if self.ignore || bytes.is_empty() {
            return;
        }
        if !self.ensure_open() {
            return;
        }
        if let Some((path, file)) = self.current.as_mut() {
            if let Err(e) = file.write_all(bytes) {
                warn!(path = %path.display(), error = %e, "job log write failed; dropping bytes");
            }
        }
    }

    /// Close the current handle. The next write reopens.
    pub fn close(&mut self) {
        if let Some((path, mut file)) = self.current.take() {
            if let Err(e) = file.flush() {
                debug!(path = %path.display(), error = %e, "flush on close failed");
            }
        }
    }

    /// Make sure the handle matches today's path. Returns false when no file
    /// could be opened.
    fn ensure_open(&mut self) -> bool {
        let target = self.target_path();
        if let Some((path, _)) = &self.current {
            if *path == target {
                return true;
            }
            debug!(from = %path.display(), to = %target.display(), "rotating job log file");
        }
        self.close();

        match open_append(&target) {
            Ok(file) => {
                self.current = Some((target, file));
                true
            }
            Err(e) => {
                warn!(path = %target.display(), error = %e, "opening job log failed; dropping write");
                false
            }
        }
    }
}

/// `<dir>/<YYYY>/<MM>/<DD>/<job_id>.log`
pub fn dated_log_path(dir: &Path, date: NaiveDate, job_id: JobId) -> PathBuf {
    dir.join(date_dir(date)).join(format!("{job_id}.log"))
}

/// `YYYY/MM/DD` as a relative path.
pub fn date_dir(date: NaiveDate) -> PathBuf {
    PathBuf::from(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
        .join(format!("{:02}", date.day()))
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
