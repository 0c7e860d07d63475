// src/service/clean.rs

//! Log directory maintenance: size accounting and age-based cleanup.

use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Days, Local, Months};
use tracing::debug;

use crate::errors::{AgentError, Result};
use crate::types::CleanUnit;

/// Total size of regular files under `path`; unreadable entries count as 0.
pub fn dir_size(path: &Path) -> u64 {
    let mut total = 0u64;
    if let Ok(entries) = fs::read_dir(path) {
        for entry in entries.flatten() {
            let p = entry.path();
            if let Ok(md) = fs::symlink_metadata(&p) {
                if md.is_dir() {
                    total += dir_size(&p);
                } else if md.is_file() {
                    total += md.len();
                }
            }
        }
    }
    total
}

/// `now - offset` in the given unit.
pub fn cutoff(now: DateTime<Local>, unit: CleanUnit, offset: u32) -> Result<DateTime<Local>> {
    let shifted = match unit {
        CleanUnit::Day => now.checked_sub_days(Days::new(u64::from(offset))),
        CleanUnit::Month => now.checked_sub_months(Months::new(offset)),
    };
    shifted.ok_or_else(|| AgentError::ConfigError(format!("clean offset {offset} out of range")))
}

/// Remove files under `root` last modified before `cutoff` and prune the
/// directories this leaves empty (never `root` itself). Returns the number
/// of removed files and the bytes they held.
pub fn remove_older_than(root: &Path, cutoff: SystemTime) -> io::Result<(u64, u64)> {
    if !root.exists() {
        return Ok((0, 0));
    }
    let mut removed = (0, 0);
    remove_in(root, cutoff, &mut removed)?;
    Ok(removed)
}

// Entries that disappear mid-walk (a job rotating its log, a concurrent
// cleanup) are skipped; any other error stops the walk.
fn remove_in(dir: &Path, cutoff: SystemTime, removed: &mut (u64, u64)) -> io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => return tolerate_missing(dir, Err(e)),
    };
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                tolerate_missing(dir, Err(e))?;
                continue;
            }
        };
        tolerate_missing(&path, remove_entry(&path, cutoff, removed))?;
    }
    Ok(())
}

fn remove_entry(path: &Path, cutoff: SystemTime, removed: &mut (u64, u64)) -> io::Result<()> {
    let md = fs::symlink_metadata(path)?;
    if md.is_dir() {
        remove_in(path, cutoff, removed)?;
        if fs::read_dir(path)?.next().is_none() {
            fs::remove_dir(path)?;
        }
    } else if md.modified()? < cutoff {
        fs::remove_file(path)?;
        removed.0 += 1;
        removed.1 += md.len();
    }
    Ok(())
}

fn tolerate_missing(path: &Path, result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "log entry vanished during cleanup");
            Ok(())
        }
        other => other,
    }
}

/// Format a size in human-readable form (`512B`, `1.5KB`, `20MB`).
pub fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{bytes}B")
    } else if size >= 10.0 {
        format!("{size:.0}{}", UNITS[unit_idx])
    } else {
        format!("{size:.1}{}", UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs::File;
    use std::time::Duration;

    #[test]
    fn sizes() {
        assert_eq!(human_size(512), "512B");
        assert_eq!(human_size(1536), "1.5KB");
        assert_eq!(human_size(20 * 1024 * 1024), "20MB");
    }

    #[test]
    fn month_cutoff_clamps_to_month_end() {
        let now = Local.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let c = cutoff(now, CleanUnit::Month, 1).unwrap();
        assert_eq!(c.format("%Y-%m-%d").to_string(), "2024-02-29");
        let d = cutoff(now, CleanUnit::Day, 31).unwrap();
        assert_eq!(d.format("%Y-%m-%d").to_string(), "2024-02-29");
    }

    #[test]
    fn removes_old_files_and_prunes_dirs() -> io::Result<()> {
        let root = tempfile::tempdir()?;
        let old_dir = root.path().join("crontab_task/2020/01/01");
        let new_dir = root.path().join("crontab_task/2099/01/01");
        fs::create_dir_all(&old_dir)?;
        fs::create_dir_all(&new_dir)?;
        fs::write(old_dir.join("1.log"), b"old\n")?;
        fs::write(new_dir.join("1.log"), b"fresh\n")?;

        let long_ago = SystemTime::now() - Duration::from_secs(90 * 24 * 3600);
        File::options()
            .write(true)
            .open(old_dir.join("1.log"))?
            .set_modified(long_ago)?;

        let cutoff = SystemTime::now() - Duration::from_secs(24 * 3600);
        assert_eq!(remove_older_than(root.path(), cutoff)?, (1, 4));
        assert!(!root.path().join("crontab_task/2020").exists());
        assert!(new_dir.join("1.log").exists());
        assert_eq!(dir_size(root.path()), 6);
        Ok(())
    }

    #[test]
    fn vanished_directory_is_skipped() -> io::Result<()> {
        let root = tempfile::tempdir()?;
        let mut removed = (0, 0);
        remove_in(&root.path().join("gone"), SystemTime::now(), &mut removed)?;
        assert_eq!(removed, (0, 0));
        Ok(())
    }

    #[test]
    fn only_missing_entries_are_tolerated() {
        let path = Path::new("/var/log/crontabd/x.log");
        let missing = io::Error::from(io::ErrorKind::NotFound);
        assert!(tolerate_missing(path, Err(missing)).is_ok());

        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        let err = tolerate_missing(path, Err(denied)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
