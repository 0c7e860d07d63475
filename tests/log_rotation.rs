mod common;

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use common::TestResult;
use crontabd::exec::LogWriter;
use crontabd_test_utils::clock::ManualClock;

#[test]
fn writes_across_midnight_land_in_two_files() -> TestResult {
    let dir = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::at(2026, 5, 31, 23, 59, 58));
    let mut writer = LogWriter::new(dir.path(), 42, clock.clone());

    writer.open();
    writer.write(b"before midnight\n");
    clock.advance(Duration::seconds(3));
    writer.write(b"after midnight\n");
    writer.write(b"still june\n");
    writer.close();

    let may = writer.path_for(NaiveDate::from_ymd_opt(2026, 5, 31).ok_or("date")?);
    let june = writer.path_for(NaiveDate::from_ymd_opt(2026, 6, 1).ok_or("date")?);
    assert!(may.ends_with("2026/05/31/42.log"));
    assert!(june.ends_with("2026/06/01/42.log"));
    assert_eq!(std::fs::read_to_string(may)?, "before midnight\n");
    assert_eq!(std::fs::read_to_string(june)?, "after midnight\nstill june\n");
    Ok(())
}

#[test]
fn reopening_appends_to_the_same_day() -> TestResult {
    let dir = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::at(2026, 5, 31, 10, 0, 0));

    for chunk in ["one\n", "two\n"] {
        let mut writer = LogWriter::new(dir.path(), 1, clock.clone());
        writer.write(chunk.as_bytes());
        writer.close();
    }

    let writer = LogWriter::new(dir.path(), 1, clock);
    let path = writer.path_for(NaiveDate::from_ymd_opt(2026, 5, 31).ok_or("date")?);
    assert_eq!(std::fs::read_to_string(path)?, "one\ntwo\n");
    Ok(())
}

#[test]
fn fixed_path_never_rotates() -> TestResult {
    let dir = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::at(2026, 5, 31, 23, 59, 59));
    let fixed = dir.path().join("pinned.log");
    let mut writer = LogWriter::new(dir.path(), 3, clock.clone()).with_fixed_path(Some(fixed.clone()));

    writer.write(b"a\n");
    clock.advance(Duration::seconds(2));
    writer.write(b"b\n");
    writer.close();

    assert_eq!(std::fs::read_to_string(fixed)?, "a\nb\n");
    Ok(())
}
