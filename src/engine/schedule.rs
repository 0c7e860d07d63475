// src/engine/schedule.rs

//! Calendar matcher for crontab jobs.
//!
//! Each of the six fields (second, minute, hour, day of month, month,
//! weekday) is a set of allowed values. Accepted syntax per field:
//! `*`, `N`, `A-B`, `*/S`, `A-B/S`, `N/S` (from N to the field maximum)
//! and comma-separated lists of those. An empty field is a wildcard.
//! A job fires on a second where every field matches.

use chrono::{DateTime, Datelike, Local, Timelike};

use crate::errors::{AgentError, Result};
use crate::store::TimeArgs;

/// Allowed values of one field, as a bit set over `0..64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSet(u64);

impl FieldSet {
    pub fn contains(&self, value: u32) -> bool {
        value < 64 && self.0 & (1 << value) != 0
    }

    pub fn values(&self) -> impl Iterator<Item = u32> + '_ {
        (0..64).filter(move |v| self.contains(*v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    second: FieldSet,
    minute: FieldSet,
    hour: FieldSet,
    day: FieldSet,
    month: FieldSet,
    weekday: FieldSet,
}

impl Schedule {
    pub fn parse(args: &TimeArgs) -> Result<Self> {
        Ok(Self {
            second: parse_field("second", &args.second, 0, 59)?,
            minute: parse_field("minute", &args.minute, 0, 59)?,
            hour: parse_field("hour", &args.hour, 0, 23)?,
            day: parse_field("day", &args.day, 1, 31)?,
            month: parse_field("month", &args.month, 1, 12)?,
            weekday: parse_field("weekday", &args.weekday, 0, 6)?,
        })
    }

    pub fn matches(&self, at: &DateTime<Local>) -> bool {
        self.second.contains(at.second())
            && self.minute.contains(at.minute())
            && self.hour.contains(at.hour())
            && self.day.contains(at.day())
            && self.month.contains(at.month())
            && self.weekday.contains(at.weekday().num_days_from_sunday())
    }
}

pub fn parse_field(name: &str, expr: &str, min: u32, max: u32) -> Result<FieldSet> {
    let invalid = |why: String| AgentError::InvalidSchedule(format!("{name} '{expr}': {why}"));

    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(span(min, max, 1));
    }

    let mut bits = 0u64;
    for part in expr.split(',') {
        let part = part.trim();
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(format!("bad step '{step}'")))?;
                if step == 0 {
                    return Err(invalid("step must be at least 1".to_string()));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let number = |s: &str| -> Result<u32> {
            s.trim()
                .parse::<u32>()
                .map_err(|_| invalid(format!("bad value '{s}'")))
        };

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (number(a)?, number(b)?)
        } else {
            let n = number(range)?;
            if step.is_some() { (n, max) } else { (n, n) }
        };

        if lo < min || hi > max || lo > hi {
            return Err(invalid(format!("{lo}-{hi} outside {min}-{max}")));
        }
        bits |= span(lo, hi, step.unwrap_or(1)).0;
    }
    Ok(FieldSet(bits))
}

fn span(lo: u32, hi: u32, step: u32) -> FieldSet {
    let mut bits = 0u64;
    let mut v = lo;
    while v <= hi {
        bits |= 1 << v;
        v += step;
    }
    FieldSet(bits)
}
