// src/clock.rs

//! Wall-clock abstraction.
//!
//! Log rotation and log-line prefixes depend on the local date/time. Going
//! through a trait lets tests move time across midnight without sleeping.

use std::fmt::Debug;

use chrono::{DateTime, Local};

/// Timestamp layout used in verbose log prefixes.
pub const TIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Local>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
