use std::sync::Mutex;

use chrono::{DateTime, Duration, Local, TimeZone};
use crontabd::clock::Clock;

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Clock set to the given local wall time.
    pub fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> Self {
        let now = Local
            .with_ymd_and_hms(y, m, d, hh, mm, ss)
            .single()
            .expect("unambiguous local time");
        Self::new(now)
    }

    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap()
    }
}
