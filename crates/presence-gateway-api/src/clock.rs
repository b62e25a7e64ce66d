//! Wall clock used for retention window evaluation

use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use std::sync::Mutex;
use std::time::Duration;

/// Source of timezone-qualified wall time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
}

/// Real clock in a fixed timezone (honours mock time in debug builds)
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        presence_util::now_in(&self.tz)
    }
}

/// Test clock that starts at a fixed wall time and advances with tokio time.
///
/// Under `tokio::time::pause()` the wall time moves exactly as far as the
/// paused runtime is advanced.
#[derive(Debug)]
pub struct MockClock {
    anchor: Mutex<(DateTime<Tz>, tokio::time::Instant)>,
}

impl MockClock {
    pub fn new(start: DateTime<Tz>) -> Self {
        Self {
            anchor: Mutex::new((start, tokio::time::Instant::now())),
        }
    }

    /// Convenience constructor from local date/time components
    pub fn at(tz: Tz, year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
        let start = tz
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .earliest()
            .expect("valid local time");
        Self::new(start)
    }

    /// Jump the wall clock without moving tokio time
    pub fn set(&self, now: DateTime<Tz>) {
        *self.anchor.lock().unwrap() = (now, tokio::time::Instant::now());
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Tz> {
        let (start, anchor) = *self.anchor.lock().unwrap();
        let elapsed: Duration = anchor.elapsed();
        start + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }
}
