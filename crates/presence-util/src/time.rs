//! Time utilities for presenced
//!
//! Provides timezone-aware wall-clock time (for the retention window) and
//! the window type itself.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `PRESENCE_MOCK_TIME` environment variable can be set
//! to override the wall clock. The value is interpreted in the configured
//! timezone and then advances at the same rate as real time.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 01:58:00`)
//!
//! Example:
//! ```bash
//! PRESENCE_MOCK_TIME="2025-12-25 06:59:00" presenced --config dev.toml
//! ```

use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::{UtilError, UtilResult};

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "PRESENCE_MOCK_TIME";

/// Expected format of [`MOCK_TIME_ENV_VAR`]
pub const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Mock wall time paired with the real instant it was captured at.
static MOCK_TIME_ANCHOR: OnceLock<Option<(NaiveDateTime, Instant)>> = OnceLock::new();

fn mock_time_anchor() -> Option<(NaiveDateTime, Instant)> {
    *MOCK_TIME_ANCHOR.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, MOCK_TIME_FORMAT) {
                    Ok(naive) => {
                        tracing::info!(mock_time = %mock_time_str, "Mock time enabled");
                        return Some((naive, Instant::now()));
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = MOCK_TIME_FORMAT,
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    mock_time_anchor().is_some()
}

/// Get the current time in `tz`, respecting mock time settings in debug builds.
pub fn now_in(tz: &Tz) -> DateTime<Tz> {
    if let Some((naive, anchor)) = mock_time_anchor() {
        let elapsed =
            chrono::Duration::from_std(anchor.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        if let Some(start) = tz.from_local_datetime(&naive).earliest() {
            return start + elapsed;
        }
    }

    Utc::now().with_timezone(tz)
}

/// Parse an IANA timezone identifier such as `Asia/Kolkata`
pub fn parse_timezone(name: &str) -> UtilResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| UtilError::UnknownTimezone(name.to_string()))
}

/// Wall-clock time of day with minute precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn from_naive_time(time: NaiveTime) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    /// Returns seconds since midnight
    pub fn as_seconds_from_midnight(&self) -> u32 {
        (self.hour as u32) * 3600 + (self.minute as u32) * 60
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_seconds_from_midnight()
            .cmp(&other.as_seconds_from_midnight())
    }
}

impl std::fmt::Display for WallClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Daily window during which a held session is retained indefinitely
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionWindow {
    pub start: WallClock,
    pub end: WallClock,
}

impl RetentionWindow {
    pub fn new(start: WallClock, end: WallClock) -> Self {
        Self { start, end }
    }

    /// The 02:00-07:00 window used when none is configured
    pub fn night() -> Self {
        Self {
            start: WallClock { hour: 2, minute: 0 },
            end: WallClock { hour: 7, minute: 0 },
        }
    }

    pub fn crosses_midnight(&self) -> bool {
        self.start > self.end
    }

    /// Check whether the local time of `dt` falls within the window
    pub fn is_active<Z: TimeZone>(&self, dt: &DateTime<Z>) -> bool {
        let time = WallClock::from_naive_time(dt.time());

        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }

    /// Time left until the window closes, or `None` when it is not active
    pub fn remaining<Z: TimeZone>(&self, dt: &DateTime<Z>) -> Option<Duration> {
        if !self.is_active(dt) {
            return None;
        }

        let now_secs = dt.time().num_seconds_from_midnight();
        let end_secs = self.end.as_seconds_from_midnight();

        let remaining_secs = if now_secs < end_secs {
            end_secs - now_secs
        } else {
            // Evening portion of a window that closes tomorrow morning
            (86_400 - now_secs) + end_secs
        };

        Some(Duration::from_secs(remaining_secs as u64))
    }
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self::night()
    }
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
