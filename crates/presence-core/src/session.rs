//! Held session and its retention policy

use chrono::DateTime;
use chrono_tz::Tz;
use presence_gateway_api::SessionHandle;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// The four mutually exclusive states of the presence machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    /// Not holding, eligible to attempt acquisition
    Idle,
    /// Holding a session
    Connected,
    /// Acquisition deferred because others occupy the resource
    BusyWait,
    /// Automation suspended while the operator uses the account elsewhere
    ManualOverride,
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connected => "connected",
            Self::BusyWait => "busy_wait",
            Self::ManualOverride => "manual_override",
        };
        f.write_str(name)
    }
}

/// How long a session is held, decided once at acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Held until the retention window closes
    UntilWindowCloses,
    /// Held for a fixed duration from acquisition
    Fixed { duration: Duration },
}

impl RetentionPolicy {
    /// Indefinite inside the window, otherwise `base` plus uniform jitter in `[0, jitter]`,
    /// saturating at [`Duration::MAX`]
    pub fn compute<R: Rng>(
        window_active: bool,
        base: Duration,
        jitter: Duration,
        rng: &mut R,
    ) -> Self {
        if window_active {
            return Self::UntilWindowCloses;
        }

        let extra = rng.gen_range(0..=jitter.as_secs());
        Self::Fixed {
            duration: base.saturating_add(Duration::from_secs(extra)),
        }
    }
}

/// One successful, currently held acquisition
#[derive(Debug)]
pub struct Session {
    pub handle: SessionHandle,

    /// Wall-clock acquisition time (for display/logging)
    pub acquired_at: DateTime<Tz>,

    /// Monotonic acquisition time (for enforcement)
    pub acquired_at_mono: Instant,

    pub retention: RetentionPolicy,

    /// Wall-clock release time; `None` while retained until the window closes
    pub deadline: Option<DateTime<Tz>>,

    pub keepalive_active: bool,
}

impl Session {
    pub fn new(
        handle: SessionHandle,
        retention: RetentionPolicy,
        now: DateTime<Tz>,
        now_mono: Instant,
    ) -> Self {
        let deadline = match retention {
            RetentionPolicy::UntilWindowCloses => None,
            // Past chrono's range there is no displayable deadline
            RetentionPolicy::Fixed { duration } => chrono::Duration::from_std(duration)
                .ok()
                .and_then(|d| now.checked_add_signed(d)),
        };

        Self {
            handle,
            acquired_at: now,
            acquired_at_mono: now_mono,
            retention,
            deadline,
            keepalive_active: false,
        }
    }

    pub fn held_for(&self, now_mono: Instant) -> Duration {
        now_mono.saturating_duration_since(self.acquired_at_mono)
    }

    /// `window_active` is only consulted for the window-bound policy
    pub fn is_expired(&self, now_mono: Instant, window_active: bool) -> bool {
        match self.retention {
            RetentionPolicy::UntilWindowCloses => !window_active,
            RetentionPolicy::Fixed { duration } => self.held_for(now_mono) >= duration,
        }
    }

    /// Time left under a fixed policy
    pub fn time_remaining(&self, now_mono: Instant) -> Option<Duration> {
        match self.retention {
            RetentionPolicy::UntilWindowCloses => None,
            RetentionPolicy::Fixed { duration } => {
                Some(duration.saturating_sub(self.held_for(now_mono)))
            }
        }
    }
}
