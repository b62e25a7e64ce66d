//! Validated configuration ready for the presence engine

use crate::schema::RawConfig;
use crate::validation::{parse_time, ValidationError};
use chrono_tz::Tz;
use presence_util::{default_state_dir, parse_timezone, ResourceId, RetentionWindow};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Kolkata;

/// Validated configuration for one automation run
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    pub target: ResourceId,
    pub timezone: Tz,
    pub retention: RetentionConfig,
    pub acquisition: AcquisitionConfig,
    pub schedule: ScheduleConfig,
    pub keepalive: KeepAliveConfig,
    pub daemon: DaemonConfig,
}

impl PresenceConfig {
    /// Defaults for everything except the target
    pub fn new(target: ResourceId) -> Self {
        Self {
            target,
            timezone: DEFAULT_TIMEZONE,
            retention: RetentionConfig::default(),
            acquisition: AcquisitionConfig::default(),
            schedule: ScheduleConfig::default(),
            keepalive: KeepAliveConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }

    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Result<Self, ValidationError> {
        let target = raw.target.ok_or(ValidationError::MissingTarget)?;
        let target = ResourceId::parse(&target.resource_id).map_err(|e| {
            ValidationError::InvalidTarget {
                value: target.resource_id.clone(),
                message: e.to_string(),
            }
        })?;

        let timezone = match raw.timezone {
            Some(name) => {
                parse_timezone(&name).map_err(|_| ValidationError::UnknownTimezone(name))?
            }
            None => DEFAULT_TIMEZONE,
        };

        let retention_defaults = RetentionConfig::default();
        let window = match raw.retention.window {
            Some(w) => {
                let start = parse_time(&w.start).map_err(|message| {
                    ValidationError::InvalidTimeFormat {
                        value: w.start.clone(),
                        message,
                    }
                })?;
                let end = parse_time(&w.end).map_err(|message| {
                    ValidationError::InvalidTimeFormat {
                        value: w.end.clone(),
                        message,
                    }
                })?;
                RetentionWindow::new(start, end)
            }
            None => retention_defaults.window,
        };

        let retention = RetentionConfig {
            base: secs_or(raw.retention.base_seconds, retention_defaults.base),
            jitter: secs_or(raw.retention.jitter_seconds, retention_defaults.jitter),
            cooldown: secs_or(raw.retention.cooldown_seconds, retention_defaults.cooldown),
            window,
        };

        let acq = AcquisitionConfig::default();
        let acquisition = AcquisitionConfig {
            max_attempts: raw.acquisition.max_attempts.unwrap_or(acq.max_attempts),
            retry_delay: secs_or(raw.acquisition.retry_delay_seconds, acq.retry_delay),
            conflict_settle: secs_or(raw.acquisition.conflict_settle_seconds, acq.conflict_settle),
            max_conflict_retries: raw
                .acquisition
                .max_conflict_retries
                .unwrap_or(acq.max_conflict_retries),
        };

        let sched = ScheduleConfig::default();
        let schedule = ScheduleConfig {
            tick: secs_or(raw.schedule.tick_seconds, sched.tick),
            busy_retry: secs_or(raw.schedule.busy_retry_seconds, sched.busy_retry),
            error_backoff: secs_or(raw.schedule.error_backoff_seconds, sched.error_backoff),
            not_found_backoff: secs_or(
                raw.schedule.not_found_backoff_seconds,
                sched.not_found_backoff,
            ),
        };

        let ka = KeepAliveConfig::default();
        let keepalive = KeepAliveConfig {
            enabled: raw.keepalive.enabled.unwrap_or(ka.enabled),
            frame_interval: raw
                .keepalive
                .frame_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(ka.frame_interval),
        };

        let gateway = match raw.daemon.gateway.as_deref() {
            None | Some("loopback") => GatewayKind::Loopback,
            Some(other) => return Err(ValidationError::UnknownGateway(other.to_string())),
        };

        Ok(Self {
            target,
            timezone,
            retention,
            acquisition,
            schedule,
            keepalive,
            daemon: DaemonConfig {
                status_file: raw.daemon.status_file.map(resolve_state_path),
                gateway,
            },
        })
    }
}

/// Relative paths live under the state directory
fn resolve_state_path(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        default_state_dir().join(path)
    }
}

fn secs_or(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_secs).unwrap_or(default)
}

/// Retention policy inputs
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub base: Duration,
    pub jitter: Duration,
    pub cooldown: Duration,
    pub window: RetentionWindow,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(3600),
            jitter: Duration::from_secs(3600),
            cooldown: Duration::from_secs(900),
            window: RetentionWindow::night(),
        }
    }
}

/// Acquisition retry budget
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub conflict_settle: Duration,
    pub max_conflict_retries: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            conflict_settle: Duration::from_secs(2),
            max_conflict_retries: 5,
        }
    }
}

/// Control loop timing
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Period of the control loop tick
    pub tick: Duration,
    /// Minimum spacing of occupancy re-checks while busy
    pub busy_retry: Duration,
    /// Backoff after an unexpected fault
    pub error_backoff: Duration,
    /// Backoff while the target does not resolve
    pub not_found_backoff: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(30),
            busy_retry: Duration::from_secs(60),
            error_backoff: Duration::from_secs(60),
            not_found_backoff: Duration::from_secs(60),
        }
    }
}

/// Keep-alive emission
#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    pub enabled: bool,
    pub frame_interval: Duration,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frame_interval: Duration::from_millis(20),
        }
    }
}

/// Gateway adapter selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayKind {
    /// In-process simulated resource
    #[default]
    Loopback,
}

/// Daemon configuration
#[derive(Debug, Clone, Default)]
pub struct DaemonConfig {
    pub status_file: Option<PathBuf>,
    pub gateway: GatewayKind,
}
