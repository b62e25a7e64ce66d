//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// IANA timezone used to evaluate the retention window
    pub timezone: Option<String>,

    /// Resource to occupy (required, may be supplied by override)
    pub target: Option<RawTarget>,

    #[serde(default)]
    pub retention: RawRetention,

    #[serde(default)]
    pub acquisition: RawAcquisition,

    #[serde(default)]
    pub schedule: RawSchedule,

    #[serde(default)]
    pub keepalive: RawKeepAlive,

    /// Daemon-level settings
    #[serde(default)]
    pub daemon: RawDaemonConfig,
}

/// Target resource
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawTarget {
    pub resource_id: String,
}

/// How long a held session is kept
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRetention {
    /// Base hold time in seconds
    pub base_seconds: Option<u64>,

    /// Upper bound of the uniform random extension, in seconds
    pub jitter_seconds: Option<u64>,

    /// Pause after a voluntary release before the next acquisition
    pub cooldown_seconds: Option<u64>,

    /// Window of indefinite retention
    pub window: Option<RawWindow>,
}

/// Daily window
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawWindow {
    /// Start time (HH:MM format)
    pub start: String,

    /// End time (HH:MM format)
    pub end: String,
}

/// Acquisition retry budget
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawAcquisition {
    pub max_attempts: Option<u32>,

    /// Delay after a failed attempt, in seconds
    pub retry_delay_seconds: Option<u64>,

    /// Delay after force-releasing on an "already connected" conflict
    pub conflict_settle_seconds: Option<u64>,

    /// Ceiling for conflict retries within one acquisition
    pub max_conflict_retries: Option<u32>,
}

/// Control loop timing
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSchedule {
    pub tick_seconds: Option<u64>,
    pub busy_retry_seconds: Option<u64>,
    pub error_backoff_seconds: Option<u64>,
    pub not_found_backoff_seconds: Option<u64>,
}

/// Keep-alive emission
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawKeepAlive {
    pub enabled: Option<bool>,
    pub frame_interval_ms: Option<u64>,
}

/// Daemon-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDaemonConfig {
    /// Write a JSON state snapshot here after each transition
    pub status_file: Option<PathBuf>,

    /// Gateway adapter: "loopback"
    pub gateway: Option<String>,
}
