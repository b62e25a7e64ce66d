//! Configuration validation

use crate::schema::{RawConfig, RawWindow};
use presence_util::{parse_timezone, ResourceId, WallClock};
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Missing [target] resource_id")]
    MissingTarget,

    #[error("Invalid target resource id '{value}': {message}")]
    InvalidTarget { value: String, message: String },

    #[error("Unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("Retention window {start}-{end} is empty")]
    EmptyWindow { start: String, end: String },

    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("{field} must be at most {max}")]
    TooLarge { field: &'static str, max: u64 },

    #[error("Unknown gateway adapter '{0}'")]
    UnknownGateway(String),
}

/// Upper bound for every `*_seconds` setting (one year)
pub const MAX_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Upper bound for `keepalive.frame_interval_ms`
pub const MAX_FRAME_INTERVAL_MS: u64 = 60_000;

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    match &config.target {
        None => errors.push(ValidationError::MissingTarget),
        Some(target) => {
            if let Err(e) = ResourceId::parse(&target.resource_id) {
                errors.push(ValidationError::InvalidTarget {
                    value: target.resource_id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    if let Some(tz) = &config.timezone
        && parse_timezone(tz).is_err()
    {
        errors.push(ValidationError::UnknownTimezone(tz.clone()));
    }

    if let Some(window) = &config.retention.window {
        errors.extend(validate_window(window));
    }

    let positive = [
        ("acquisition.max_attempts", config.acquisition.max_attempts.map(u64::from)),
        ("schedule.tick_seconds", config.schedule.tick_seconds),
        ("keepalive.frame_interval_ms", config.keepalive.frame_interval_ms),
    ];
    for (field, value) in positive {
        if value == Some(0) {
            errors.push(ValidationError::MustBePositive { field });
        }
    }

    let bounded = [
        ("retention.base_seconds", config.retention.base_seconds, MAX_SECONDS),
        ("retention.jitter_seconds", config.retention.jitter_seconds, MAX_SECONDS),
        ("retention.cooldown_seconds", config.retention.cooldown_seconds, MAX_SECONDS),
        ("acquisition.retry_delay_seconds", config.acquisition.retry_delay_seconds, MAX_SECONDS),
        (
            "acquisition.conflict_settle_seconds",
            config.acquisition.conflict_settle_seconds,
            MAX_SECONDS,
        ),
        ("schedule.tick_seconds", config.schedule.tick_seconds, MAX_SECONDS),
        ("schedule.busy_retry_seconds", config.schedule.busy_retry_seconds, MAX_SECONDS),
        ("schedule.error_backoff_seconds", config.schedule.error_backoff_seconds, MAX_SECONDS),
        (
            "schedule.not_found_backoff_seconds",
            config.schedule.not_found_backoff_seconds,
            MAX_SECONDS,
        ),
        (
            "keepalive.frame_interval_ms",
            config.keepalive.frame_interval_ms,
            MAX_FRAME_INTERVAL_MS,
        ),
    ];
    for (field, value, max) in bounded {
        if value.is_some_and(|v| v > max) {
            errors.push(ValidationError::TooLarge { field, max });
        }
    }

    if let Some(gateway) = &config.daemon.gateway
        && gateway != "loopback"
    {
        errors.push(ValidationError::UnknownGateway(gateway.clone()));
    }

    errors
}

fn validate_window(window: &RawWindow) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let start = parse_time(&window.start);
    if let Err(e) = &start {
        errors.push(ValidationError::InvalidTimeFormat {
            value: window.start.clone(),
            message: e.clone(),
        });
    }

    let end = parse_time(&window.end);
    if let Err(e) = &end {
        errors.push(ValidationError::InvalidTimeFormat {
            value: window.end.clone(),
            message: e.clone(),
        });
    }

    if let (Ok(start), Ok(end)) = (start, end)
        && start == end
    {
        errors.push(ValidationError::EmptyWindow {
            start: window.start.clone(),
            end: window.end.clone(),
        });
    }

    errors
}

/// Parse HH:MM time format
pub fn parse_time(s: &str) -> Result<WallClock, String> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.len() != 2 {
        return Err("Expected HH:MM format".into());
    }

    let hour: u8 = parts[0]
        .parse()
        .map_err(|_| "Invalid hour".to_string())?;
    let minute: u8 = parts[1]
        .parse()
        .map_err(|_| "Invalid minute".to_string())?;

    if hour >= 24 {
        return Err("Hour must be 0-23".into());
    }
    if minute >= 60 {
        return Err("Minute must be 0-59".into());
    }

    WallClock::new(hour, minute).ok_or_else(|| "Invalid time".to_string())
}
