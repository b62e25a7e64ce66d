//! Configuration parsing and validation for presenced
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Target resource, retention, acquisition and schedule settings
//! - Validation with clear error messages

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Values supplied outside the config file (CLI flags, environment)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub target: Option<String>,
}

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<PresenceConfig> {
    load_config_with(path, &ConfigOverrides::default())
}

/// Load a TOML file and apply overrides before validating
pub fn load_config_with(
    path: impl AsRef<Path>,
    overrides: &ConfigOverrides,
) -> ConfigResult<PresenceConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config_with(&content, overrides)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<PresenceConfig> {
    parse_config_with(content, &ConfigOverrides::default())
}

/// Parse a TOML string, apply overrides, then validate
pub fn parse_config_with(
    content: &str,
    overrides: &ConfigOverrides,
) -> ConfigResult<PresenceConfig> {
    let mut raw: RawConfig = toml::from_str(content)?;

    // Check version
    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    if let Some(target) = &overrides.target {
        debug!(target_override = %target, "Overriding target resource");
        raw.target = Some(RawTarget {
            resource_id: target.clone(),
        });
    }

    // Validate
    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    PresenceConfig::from_raw(raw).map_err(|e| ConfigError::ValidationFailed { errors: vec![e] })
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;
