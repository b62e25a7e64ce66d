//! Default paths for presenced
//!
//! Paths are user-writable by default:
//! - Config: `$XDG_CONFIG_HOME/presenced/config.toml` or `~/.config/presenced/config.toml`
//! - State: `$XDG_STATE_HOME/presenced` or `~/.local/state/presenced`

use std::path::PathBuf;

/// Environment variable for overriding the config path
pub const PRESENCE_CONFIG_ENV: &str = "PRESENCE_CONFIG";

/// Application subdirectory name
const APP_DIR: &str = "presenced";

const CONFIG_FILENAME: &str = "config.toml";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$PRESENCE_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/presenced/config.toml`
/// 3. `~/.config/presenced/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(PRESENCE_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Get the default state directory (status file lives here).
pub fn default_state_dir() -> PathBuf {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(state_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("state")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR)
}
