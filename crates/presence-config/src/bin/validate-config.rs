//! Config validation CLI tool
//!
//! Validates a presenced configuration file and reports any errors.

use presence_util::{default_config_path, format_duration};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a presenced configuration file.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match presence_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", presence_config::CURRENT_CONFIG_VERSION);
            println!("  Target:         {}", config.target);
            println!("  Timezone:       {}", config.timezone);
            println!(
                "  Window:         {}-{}{}",
                config.retention.window.start,
                config.retention.window.end,
                if config.retention.window.crosses_midnight() {
                    " (crosses midnight)"
                } else {
                    ""
                }
            );
            println!(
                "  Retention:      {} + up to {}",
                format_duration(config.retention.base),
                format_duration(config.retention.jitter)
            );
            println!("  Cooldown:       {}", format_duration(config.retention.cooldown));
            println!(
                "  Acquisition:    {} attempts, {} apart",
                config.acquisition.max_attempts,
                format_duration(config.acquisition.retry_delay)
            );
            ExitCode::SUCCESS
        }
        Err(presence_config::ConfigError::ValidationFailed { errors }) => {
            eprintln!("✗ Configuration has {} error(s):", errors.len());
            for error in errors {
                eprintln!("  - {}", error);
            }
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("✗ Failed to load configuration: {}", e);
            ExitCode::from(1)
        }
    }
}
