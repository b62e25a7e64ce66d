//! presenced - keeps an automated account present in a shared voice resource
//!
//! This is the main entry point for the presenced service.
//! It wires together all the components:
//! - Configuration loading
//! - Gateway adapter (loopback)
//! - Event relay
//! - Presence engine and its control loop
//! - Status file reporting

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use presence_config::{ConfigOverrides, GatewayKind, PresenceConfig, load_config_with};
use presence_core::{
    EventRelay, KeepAlive, NoopKeepAlive, PresenceEngine, PresenceEvent, PresenceLoop,
    PresenceSnapshot, SilenceEmitter,
};
use presence_gateway_api::{Gateway, MockGateway, SystemClock};
use presence_util::{
    Identity, MOCK_TIME_ENV_VAR, ResourceId, default_config_path, format_duration,
    is_mock_time_active,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Identity the loopback gateway reports for the automated account
const LOOPBACK_IDENTITY: &str = "presenced";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// presenced - Voice presence keeper
#[derive(Parser, Debug)]
#[command(name = "presenced")]
#[command(about = "Keeps an account present in a shared voice resource while it is empty", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/presenced/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Target resource override (or set PRESENCE_TARGET env var)
    #[arg(short, long, env = "PRESENCE_TARGET")]
    target: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

/// Main service state
struct Service {
    config: PresenceConfig,
    gateway: Arc<dyn Gateway>,
    engine: PresenceEngine,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        let config = load(args)?;

        info!(
            config_path = %args.config.display(),
            resource = %config.target,
            timezone = %config.timezone,
            window = %format!("{}-{}", config.retention.window.start, config.retention.window.end),
            "Configuration loaded"
        );

        let gateway = build_gateway(&config);

        let keepalive: Arc<dyn KeepAlive> = if config.keepalive.enabled {
            Arc::new(SilenceEmitter::new(
                gateway.clone(),
                config.keepalive.frame_interval,
            ))
        } else {
            info!("Keep-alive disabled");
            Arc::new(NoopKeepAlive)
        };

        let engine = PresenceEngine::new(
            &config,
            gateway.clone(),
            Arc::new(SystemClock::new(config.timezone)),
            keepalive,
            StdRng::from_entropy(),
        )
        .context("Failed to initialize presence engine")?;

        Ok(Self {
            config,
            gateway,
            engine,
        })
    }

    async fn run(self) -> Result<()> {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let relay = EventRelay::new(self.gateway.self_identity(), self.config.target.clone());
        let relay_task = relay.spawn(self.gateway.subscribe(), signal_tx);

        let _signals = spawn_signal_listener(shutdown_tx)?;

        let status_file = self.config.daemon.status_file.clone();
        if let Some(path) = &status_file {
            write_status(path, &self.engine.snapshot())?;
            info!(path = %path.display(), "Writing status file");
        }

        info!("Service running");

        let presence = PresenceLoop::new(self.engine, signal_rx, shutdown_rx);
        let engine = presence
            .run(|snapshot, events| {
                for event in events {
                    log_event(event);
                }
                if let Some(path) = &status_file
                    && let Err(e) = write_status(path, snapshot)
                {
                    warn!(path = %path.display(), error = %e, "Failed to write status file");
                }
            })
            .await;

        relay_task.abort();

        info!(state = %engine.state(), "Shutdown complete");
        Ok(())
    }
}

/// Read the config file, or run on defaults when only a target was given
fn load(args: &Args) -> Result<PresenceConfig> {
    let overrides = ConfigOverrides {
        target: args.target.clone(),
    };

    if !args.config.exists()
        && let Some(target) = &args.target
    {
        warn!(
            config_path = %args.config.display(),
            "Config file not found, using defaults"
        );
        let target = ResourceId::parse(target).context("Invalid target resource")?;
        return Ok(PresenceConfig::new(target));
    }

    load_config_with(&args.config, &overrides)
        .with_context(|| format!("Failed to load config from {:?}", args.config))
}

fn build_gateway(config: &PresenceConfig) -> Arc<dyn Gateway> {
    match config.daemon.gateway {
        GatewayKind::Loopback => {
            info!(resource = %config.target, "Using loopback gateway");
            Arc::new(
                MockGateway::new(Identity::new(LOOPBACK_IDENTITY))
                    .with_resource(config.target.clone()),
            )
        }
    }
}

/// Flip the shutdown flag on SIGTERM, SIGINT or SIGHUP
fn spawn_signal_listener(shutdown: watch::Sender<bool>) -> Result<JoinHandle<()>> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            _ = sighup.recv() => info!("Received SIGHUP, shutting down gracefully"),
        }
        let _ = shutdown.send(true);
    }))
}

fn log_event(event: &PresenceEvent) {
    match event {
        PresenceEvent::Released {
            session_id,
            reason,
            held_for,
        } => info!(
            session_id = %session_id,
            reason = ?reason,
            held_for = %format_duration(*held_for),
            "Session ended"
        ),
        PresenceEvent::Acquired {
            session_id,
            attempts,
            conflicts,
            ..
        } => info!(session_id = %session_id, attempts, conflicts, "Session acquired"),
        PresenceEvent::AcquisitionFailed {
            attempts,
            conflicts,
        } => warn!(attempts, conflicts, "Acquisition failed"),
        other => debug!(event = ?other, "Presence event"),
    }
}

/// Replace the status file atomically
fn write_status(path: &Path, snapshot: &PresenceSnapshot) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create status directory {:?}", parent))?;
    }

    let json = serde_json::to_vec_pretty(snapshot).context("Failed to serialize status")?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {:?}", tmp))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {:?}", path))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }

    info!(version = env!("CARGO_PKG_VERSION"), "presenced starting");
    if is_mock_time_active() {
        warn!(
            env_var = MOCK_TIME_ENV_VAR,
            "Mock time is active, retention window follows the mocked clock"
        );
    }

    let service = Service::new(&args)?;
    service.run().await
}
