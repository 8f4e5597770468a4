// # stockwatchd - Inventory Watcher Daemon
//
// This is a thin integration layer. Polling, diffing, notification and
// persistence all live in stockwatch-core; this binary only wires the
// concrete source and transport into the scheduler.
//
// The daemon is responsible for:
// 1. Reading the JSON configuration and environment overrides
// 2. Initializing logging and the runtime
// 3. Waiting for the channel transport to become ready
// 4. Reporting a pending update log once
// 5. Running the poll scheduler and the status reporter until a signal
//
// ## Environment
//
// - `STOCKWATCH_CONFIG`: Path to the JSON configuration (default `config.json`)
// - `STOCKWATCH_LOG_LEVEL`: trace, debug, info, warn, error (default `info`)
// - `STOCKWATCH_STATE_PATH`: Overrides `state.path` from the configuration
//
// ## Example
//
// ```bash
// export STOCKWATCH_CONFIG=/etc/stockwatch/config.json
// export STOCKWATCH_STATE_PATH=/var/lib/stockwatch/known_vehicles.json
//
// stockwatchd
// ```

use anyhow::Result;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use stockwatch_core::traits::ChannelTransport;
use stockwatch_core::{
    Error, FileStateStore, PollScheduler, StatusReporter, UpdateLogReporter, WatchConfig,
    WatchEvent,
};
use stockwatch_notify_discord::DiscordTransport;
use stockwatch_source_http::ExhibitionClient;
use tokio::sync::{oneshot, watch};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Delay between transport readiness probes
const READY_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum WatchExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<WatchExitCode> for ExitCode {
    fn from(code: WatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon settings taken from the environment
struct DaemonEnv {
    config_path: String,
    state_path: Option<String>,
    log_level: String,
}

impl DaemonEnv {
    fn from_env() -> Self {
        Self {
            config_path: env::var("STOCKWATCH_CONFIG")
                .unwrap_or_else(|_| "config.json".to_string()),
            state_path: env::var("STOCKWATCH_STATE_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            log_level: env::var("STOCKWATCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "STOCKWATCH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    /// Load and validate the configuration, applying overrides
    fn load_config(&self) -> Result<WatchConfig> {
        let mut config = WatchConfig::from_file(&self.config_path)?;
        if let Some(path) = &self.state_path {
            config.state.path = path.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let daemon_env = DaemonEnv::from_env();

    let log_level = match daemon_env.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return WatchExitCode::ConfigError.into();
        }
    };

    let config = match daemon_env.load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration validation error: {}", e);
            return WatchExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return WatchExitCode::ConfigError.into();
    }

    info!("Starting stockwatchd daemon");
    info!(
        "Configuration loaded from {}: {} target(s), {} vehicle code(s)",
        daemon_env.config_path,
        config.targets.len(),
        config.vehicle_codes.len()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return WatchExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => WatchExitCode::CleanShutdown,
            Err(e) if is_config_error(&e) => {
                error!("Startup error: {}", e);
                WatchExitCode::ConfigError
            }
            Err(e) => {
                error!("Daemon error: {}", e);
                WatchExitCode::RuntimeError
            }
        }
    })
    .into()
}

fn is_config_error(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<Error>(), Some(Error::Config(_)))
}

/// Run the daemon
async fn run_daemon(config: WatchConfig) -> Result<()> {
    let transport: Arc<dyn ChannelTransport> = Arc::new(DiscordTransport::from_config(&config.discord)?);

    wait_until_ready(transport.as_ref()).await?;

    if let (Some(path), Some(channel_id)) = (
        config.update_log_path.as_deref(),
        config.discord.update_log_channel_id,
    ) {
        let reporter = UpdateLogReporter::new(path, transport.clone(), channel_id);
        if let Err(e) = reporter.report().await {
            warn!("Update log report failed: {}", e);
        }
    }

    let store = FileStateStore::new(&config.state.path).await?;
    info!("Known state file: {}", store.path().display());

    let source = Arc::new(ExhibitionClient::new(config.api.clone())?);

    let (mut scheduler, mut events) =
        PollScheduler::new(source, transport.clone(), Box::new(store), &config)?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                WatchEvent::VehicleDiscovered {
                    exhb_no,
                    vehicle_id,
                    delivered,
                } => info!(
                    "[{}] vehicle {} discovered (delivered: {})",
                    exhb_no, vehicle_id, delivered
                ),
                other => debug!("Watch event: {:?}", other),
            }
        }
    });

    let (status_tx, status_rx) = watch::channel(false);
    let status_handle = config.discord.status_channel_id.map(|channel_id| {
        let reporter = StatusReporter::new(
            scheduler.status_board(),
            transport.clone(),
            channel_id,
            Duration::from_secs(config.poll.status_interval_secs),
        );
        info!("Status reports every {}s", config.poll.status_interval_secs);
        tokio::spawn(async move { reporter.run(status_rx).await })
    });

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => info!("Received shutdown signal: {}", signal),
            Err(e) => error!("Signal handling failed: {}", e),
        }
        let _ = shutdown_tx.send(());
    });

    info!("Monitoring {} target(s)", config.targets.len());
    let result = scheduler.run_with_shutdown(Some(shutdown_rx)).await;

    let _ = status_tx.send(true);
    if let Some(handle) = status_handle
        && let Err(e) = handle.await
    {
        warn!("Status reporter task ended abnormally: {}", e);
    }

    info!("Shutting down daemon");
    result.map_err(Into::into)
}

/// Block until the transport answers its readiness probe
///
/// Rejected credentials are fatal; anything else is retried.
async fn wait_until_ready(transport: &dyn ChannelTransport) -> Result<()> {
    loop {
        match transport.ready().await {
            Ok(()) => return Ok(()),
            Err(e @ Error::Config(_)) => return Err(e.into()),
            Err(e) => {
                warn!(
                    "{} transport not ready ({}), retrying in {:?}",
                    transport.transport_name(),
                    e,
                    READY_RETRY_DELAY
                );
                tokio::time::sleep(READY_RETRY_DELAY).await;
            }
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
