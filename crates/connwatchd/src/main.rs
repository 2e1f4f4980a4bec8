// # connwatchd - Connectivity Monitor Daemon
//
// Thin integration layer. All detection logic lives in connwatch-core; the
// daemon only:
// 1. Reads configuration from the environment (and an optional JSON file)
// 2. Initializes tracing and the runtime
// 3. Wires the system interface source, network probes and platform adapter
//    into a `ConnectivityMonitor`
// 4. Logs every monitor event as one JSON line until SIGINT/SIGTERM
//
// ## Configuration
//
// - `CONNWATCH_CONFIG_FILE`: JSON `MonitorConfig`, applied before overrides
// - `CONNWATCH_INTERFACE_POLL_MS`: interface loop period
// - `CONNWATCH_CONNECTIVITY_INTERVAL_SECS`: full check period
// - `CONNWATCH_DEBOUNCE_MS`: quiet period before a triggered check
// - `CONNWATCH_VPN_GRACE_MS`: start-up window ignoring reported VPN loss
// - `CONNWATCH_BASIC_URL`: URL of the basic check
// - `CONNWATCH_DNS_RESOLVERS`: comma-separated `ip:port` resolvers
// - `CONNWATCH_ADAPTER`: `native` (default) or `generic`
// - `CONNWATCH_SHUTDOWN_TIMEOUT_SECS`: bound on teardown (default 10)
// - `CONNWATCH_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export CONNWATCH_CONNECTIVITY_INTERVAL_SECS=60
// export CONNWATCH_DNS_RESOLVERS=1.1.1.1:53,9.9.9.9:53,208.67.222.222:53
// export CONNWATCH_LOG_LEVEL=debug
//
// connwatchd
// ```

use anyhow::{Context, Result};
use connwatch_core::traits::{InterfaceSource, PlatformAdapter};
use connwatch_core::{ConnectivityMonitor, MonitorConfig, MonitorEvent};
use connwatch_platform::{GenericAdapter, SystemInterfaces};
use connwatch_probes::NetworkProbes;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum ConnwatchExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<ConnwatchExitCode> for ExitCode {
    fn from(code: ConnwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Which platform adapter to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdapterChoice {
    Native,
    Generic,
}

/// Application configuration
struct Config {
    monitor: MonitorConfig,
    adapter: AdapterChoice,
    shutdown_timeout: Duration,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut monitor = match lookup("CONNWATCH_CONFIG_FILE") {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Cannot read CONNWATCH_CONFIG_FILE {}", path))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid monitor configuration in {}", path))?
            }
            None => MonitorConfig::default(),
        };

        if let Some(v) = parse_var(&lookup, "CONNWATCH_INTERFACE_POLL_MS")? {
            monitor.engine.interface_poll_interval_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "CONNWATCH_CONNECTIVITY_INTERVAL_SECS")? {
            monitor.engine.connectivity_interval_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "CONNWATCH_DEBOUNCE_MS")? {
            monitor.engine.debounce_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "CONNWATCH_VPN_GRACE_MS")? {
            monitor.engine.vpn_grace_period_ms = v;
        }
        if let Some(url) = lookup("CONNWATCH_BASIC_URL") {
            monitor.probes.basic_url = url;
        }
        if let Some(list) = lookup("CONNWATCH_DNS_RESOLVERS") {
            monitor.probes.dns_resolvers = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<SocketAddr>()
                        .with_context(|| format!("CONNWATCH_DNS_RESOLVERS entry '{}' is not ip:port", s))
                })
                .collect::<Result<_>>()?;
        }

        let adapter = match lookup("CONNWATCH_ADAPTER").as_deref() {
            None | Some("native") => AdapterChoice::Native,
            Some("generic") => AdapterChoice::Generic,
            Some(other) => anyhow::bail!(
                "CONNWATCH_ADAPTER '{}' is not supported. Supported: native, generic",
                other
            ),
        };

        let shutdown_timeout =
            Duration::from_secs(parse_var(&lookup, "CONNWATCH_SHUTDOWN_TIMEOUT_SECS")?.unwrap_or(10));

        Ok(Self {
            monitor,
            adapter,
            shutdown_timeout,
            log_level: lookup("CONNWATCH_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.monitor.validate()?;

        let url = &self.monitor.probes.basic_url;
        if !url.starts_with("https://") && !url.starts_with("http://") {
            anyhow::bail!("CONNWATCH_BASIC_URL must use HTTP or HTTPS scheme. Got: {}", url);
        }

        if !(1..=3600).contains(&self.monitor.engine.connectivity_interval_secs) {
            anyhow::bail!(
                "CONNWATCH_CONNECTIVITY_INTERVAL_SECS must be between 1 and 3600 seconds. Got: {}",
                self.monitor.engine.connectivity_interval_secs
            );
        }

        if self.shutdown_timeout.is_zero() || self.shutdown_timeout > Duration::from_secs(300) {
            anyhow::bail!(
                "CONNWATCH_SHUTDOWN_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                self.shutdown_timeout.as_secs()
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "CONNWATCH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} '{}' is not valid: {}", key, raw, e)),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ConnwatchExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return ConnwatchExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ConnwatchExitCode::ConfigError.into();
    }

    info!("Starting connwatchd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ConnwatchExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            ConnwatchExitCode::RuntimeError
        } else {
            ConnwatchExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let interfaces: Arc<dyn InterfaceSource> = Arc::new(SystemInterfaces::new());
    let probes = Arc::new(NetworkProbes::new(config.monitor.probes.clone())?);
    let adapter: Arc<dyn PlatformAdapter> = match config.adapter {
        AdapterChoice::Native => connwatch_platform::select_adapter(interfaces.clone()),
        AdapterChoice::Generic => Arc::new(GenericAdapter::new(interfaces.clone())),
    };
    info!("Using {} platform adapter", adapter.name());

    let monitor = ConnectivityMonitor::new(config.monitor, probes, adapter, interfaces)?;
    let mut events = monitor.subscribe();

    let state = monitor.initialize().await;
    info!(
        "Baseline: online={} quality={} confidence={:.2} vpn={}",
        state.is_online, state.network_quality, state.confidence, state.vpn_active
    );

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    let reason = loop {
        tokio::select! {
            signal = &mut shutdown => break signal?,
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(missed)) => warn!("Event log fell behind, {} event(s) skipped", missed),
                Err(RecvError::Closed) => break "monitor stopped",
            },
        }
    };

    info!("Shutting down ({})", reason);
    if tokio::time::timeout(config.shutdown_timeout, monitor.destroy())
        .await
        .is_err()
    {
        anyhow::bail!("Teardown did not finish within {:?}", config.shutdown_timeout);
    }
    info!("Monitor stopped");

    Ok(())
}

fn log_event(event: &MonitorEvent) {
    match serde_json::to_string(event) {
        Ok(line) => info!("{}", line),
        Err(e) => warn!("Cannot serialize event: {}", e),
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
