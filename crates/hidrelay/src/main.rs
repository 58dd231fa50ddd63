//! HID relay entry point.
//!
//! Wires the device, the peer connection and the two long-lived tasks
//! together, then waits for either task to finish.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  ├─ Cli::into_app_config()      -- config file + CLI overrides
//!  ├─ init_logging()
//!  ├─ open_device()               -- fatal on failure
//!  ├─ network::connect()          -- fatal on failure
//!  ├─ DeviceLink::run()           -- blocking thread
//!  └─ NetworkRelay::run()         -- tokio task
//! ```
//!
//! # Shutdown
//!
//! Ctrl+C clears the shared `running` flag and both tasks stop at their next
//! check.  If one task stops on its own (for example the device was
//! unplugged) the flag is cleared as well, so the other task follows.  Both
//! are always joined before `main` returns; the process exits non-zero if
//! either of them failed.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use hidrelay_core::Mailbox;
use tokio::task::JoinError;
use tracing::{error, info};

use hidrelay::application::{device_link::DeviceLink, network_relay::NetworkRelay};
use hidrelay::infrastructure::{
    device::open_device,
    logging::init_logging,
    network,
    storage::config::{config_file_path, load_config_from, save_config_to, AppConfig},
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Relays raw HID reports between a USB device and a TCP peer.
///
/// Settings come from the config file; any flag given here overrides the
/// file's value for this run.
///
/// Opening a real device requires a build with `--features hidapi`; without
/// it every device open fails as unsupported.
#[derive(Debug, Parser)]
#[command(name = "hidrelay", version)]
struct Cli {
    /// Config file to read instead of the platform default.
    #[arg(long, env = "HIDRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// IP address of the peer.
    #[arg(long, env = "HIDRELAY_PEER_HOST")]
    peer_host: Option<String>,

    /// TCP port of the peer.
    #[arg(long, env = "HIDRELAY_PEER_PORT")]
    peer_port: Option<u16>,

    /// Keepalive PING interval in milliseconds.
    #[arg(long, env = "HIDRELAY_KEEPALIVE_MS")]
    keepalive_ms: Option<u64>,

    /// Read attempts allowed for a CONFIRM and for a response.
    #[arg(long, env = "HIDRELAY_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Log level (error, warn, info, debug, trace).  `RUST_LOG` takes precedence.
    #[arg(long, env = "HIDRELAY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Append logs to this file instead of stderr.
    #[arg(long, env = "HIDRELAY_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Write the effective configuration to the config file and exit.
    #[arg(long)]
    write_config: bool,
}

impl Cli {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("no --config given"),
        }
    }

    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(host) = &self.peer_host {
            config.peer.host = host.clone();
        }
        if let Some(port) = self.peer_port {
            config.peer.port = port;
        }
        if let Some(ms) = self.keepalive_ms {
            config.device.keepalive_ms = ms;
        }
        if let Some(retries) = self.max_retries {
            config.relay.max_retries = retries;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(file.clone());
        }
    }

    /// Loads the config file and applies the CLI overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    fn into_app_config(self) -> anyhow::Result<(AppConfig, PathBuf)> {
        let path = self.config_path()?;
        let mut config = load_config_from(&path)
            .with_context(|| format!("loading config from {}", path.display()))?;
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok((config, path))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let write_config = cli.write_config;
    let (config, config_path) = cli.into_app_config()?;

    init_logging(&config.logging)?;

    if write_config {
        save_config_to(&config_path, &config)?;
        info!("configuration written to {}", config_path.display());
        return Ok(());
    }

    let selector = config.device_selector();
    let peer_addr = config.peer_addr()?;
    info!("HID relay starting: device {selector}, peer {peer_addr}");

    // ── Resources ─────────────────────────────────────────────────────────────
    let device = open_device(&selector).with_context(|| format!("opening device {selector}"))?;
    let peer = network::connect(peer_addr).await?;
    let mailbox = Arc::new(Mailbox::new());

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    // ── Tasks ─────────────────────────────────────────────────────────────────
    let link = DeviceLink::new(device, Arc::clone(&mailbox), config.device_link_config());
    let link_running = Arc::clone(&running);
    let mut link_task = tokio::task::spawn_blocking(move || link.run(&link_running));

    let relay = NetworkRelay::new(peer, Arc::clone(&mailbox), config.relay_config());
    let mut relay_task = tokio::spawn(relay.run(Arc::clone(&running)));

    let (link_result, relay_result) = tokio::select! {
        result = &mut link_task => {
            running.store(false, Ordering::Relaxed);
            (result, relay_task.await)
        }
        result = &mut relay_task => {
            running.store(false, Ordering::Relaxed);
            (link_task.await, result)
        }
    };

    let link_outcome = task_outcome("device link", link_result);
    let relay_outcome = task_outcome("network relay", relay_result);
    info!("HID relay stopped");

    link_outcome?;
    relay_outcome?;
    Ok(())
}

/// Flattens a joined task's result and logs how it ended.
fn task_outcome<T, E>(name: &str, joined: Result<Result<T, E>, JoinError>) -> anyhow::Result<T>
where
    T: std::fmt::Debug,
    E: std::error::Error + Send + Sync + 'static,
{
    match joined {
        Ok(Ok(stats)) => {
            info!("{name} finished: {stats:?}");
            Ok(stats)
        }
        Ok(Err(e)) => {
            error!("{name} failed: {e}");
            Err(anyhow::Error::new(e).context(format!("{name} failed")))
        }
        Err(e) => {
            error!("{name} panicked or was cancelled: {e}");
            Err(anyhow::Error::new(e).context(format!("{name} did not finish")))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
