//! TOML-based configuration for the relay.
//!
//! Reads `AppConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\HidRelay\config.toml`
//! - Linux:    `~/.config/hidrelay/config.toml`
//! - macOS:    `~/Library/Application Support/HidRelay/config.toml`
//!
//! Every field has a serde default, so an absent file, an empty file, or a
//! file with only some sections all produce a usable configuration:
//!
//! ```toml
//! [device]
//! vendor_id = 0x4444
//! product_id = 0x1111
//!
//! [peer]
//! host = "192.168.1.20"
//! port = 4000
//!
//! [relay]
//! max_retries = 10
//! ```
//!
//! Configuration is read once at startup and never changes while the relay
//! runs.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::device_link::DeviceLinkConfig;
use crate::application::network_relay::NetworkRelayConfig;
use crate::infrastructure::device::DeviceSelector;

/// Error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub peer: PeerSection,
    #[serde(default)]
    pub relay: RelaySection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Which HID interface to open, and how to poll it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,
    #[serde(default = "default_product_id")]
    pub product_id: u16,
    /// Vendor-defined usage page of the raw interface.
    #[serde(default = "default_usage_page")]
    pub usage_page: u16,
    #[serde(default = "default_usage")]
    pub usage: u16,
    /// Upper bound on one device read, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Time between keepalive PINGs, in milliseconds.
    #[serde(default = "default_keepalive_ms")]
    pub keepalive_ms: u64,
    /// Consecutive read or write failures tolerated before giving up.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
}

/// Where the peer listens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerSection {
    /// IP address of the peer.  Host names are not resolved.
    #[serde(default = "default_peer_host")]
    pub host: String,
    #[serde(default = "default_peer_port")]
    pub port: u16,
    /// Upper bound on one read from the peer, in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// Exchange behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelaySection {
    /// Read attempts allowed for the CONFIRM and for the response.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// How often an idle relay re-checks for shutdown, in milliseconds.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

/// Diagnostics output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// `tracing` level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file to append to.  Logs go to stderr when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_vendor_id() -> u16 {
    0x4444
}
fn default_product_id() -> u16 {
    0x1111
}
fn default_usage_page() -> u16 {
    0xFACC
}
fn default_usage() -> u16 {
    0x41
}
fn default_poll_interval_ms() -> u64 {
    10
}
fn default_keepalive_ms() -> u64 {
    5_000
}
fn default_max_consecutive_errors() -> u32 {
    5
}
fn default_peer_host() -> String {
    "127.0.0.1".to_string()
}
fn default_peer_port() -> u16 {
    4000
}
fn default_read_timeout_ms() -> u64 {
    1_000
}
fn default_max_retries() -> u32 {
    10
}
fn default_idle_poll_ms() -> u64 {
    200
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
            usage_page: default_usage_page(),
            usage: default_usage(),
            poll_interval_ms: default_poll_interval_ms(),
            keepalive_ms: default_keepalive_ms(),
            max_consecutive_errors: default_max_consecutive_errors(),
        }
    }
}

impl Default for PeerSection {
    fn default() -> Self {
        Self {
            host: default_peer_host(),
            port: default_peer_port(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

// ── Derived runtime settings ──────────────────────────────────────────────────

impl AppConfig {
    /// Rejects values the tasks cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.device.poll_interval_ms == 0, "device.poll_interval_ms must be > 0"),
            (self.device.keepalive_ms == 0, "device.keepalive_ms must be > 0"),
            (
                self.device.max_consecutive_errors == 0,
                "device.max_consecutive_errors must be > 0",
            ),
            (self.peer.port == 0, "peer.port must be > 0"),
            (self.peer.read_timeout_ms == 0, "peer.read_timeout_ms must be > 0"),
            (self.relay.max_retries == 0, "relay.max_retries must be > 0"),
            (self.relay.idle_poll_ms == 0, "relay.idle_poll_ms must be > 0"),
        ];
        if let Some((_, msg)) = checks.iter().find(|(bad, _)| *bad) {
            return Err(ConfigError::Invalid((*msg).to_string()));
        }
        self.peer_addr().map(|_| ())
    }

    pub fn device_selector(&self) -> DeviceSelector {
        DeviceSelector {
            vendor_id: self.device.vendor_id,
            product_id: self.device.product_id,
            usage_page: self.device.usage_page,
            usage: self.device.usage,
        }
    }

    pub fn device_link_config(&self) -> DeviceLinkConfig {
        DeviceLinkConfig {
            poll_interval: Duration::from_millis(self.device.poll_interval_ms),
            keepalive_interval: Duration::from_millis(self.device.keepalive_ms),
            max_consecutive_errors: self.device.max_consecutive_errors,
        }
    }

    pub fn relay_config(&self) -> NetworkRelayConfig {
        NetworkRelayConfig {
            read_timeout: Duration::from_millis(self.peer.read_timeout_ms),
            max_retries: self.relay.max_retries,
            idle_poll: Duration::from_millis(self.relay.idle_poll_ms),
        }
    }

    /// The peer socket address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `peer.host` is not an IP address.
    pub fn peer_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.peer.host.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "peer.host {:?} is not an IP address",
                self.peer.host
            ))
        })?;
        Ok(SocketAddr::new(ip, self.peer.port))
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the `HidRelay` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("HidRelay"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("hidrelay"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("HidRelay")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
