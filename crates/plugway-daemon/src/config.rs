//! Configuration loading and validation

use anyhow::{bail, Result};
use plugway_discovery::{FailurePolicy, ReloadPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the HTTP server
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Serve on a unix domain socket instead of TCP
    #[serde(default)]
    pub unix_socket: Option<PathBuf>,
    /// TLS configuration (optional - enables HTTPS when present)
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            unix_socket: None,
            tls: None,
        }
    }
}

/// TLS/HTTPS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM format)
    pub cert: String,
    /// Path to private key file (PEM format)
    pub key: String,
}

fn default_bind() -> String {
    "0.0.0.0:1024".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Path to the device catalog (JSON)
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
    /// When to re-read the catalog file
    #[serde(default)]
    pub reload: ReloadPolicy,
    /// Use `ip` fields from the catalog as initial locations
    #[serde(default = "default_true")]
    pub seed_locations: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            reload: ReloadPolicy::default(),
            seed_locations: true,
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("tuya-devices.json")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Periodic scan interval in seconds
    #[serde(default = "default_scan_interval")]
    pub interval_secs: u64,
    /// How long each scan listens for devices
    #[serde(default = "default_scan_timeout")]
    pub timeout_secs: u64,
    /// What a failed periodic scan does to the daemon
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_scan_interval(),
            timeout_secs: default_scan_timeout(),
            on_failure: FailurePolicy::default(),
        }
    }
}

fn default_scan_interval() -> u64 {
    300 // every 5 minutes
}

fn default_scan_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Helper program speaking the device protocol
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before every bridge subcommand
    #[serde(default)]
    pub args: Vec<String>,
    /// Upper bound for a single status/on/off call
    #[serde(default = "default_client_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            timeout_secs: default_client_timeout(),
        }
    }
}

fn default_program() -> String {
    "tuya-bridge".to_string()
}

fn default_client_timeout() -> u64 {
    5
}

impl Config {
    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.scan.interval_secs == 0 {
            bail!("scan.interval_secs must be greater than zero");
        }
        if self.scan.timeout_secs == 0 {
            bail!("scan.timeout_secs must be greater than zero");
        }
        if self.client.timeout_secs == 0 {
            bail!("client.timeout_secs must be greater than zero");
        }
        if self.daemon.unix_socket.is_some() && self.daemon.tls.is_some() {
            bail!("daemon.tls cannot be combined with daemon.unix_socket");
        }
        Ok(())
    }

    /// Replace the host and/or port part of the bind address
    pub fn override_bind(&mut self, host: Option<&str>, port: Option<u16>) {
        if host.is_none() && port.is_none() {
            return;
        }
        let (current_host, current_port) = match self.daemon.bind.rsplit_once(':') {
            Some((h, p)) => (h.to_string(), p.to_string()),
            None => (self.daemon.bind.clone(), default_bind_port()),
        };
        self.daemon.bind = format!(
            "{}:{}",
            host.map(bracket_ipv6).unwrap_or(current_host),
            port.map(|p| p.to_string()).unwrap_or(current_port)
        );
    }
}

/// IPv6 hosts need brackets in front of a port
fn bracket_ipv6(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

fn default_bind_port() -> String {
    "1024".to_string()
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
