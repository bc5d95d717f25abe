//! Configuration management for the exporter.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use flatcar_ue_common::LogFormat;

use crate::cli::Args;
use crate::error::ExporterError;

/// Default location of the optional configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/flatcar-ue-exporter/config.yaml";

/// Default metrics listen address (all interfaces).
pub const DEFAULT_LISTEN_ADDRESS: &str = ":26756";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Metrics HTTP server
    pub server: ServerConfig,
    /// Status source and heartbeat
    pub exporter: ExporterConfig,
    /// Log output
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Load a configuration file that may legitimately be absent.
    ///
    /// `Ok(None)` only when nothing exists at `path`; a file that exists but
    /// cannot be read or parsed is an error.
    pub fn load_optional<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)
            .with_context(|| "Failed to parse config file")?;

        Ok(config)
    }

    /// Defaults with CLI overrides applied.
    pub fn default_with_cli(args: &Args) -> Self {
        Self::default().with_cli_overrides(args)
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref listen) = args.listen_address {
            self.server.listen_address = listen.clone();
        }

        if args.pretend {
            self.exporter.pretend = true;
        }

        if let Some(secs) = args.heartbeat_interval_secs {
            self.exporter.heartbeat_interval_secs = secs;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        if args.verbose {
            self.logging.level = "trace".to_string();
        }

        if let Some(format) = args.log_format {
            self.logging.format = format;
        }

        self
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.exporter.heartbeat_interval_secs == 0 {
            anyhow::bail!("exporter.heartbeat_interval_secs must be greater than zero");
        }
        if self.exporter.pretend_interval_secs == 0 {
            anyhow::bail!("exporter.pretend_interval_secs must be greater than zero");
        }
        self.server.socket_addr()?;
        Ok(())
    }
}

/// Metrics server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to serve metrics on
    pub listen_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
        }
    }
}

impl ServerConfig {
    /// Resolve the listen address to a socket address.
    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, ExporterError> {
        resolve_listen_address(&self.listen_address)
    }
}

/// Exporter behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Emit synthetic idle events instead of talking to update_engine
    pub pretend: bool,
    /// Time-in-status refresh interval in seconds
    pub heartbeat_interval_secs: u64,
    /// Synthetic event interval in seconds (pretend mode)
    pub pretend_interval_secs: u64,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            pretend: false,
            heartbeat_interval_secs: 60,
            pretend_interval_secs: 10,
        }
    }
}

impl ExporterConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn pretend_interval(&self) -> Duration {
        Duration::from_secs(self.pretend_interval_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Resolve a listen address. A bare `:port` means all interfaces.
pub fn resolve_listen_address(address: &str) -> std::result::Result<SocketAddr, ExporterError> {
    let address = address.trim();
    let candidate = match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port),
        None => address.to_string(),
    };

    if let Ok(addr) = candidate.parse::<SocketAddr>() {
        return Ok(addr);
    }

    candidate
        .to_socket_addrs()
        .map_err(|e| ExporterError::InvalidListenAddress(format!("{}: {}", address, e)))?
        .next()
        .ok_or_else(|| ExporterError::InvalidListenAddress(format!("{}: no addresses", address)))
}
