// src/config.rs

//! Manages proxy configuration: loading, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::time::Duration;
use tracing::warn;

/// The source of a player's groups and of each group's permission list.
///
/// Sessions consult this when they are created and whenever groups are added or removed.
pub trait ConfigurationAdapter: Send + Sync {
    /// The groups a player belongs to when their session starts.
    fn groups_for(&self, player: &str) -> Vec<String>;
    /// The permissions a group grants, in configured order.
    fn permissions_for(&self, group: &str) -> Vec<String>;
}

/// A single backend server entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// `host:port` of the backend.
    pub address: String,
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    8879
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

/// A raw representation of the config file before validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_max_players")]
    max_players: usize,
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    connect_timeout: Duration,
    default_server: Option<String>,
    #[serde(default = "default_command_prefix")]
    command_prefix: String,
    #[serde(default)]
    plugin_channels: Vec<String>,
    #[serde(default)]
    servers: IndexMap<String, ServerConfig>,
    #[serde(default)]
    groups: HashMap<String, Vec<String>>,
    #[serde(default)]
    permissions: HashMap<String, Vec<String>>,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    25577
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_players() -> usize {
    1000
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_command_prefix() -> String {
    "/".to_string()
}

/// The fully resolved and validated proxy configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub max_players: usize,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Where players go when no remembered server applies. Resolved to the first
    /// configured server when the file leaves it out.
    pub default_server: String,
    pub command_prefix: String,
    pub plugin_channels: Vec<String>,
    pub servers: IndexMap<String, ServerConfig>,
    /// Player name -> groups granted on join.
    pub groups: HashMap<String, Vec<String>>,
    /// Group name -> permissions, in the order they are applied.
    pub permissions: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut servers = IndexMap::new();
        servers.insert(
            "lobby".to_string(),
            ServerConfig {
                address: "127.0.0.1:25565".to_string(),
            },
        );
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_players: default_max_players(),
            connect_timeout: default_connect_timeout(),
            default_server: "lobby".to_string(),
            command_prefix: default_command_prefix(),
            plugin_channels: Vec::new(),
            servers,
            groups: HashMap::new(),
            permissions: HashMap::new(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Loads and validates the configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid configuration in '{path}'"))
    }

    /// Parses and validates the configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;

        let default_server = match raw_config.default_server {
            Some(name) => name,
            None => raw_config
                .servers
                .keys()
                .next()
                .cloned()
                .ok_or_else(|| anyhow!("at least one server must be configured"))?,
        };

        let config = Config {
            host: raw_config.host,
            port: raw_config.port,
            log_level: raw_config.log_level,
            max_players: raw_config.max_players,
            connect_timeout: raw_config.connect_timeout,
            default_server,
            command_prefix: raw_config.command_prefix,
            plugin_channels: raw_config.plugin_channels,
            servers: raw_config.servers,
            groups: raw_config.groups,
            permissions: raw_config.permissions,
            metrics: raw_config.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_players == 0 {
            return Err(anyhow!("max_players cannot be 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(anyhow!("connect_timeout cannot be 0"));
        }
        if self.command_prefix.chars().count() != 1 {
            return Err(anyhow!("command_prefix must be a single character"));
        }
        if self.servers.is_empty() {
            return Err(anyhow!("at least one server must be configured"));
        }
        for (name, server) in &self.servers {
            if !is_valid_address(&server.address) {
                return Err(anyhow!(
                    "server '{}' has an invalid address '{}'",
                    name,
                    server.address
                ));
            }
        }
        if !self.servers.contains_key(&self.default_server) {
            return Err(anyhow!(
                "default_server '{}' is not a configured server",
                self.default_server
            ));
        }
        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the proxy port"
                ));
            }
        }
        for group in self.groups.values().flatten() {
            if !self.permissions.contains_key(group) {
                warn!(
                    "group '{}' is assigned to a player but grants no permissions",
                    group
                );
            }
        }
        Ok(())
    }
}

impl ConfigurationAdapter for Config {
    fn groups_for(&self, player: &str) -> Vec<String> {
        self.groups.get(player).cloned().unwrap_or_default()
    }

    fn permissions_for(&self, group: &str) -> Vec<String> {
        self.permissions.get(group).cloned().unwrap_or_default()
    }
}

/// Accepts `host:port` (including bracketed IPv6 hosts) with a non-zero port.
fn is_valid_address(address: &str) -> bool {
    let Some((host, port)) = address.rsplit_once(':') else {
        return false;
    };
    !host.trim().is_empty() && matches!(port.parse::<u16>(), Ok(p) if p != 0)
}
