//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::defaults::*;
use super::listen::{ListenConfig, PresenceConfig, TlsConfig};
use super::validation::{ValidationError, validate};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {}", join(.0))]
    Invalid(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Replication server configuration.
///
/// Read once when the server is built; immutable for the server's lifetime.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server identity.
    #[serde(default)]
    pub server: ServerConfig,
    /// Replication listener.
    #[serde(default)]
    pub listen: ListenConfig,
    /// Optional TLS wrapping of accepted channels.
    pub tls: Option<TlsConfig>,
    /// Commit-event bridge tuning.
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// Connection and request limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Shutdown behaviour.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    /// Record emitter lanes.
    #[serde(default)]
    pub log: LogConfig,
    /// Optional presence responder.
    pub presence: Option<PresenceConfig>,
    /// Optional token authorization. Absent means every peer is authorized.
    pub auth: Option<AuthConfig>,
    /// Writers the daemon registers at startup.
    #[serde(default)]
    pub writers: Vec<String>,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        validate(&config).map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance number, used in log lines and cluster votes.
    #[serde(default)]
    pub instance: u32,
    /// Human-readable server name.
    #[serde(default = "default_server_name")]
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            instance: 0,
            name: default_server_name(),
        }
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: std::net::SocketAddr::from(([127, 0, 0, 1], 7075)),
        }
    }
}

/// Commit-event bridge configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Ring capacity in events (power of two).
    #[serde(default = "default_bridge_capacity")]
    pub capacity: usize,
    /// Idle interval after which a waiting subscriber gets a heartbeat.
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    /// How long a publisher waits on a full ring before evicting the
    /// slowest subscribers.
    #[serde(default = "default_lag_timeout_ms")]
    pub lag_timeout_ms: u64,
}

impl BridgeConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn lag_timeout(&self) -> Duration {
        Duration::from_millis(self.lag_timeout_ms)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            capacity: default_bridge_capacity(),
            heartbeat_ms: default_heartbeat_ms(),
            lag_timeout_ms: default_lag_timeout_ms(),
        }
    }
}

/// Connection limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrently served connections. Further connections are
    /// rejected at submission.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Maximum size of one request line.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// Grace period `halt()` gives in-flight connections.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

impl ShutdownConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_secs: default_grace_secs(),
        }
    }
}

/// Record emitter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Slots per severity lane (power of two).
    #[serde(default = "default_lane_capacity")]
    pub lane_capacity: usize,
    /// How often the drain task empties the lanes.
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
}

impl LogConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            lane_capacity: default_lane_capacity(),
            drain_interval_ms: default_drain_interval_ms(),
        }
    }
}

/// Token authorization configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Accepted tokens.
    #[serde(default)]
    pub tokens: Vec<String>,
}
