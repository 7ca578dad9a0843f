use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 4040;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256; // events queued per browser before drops
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10; // a stalled socket write kills the stream
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30; // tick event cadence

/// Top-level config (burrow.toml + BURROW_* env overrides, e.g.
/// `BURROW_DASHBOARD__PORT=4041`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BurrowConfig {
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

/// Where the dashboard listens and how it treats streaming connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Upper bound on a single WebSocket write before the stream is dropped.
    /// Values below 1 are treated as 1.
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

impl DashboardConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs.max(1))
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Capacity of each subscriber's private queue. Events published while
    /// the queue is full are dropped for that subscriber only.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Seconds between `tick` events. 0 disables the heartbeat.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Version reported by the tunnel server, if known before the first handshake.
    pub server_version: Option<String>,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            server_version: None,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_subscriber_buffer() -> usize {
    DEFAULT_SUBSCRIBER_BUFFER
}
fn default_write_timeout_secs() -> u64 {
    DEFAULT_WRITE_TIMEOUT_SECS
}
fn default_heartbeat_secs() -> u64 {
    DEFAULT_HEARTBEAT_SECS
}

impl BurrowConfig {
    /// Load config from a TOML file with BURROW_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.burrow/burrow.toml
    ///
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: BurrowConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("BURROW_").split("__"))
            .extract()
            .map_err(|e| crate::error::BurrowError::Config(e.to_string()))?;

        Ok(config)
    }

    /// `bind:port` string suitable for `SocketAddr` parsing.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.dashboard.bind, self.dashboard.port)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.burrow/burrow.toml", home)
}
