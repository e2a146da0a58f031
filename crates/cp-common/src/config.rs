use std::time::Duration;

use serde::Deserialize;

/// Top-level application configuration.
/// Loaded from an optional TOML file and environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Realtime client settings
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Development broker settings
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Log level (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// How the client reaches the broker endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Plain WebSocket at the endpoint URL.
    #[default]
    Websocket,
    /// SockJS websocket transport below the endpoint URL.
    Sockjs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Broker endpoint (default: ws://localhost:8080/ws)
    #[serde(default = "default_realtime_url")]
    pub url: String,
    #[serde(default)]
    pub transport: TransportMode,
    /// First reconnect delay in ms (default: 2000)
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    /// Growth factor applied after each attempt (default: 1.5)
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: f64,
    /// Reconnect delay ceiling in ms (default: 10000)
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    /// Heart-beats we offer to send, ms; 0 disables (default: 10000)
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_outgoing_ms: u64,
    /// Heart-beats we want to receive, ms; 0 disables (default: 10000)
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_incoming_ms: u64,
    /// Handshake deadline in ms (default: 10000)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl RealtimeConfig {
    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: default_realtime_url(),
            transport: TransportMode::default(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_multiplier: default_reconnect_multiplier(),
            reconnect_max_ms: default_reconnect_max_ms(),
            heartbeat_outgoing_ms: default_heartbeat_ms(),
            heartbeat_incoming_ms: default_heartbeat_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Host to bind to (default: 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: String,
    /// HTTP / WebSocket port (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Heart-beats the broker offers in both directions, ms; 0 disables (default: 10000)
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            heartbeat_ms: default_heartbeat_ms(),
        }
    }
}

impl AppConfig {
    /// Load config from the file named by `CP_CONFIG` (if any) and from
    /// `CP__*` environment variables, e.g. `CP__REALTIME__URL`.
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var("CP_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path).required(false));
        }

        let cfg = builder
            .add_source(
                config::Environment::default()
                    .prefix("CP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }

    /// Parse a TOML document, ignoring the environment.
    pub fn from_toml(text: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_realtime_url() -> String {
    "ws://localhost:8080/ws".to_string()
}
fn default_reconnect_initial_ms() -> u64 {
    2000
}
fn default_reconnect_multiplier() -> f64 {
    1.5
}
fn default_reconnect_max_ms() -> u64 {
    10_000
}
fn default_heartbeat_ms() -> u64 {
    10_000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
