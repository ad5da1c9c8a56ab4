use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::connection_manager::BroadcastConfig;

/// Environment variable prefix, e.g. `ROOMCAST_SERVER__PORT=9000`
const ENV_PREFIX: &str = "ROOMCAST";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub broadcast: BroadcastSettings,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub otel: OtelConfig,
    #[serde(default)]
    pub shutdown: ShutdownSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Transport read buffer in bytes
    #[serde(default = "default_buffer_size")]
    pub read_buffer_size: usize,
    /// Transport write buffer in bytes
    #[serde(default = "default_buffer_size")]
    pub write_buffer_size: usize,
    /// Largest inbound message accepted, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Per-connection outbound queue capacity (frames)
    #[serde(default = "default_outbound_queue_size")]
    pub outbound_queue_size: usize,
    /// Disconnect after this many seconds without inbound traffic (0 disables)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Server ping interval in seconds (0 disables)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Whether a sender receives its own broadcasts
    #[serde(default = "default_echo_to_sender")]
    pub echo_to_sender: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastSettings {
    /// Longest a member may block a broadcast before being evicted
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdmissionConfig {
    /// Hosts allowed to connect; empty allows all
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Shared secret; unset or empty disables the check
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownSettings {
    /// Time to wait for sessions to leave their rooms
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_buffer_size() -> usize {
    1024
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_outbound_queue_size() -> usize {
    64
}

fn default_idle_timeout() -> u64 {
    120 // 2 minutes
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_echo_to_sender() -> bool {
    true
}

fn default_send_timeout_ms() -> u64 {
    1000
}

fn default_max_concurrent_sends() -> usize {
    100
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "roomcast".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

fn default_drain_timeout() -> u64 {
    10
}

/// Deployment profile selecting `config/{mode}.*`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Dev,
    Prod,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }

    /// Read `RUN_MODE`, defaulting to dev
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("RUN_MODE") {
            Ok(value) => value.parse(),
            Err(_) => Ok(Self::Dev),
        }
    }
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" | "development" => Ok(Self::Dev),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(ConfigError::Message(format!("{} is not a valid mode", other))),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Written by `init-config` when no config file exists yet
pub const DEFAULT_CONFIG_YAML: &str = r#"# roomcast configuration
server:
  host: "0.0.0.0"
  port: 8080

websocket:
  read_buffer_size: 1024
  write_buffer_size: 1024
  max_message_size: 65536
  outbound_queue_size: 64
  idle_timeout_secs: 120
  heartbeat_interval_secs: 30
  echo_to_sender: true

broadcast:
  send_timeout_ms: 1000
  max_concurrent_sends: 100

admission:
  # Empty list allows every host
  allowed_origins: []
  # Empty token disables the check
  auth_token: ""

otel:
  enabled: false
  endpoint: "http://localhost:4317"
  service_name: "roomcast"
  sampling_ratio: 1.0

shutdown:
  drain_timeout_secs: 10
"#;

impl Settings {
    /// Load settings for the mode named by `RUN_MODE` from `./config`
    pub fn new() -> Result<Self, ConfigError> {
        Self::load("config", RunMode::from_env()?)
    }

    /// Layer defaults, `{dir}/default.*`, `{dir}/{mode}.*` and `ROOMCAST_*` env vars
    pub fn load(config_dir: impl AsRef<Path>, mode: RunMode) -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let dir = config_dir.as_ref();
        let default_file = dir.join("default");
        let mode_file = dir.join(mode.as_str());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .add_source(File::from(default_file).required(false))
            .add_source(File::from(mode_file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("admission.allowed_origins"),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.websocket.outbound_queue_size == 0 {
            return Err(ConfigError::Message(
                "websocket.outbound_queue_size must be greater than zero".to_string(),
            ));
        }
        if self.broadcast.send_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "broadcast.send_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Write the default config file unless one already exists.
    /// Returns whether a file was written.
    pub fn write_default_file(path: impl AsRef<Path>) -> std::io::Result<bool> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, DEFAULT_CONFIG_YAML)?;
        Ok(true)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl WebSocketConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_secs > 0)
            .then(|| Duration::from_secs(self.heartbeat_interval_secs))
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: default_buffer_size(),
            write_buffer_size: default_buffer_size(),
            max_message_size: default_max_message_size(),
            outbound_queue_size: default_outbound_queue_size(),
            idle_timeout_secs: default_idle_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            echo_to_sender: default_echo_to_sender(),
        }
    }
}

impl BroadcastSettings {
    pub fn to_broadcast_config(&self) -> BroadcastConfig {
        BroadcastConfig {
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            max_concurrent_sends: self.max_concurrent_sends.max(1),
        }
    }
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout_ms(),
            max_concurrent_sends: default_max_concurrent_sends(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}
