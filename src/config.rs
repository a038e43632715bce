//! Settings for the relay and the consumers.
//!
//! Both configs load from TOML and can then be overridden from `GYRO_*`
//! environment variables. Validation only checks for non-empty
//! strings and non-negative finite numbers.

use crate::error::GyroError;
use crate::filter::DEFAULT_SMOOTHING_RATE;
use crate::poll::{DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT};
use crate::scrape::DEFAULT_MARKER;
use crate::supervisor::{SupervisorOptions, DEFAULT_RECEIVE_TIMEOUT, DEFAULT_RETRY_DELAY};
use crate::types::PartialParse;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_WS_PATH: &str = "/ws";

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_ws_path() -> String {
    DEFAULT_WS_PATH.to_owned()
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_owned()
}

fn default_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_millis() as u64
}

/// Relay server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind: String,
    pub port: u16,
    /// Path that accepts WebSocket upgrades.
    pub ws_path: String,
    /// Directory served over plain HTTP (the phone controller page).
    pub static_dir: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_owned(),
            port: DEFAULT_PORT,
            ws_path: default_ws_path(),
            static_dir: None,
        }
    }
}

impl RelayConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `GYRO_RELAY_BIND`, `GYRO_RELAY_PORT`, `GYRO_RELAY_WS_PATH` and
    /// `GYRO_RELAY_STATIC_DIR` on top of the current values.
    pub fn apply_env(&mut self) {
        self.bind = read_env_string("GYRO_RELAY_BIND", &self.bind);
        self.port = read_env_parse("GYRO_RELAY_PORT", self.port);
        self.ws_path = read_env_string("GYRO_RELAY_WS_PATH", &self.ws_path);
        if let Some(dir) = read_env_opt("GYRO_RELAY_STATIC_DIR") {
            self.static_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("bind", &self.bind)?;
        require_path("ws_path", &self.ws_path)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Where the consumer gets its samples from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    WebSocket {
        host: String,
        #[serde(default = "default_port")]
        port: u16,
        #[serde(default = "default_ws_path")]
        path: String,
    },
    HttpPoll {
        url: String,
        #[serde(default = "default_marker")]
        marker: String,
        #[serde(default = "default_interval_ms")]
        interval_ms: u64,
        #[serde(default = "default_request_timeout_ms")]
        request_timeout_ms: u64,
        #[serde(default)]
        partial_parse: PartialParse,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::WebSocket {
            host: "127.0.0.1".to_owned(),
            port: DEFAULT_PORT,
            path: default_ws_path(),
        }
    }
}

impl TransportConfig {
    pub fn http_poll(url: impl Into<String>) -> Self {
        TransportConfig::HttpPoll {
            url: url.into(),
            marker: default_marker(),
            interval_ms: default_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            partial_parse: PartialParse::default(),
        }
    }

    pub fn websocket(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        TransportConfig::WebSocket {
            host: host.into(),
            port,
            path: path.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            TransportConfig::WebSocket { host, port, path } => {
                require_non_empty("host", host)?;
                if *port == 0 {
                    return Err(GyroError::Config("port must be non-zero".into()));
                }
                require_path("path", path)
            }
            TransportConfig::HttpPoll { url, marker, .. } => {
                require_non_empty("url", url)?;
                require_non_empty("marker", marker)
            }
        }
    }
}

/// Consumer settings: transport plus smoothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub transport: TransportConfig,
    /// Exponential smoothing rate `k` in 1/s.
    pub smoothing_rate: f32,
    /// Offset applied on the left of every sample, degrees `[x, y, z]`.
    pub euler_offset_deg: [f32; 3],
    /// Fixed wait before reconnecting after a failure.
    pub retry_delay_ms: u64,
    pub verbose: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            smoothing_rate: DEFAULT_SMOOTHING_RATE,
            euler_offset_deg: [0.0; 3],
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            verbose: false,
        }
    }
}

impl ConsumerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `GYRO_SMOOTHING_RATE`, `GYRO_RETRY_DELAY_MS` and `GYRO_VERBOSE`.
    pub fn apply_env(&mut self) {
        self.smoothing_rate = read_env_parse("GYRO_SMOOTHING_RATE", self.smoothing_rate);
        self.retry_delay_ms = read_env_parse("GYRO_RETRY_DELAY_MS", self.retry_delay_ms);
        self.verbose = read_env_bool("GYRO_VERBOSE", self.verbose);
    }

    pub fn validate(&self) -> Result<()> {
        self.transport.validate()?;
        require_non_negative("smoothing_rate", self.smoothing_rate)?;
        for (axis, value) in ["x", "y", "z"].iter().zip(self.euler_offset_deg) {
            if !value.is_finite() {
                return Err(GyroError::Config(format!(
                    "euler_offset_deg.{} must be finite",
                    axis
                )));
            }
        }
        Ok(())
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
        }
    }
}

fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)?;
    let config = toml::from_str(&contents)?;
    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

fn require_non_empty(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(GyroError::Config(format!("{} must not be empty", name)));
    }
    Ok(())
}

fn require_path(name: &str, value: &str) -> Result<()> {
    require_non_empty(name, value)?;
    if !value.starts_with('/') {
        return Err(GyroError::Config(format!("{} must start with '/'", name)));
    }
    Ok(())
}

fn require_non_negative(name: &str, value: f32) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(GyroError::Config(format!(
            "{} must be a non-negative number, got {}",
            name, value
        )));
    }
    Ok(())
}

fn read_env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_env_string(name: &str, default: &str) -> String {
    read_env_opt(name).unwrap_or_else(|| default.to_string())
}

fn read_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match read_env_opt(name) {
        Some(v) => v.parse::<T>().unwrap_or_else(|_| {
            log::warn!("Ignoring unparsable {}={:?}", name, v);
            default
        }),
        None => default,
    }
}

fn read_env_bool(name: &str, default: bool) -> bool {
    read_env_opt(name)
        .and_then(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}
