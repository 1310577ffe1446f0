//! Configuration for the spalink daemon.
//!
//! TOML file + `SPALINK_`-prefixed environment overrides, credential
//! resolution, and translation to the runtime types the other crates
//! consume (`spalink_core::BridgeConfig`, `spalink_api::Credentials`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use spalink_core::BridgeConfig;
use spalink_core::sweep::SweepSettings;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no cloud credentials configured (set cloud.email and cloud.password)")]
    NoCredentials,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub cloud: CloudSection,

    #[serde(default)]
    pub mqtt: MqttSection,

    #[serde(default)]
    pub bridge: BridgeSection,

    #[serde(default)]
    pub sweep: SweepSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// Vendor cloud account and endpoint.
#[derive(Debug, Deserialize, Serialize)]
pub struct CloudSection {
    /// Cloud API base URL.
    #[serde(default = "default_cloud_url")]
    pub base_url: String,

    /// Account email. Required.
    pub email: Option<String>,

    /// Account password (plaintext -- prefer the env override
    /// `SPALINK_CLOUD__PASSWORD`).
    pub password: Option<String>,

    /// Per-request hard timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for CloudSection {
    fn default() -> Self {
        Self {
            base_url: default_cloud_url(),
            email: None,
            password: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_cloud_url() -> String {
    "https://api.smartspa.io/".into()
}
fn default_timeout() -> u64 {
    30
}

/// Local broker connection and topic root.
#[derive(Debug, Deserialize, Serialize)]
pub struct MqttSection {
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Root of every topic this bridge touches.
    #[serde(default = "default_base_topic")]
    pub base_topic: String,

    #[serde(default = "default_client_id")]
    pub client_id: String,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            base_topic: default_base_topic(),
            client_id: default_client_id(),
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".into()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_base_topic() -> String {
    "spalink".into()
}
fn default_client_id() -> String {
    "spalink-bridge".into()
}

/// Polling and command verification tuning.
#[derive(Debug, Deserialize, Serialize)]
pub struct BridgeSection {
    /// Full state poll cadence, seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Delay before the expedited post-command poll, milliseconds.
    #[serde(default = "default_propagation_delay")]
    pub propagation_delay_ms: u64,

    /// Consecutive poll failures before reconnect handling kicks in.
    #[serde(default = "default_reconnect_threshold")]
    pub reconnect_failure_threshold: u32,

    /// Base throttle backoff window, seconds.
    #[serde(default = "default_throttle_base")]
    pub throttle_base_secs: u64,

    /// Throttle backoff ceiling, seconds.
    #[serde(default = "default_throttle_cap")]
    pub throttle_cap_secs: u64,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            propagation_delay_ms: default_propagation_delay(),
            reconnect_failure_threshold: default_reconnect_threshold(),
            throttle_base_secs: default_throttle_base(),
            throttle_cap_secs: default_throttle_cap(),
        }
    }
}

fn default_poll_interval() -> u64 {
    60
}
fn default_propagation_delay() -> u64 {
    2500
}
fn default_reconnect_threshold() -> u32 {
    3
}
fn default_throttle_base() -> u64 {
    5
}
fn default_throttle_cap() -> u64 {
    300
}

/// Capability sweep pacing.
#[derive(Debug, Deserialize, Serialize)]
pub struct SweepSection {
    /// Pause between units, seconds. The gateway drops commands issued
    /// faster than this.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    /// Pause after forcing zones to neutral, seconds.
    #[serde(default = "default_reset_pause")]
    pub zone_reset_pause_secs: u64,

    /// Force a neutral reset after this many units within a zone.
    #[serde(default = "default_reset_every")]
    pub reset_every_units: u32,

    /// Throttle-triggered retries per unit before skipping it.
    #[serde(default = "default_throttle_retries")]
    pub max_throttle_retries: u32,

    /// Intensity levels to exercise per mode.
    #[serde(default = "default_levels")]
    pub levels: Vec<u8>,

    /// Where sweep results are persisted.
    pub results_path: Option<PathBuf>,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            settle_delay_secs: default_settle_delay(),
            zone_reset_pause_secs: default_reset_pause(),
            reset_every_units: default_reset_every(),
            max_throttle_retries: default_throttle_retries(),
            levels: default_levels(),
            results_path: None,
        }
    }
}

fn default_settle_delay() -> u64 {
    20
}
fn default_reset_pause() -> u64 {
    3
}
fn default_reset_every() -> u32 {
    25
}
fn default_throttle_retries() -> u32 {
    3
}
fn default_levels() -> Vec<u8> {
    vec![100, 25, 50, 75]
}

/// Logging output.
#[derive(Debug, Deserialize, Serialize)]
pub struct LoggingSection {
    /// Filter directive, e.g. "info" or "spalink_core=debug,info".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,

    /// Also write daily-rotated log files into this directory.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: None,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "spalink", "spalink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("spalink");
    p
}

/// Default location of the persisted capability map, next to the
/// config file.
pub fn default_results_path() -> PathBuf {
    config_path()
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
        .join("capabilities.yaml")
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment.
///
/// Environment overrides use double underscores between section and
/// key: `SPALINK_CLOUD__PASSWORD`, `SPALINK_MQTT__HOST`.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("SPALINK_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(())
}

// ── Validation & translation ────────────────────────────────────────

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.base_topic.is_empty() {
            return Err(invalid("mqtt.base_topic", "must not be empty"));
        }
        if self.mqtt.base_topic.contains(['+', '#']) {
            return Err(invalid("mqtt.base_topic", "must not contain wildcards"));
        }
        if self.bridge.poll_interval_secs == 0 {
            return Err(invalid("bridge.poll_interval_secs", "must be positive"));
        }
        if self.bridge.throttle_base_secs == 0 {
            return Err(invalid("bridge.throttle_base_secs", "must be positive"));
        }
        if self.bridge.throttle_cap_secs < self.bridge.throttle_base_secs {
            return Err(invalid(
                "bridge.throttle_cap_secs",
                "must be >= throttle_base_secs",
            ));
        }
        if self.sweep.levels.is_empty() {
            return Err(invalid("sweep.levels", "must list at least one level"));
        }
        if let Some(level) = self.sweep.levels.iter().find(|&&l| l > 100) {
            return Err(invalid(
                "sweep.levels",
                format!("level {level} exceeds 100"),
            ));
        }
        url::Url::parse(&self.cloud.base_url)
            .map_err(|e| invalid("cloud.base_url", format!("not a URL: {e}")))?;
        Ok(())
    }

    /// Cloud credentials, required for any connected operation.
    pub fn credentials(&self) -> Result<spalink_api::Credentials, ConfigError> {
        let email = self.cloud.email.clone().ok_or(ConfigError::NoCredentials)?;
        let password = self
            .cloud
            .password
            .clone()
            .ok_or(ConfigError::NoCredentials)?;
        Ok(spalink_api::Credentials {
            email,
            password: SecretString::from(password),
        })
    }

    /// Cloud base URL, parsed.
    pub fn cloud_url(&self) -> Result<url::Url, ConfigError> {
        url::Url::parse(&self.cloud.base_url)
            .map_err(|e| invalid("cloud.base_url", format!("not a URL: {e}")))
    }

    /// Transport settings for the API client.
    pub fn transport(&self) -> spalink_api::TransportConfig {
        spalink_api::TransportConfig {
            timeout: Duration::from_secs(self.cloud.timeout_secs),
        }
    }

    /// Translate the file config into the core's runtime tuning.
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            poll_interval: Duration::from_secs(self.bridge.poll_interval_secs),
            propagation_delay: Duration::from_millis(self.bridge.propagation_delay_ms),
            reconnect_failure_threshold: self.bridge.reconnect_failure_threshold,
            throttle_base: Duration::from_secs(self.bridge.throttle_base_secs),
            throttle_cap: Duration::from_secs(self.bridge.throttle_cap_secs),
            sweep: SweepSettings {
                settle_delay: Duration::from_secs(self.sweep.settle_delay_secs),
                zone_reset_pause: Duration::from_secs(self.sweep.zone_reset_pause_secs),
                reset_every_units: self.sweep.reset_every_units,
                max_throttle_retries: self.sweep.max_throttle_retries,
            },
            sweep_levels: self.sweep.levels.clone(),
        }
    }

    /// Where the capability map lives.
    pub fn results_path(&self) -> PathBuf {
        self.sweep
            .results_path
            .clone()
            .unwrap_or_else(default_results_path)
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}
