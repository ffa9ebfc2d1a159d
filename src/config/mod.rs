use crate::protocol::{Dialect, DialectSetting};
use crate::serial::{DtrBehavior, FlowControlMode, ParityMode, StopBitsMode};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod loader;

pub const DEFAULT_DEVICE: &str = "/dev/ttyS0";
pub const DEFAULT_BAUD: u32 = 115_200;
pub const DEFAULT_SERIAL_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_MOONRAKER_HOST: &str = "localhost";
pub const DEFAULT_MOONRAKER_PORT: u16 = 7125;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_DETECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_FALLBACK_DIALECT: Dialect = Dialect::OkPrefixed;
pub const MIN_POLL_INTERVAL_MS: u64 = 250;
const CONFIG_DIR_NAME: &str = ".tftbridge";
const CONFIG_FILE_NAME: &str = "config.toml";

/// User-supplied settings loaded from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub device: String,
    pub baud: u32,
    pub flow_control: FlowControlMode,
    pub parity: ParityMode,
    pub stop_bits: StopBitsMode,
    pub dtr_on_open: DtrBehavior,
    pub serial_timeout_ms: u64,
    pub moonraker_host: String,
    pub moonraker_port: u16,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub dialect: DialectSetting,
    #[serde(with = "dialect_name")]
    pub fallback_dialect: Dialect,
    pub detect_timeout_ms: u64,
    pub summary_line: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            baud: DEFAULT_BAUD,
            flow_control: FlowControlMode::default(),
            parity: ParityMode::default(),
            stop_bits: StopBitsMode::default(),
            dtr_on_open: DtrBehavior::default(),
            serial_timeout_ms: DEFAULT_SERIAL_TIMEOUT_MS,
            moonraker_host: DEFAULT_MOONRAKER_HOST.to_string(),
            moonraker_port: DEFAULT_MOONRAKER_PORT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            dialect: DialectSetting::Auto,
            fallback_dialect: DEFAULT_FALLBACK_DIALECT,
            detect_timeout_ms: DEFAULT_DETECT_TIMEOUT_MS,
            summary_line: false,
        }
    }
}

impl Config {
    pub fn load_or_default() -> Result<Self> {
        loader::load_or_default()
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        loader::load_from_path(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        loader::save_to_path(self, path)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        loader::parse(raw)
    }

    /// `~/.tftbridge/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        loader::config_path()
    }
}

/// Reject values the bridge cannot run with.
pub fn validate(cfg: &Config) -> Result<()> {
    if cfg.device.trim().is_empty() {
        return Err(Error::Config("device cannot be empty".into()));
    }
    if cfg.baud == 0 {
        return Err(Error::Config("baud must be greater than zero".into()));
    }
    if cfg.moonraker_host.trim().is_empty() {
        return Err(Error::Config("moonraker_host cannot be empty".into()));
    }
    if cfg.moonraker_port == 0 {
        return Err(Error::Config("moonraker_port must be greater than zero".into()));
    }
    if !(1..=1_000).contains(&cfg.serial_timeout_ms) {
        return Err(Error::Config(
            "serial_timeout_ms must be between 1 and 1000".into(),
        ));
    }
    if cfg.poll_interval_ms < MIN_POLL_INTERVAL_MS {
        return Err(Error::Config(format!(
            "poll_interval_ms must be at least {MIN_POLL_INTERVAL_MS}"
        )));
    }
    if cfg.request_timeout_ms < 100 {
        return Err(Error::Config(
            "request_timeout_ms must be at least 100".into(),
        ));
    }
    if cfg.detect_timeout_ms < 100 {
        return Err(Error::Config("detect_timeout_ms must be at least 100".into()));
    }
    Ok(())
}

mod dialect_name {
    use crate::protocol::Dialect;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dialect: &Dialect, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(dialect.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Dialect, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
