use crate::{
    cli::RunOptions,
    config::Config,
    protocol::{Dialect, DialectSetting},
    serial::{DtrBehavior, FlowControlMode, ParityMode, SerialOptions, StopBitsMode},
    session::{Session, SessionOptions},
    telemetry::MoonrakerClient,
    Error, Result,
};
use crossbeam::channel;
use std::{str::FromStr, time::Duration};
use tracing::info;

mod bridge_loop;
mod connection;
mod control;
mod lifecycle;
mod logger;
mod polling;

use bridge_loop::run_bridge_loop;
use connection::open_serial;
pub use control::spawn_control_worker;
pub use logger::{LogLevel, Logger};
pub use polling::{start_polling, PollEvent, PollingHandle};

/// Effective settings for the daemon after merging file and CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub device: String,
    pub baud: u32,
    pub flow_control: FlowControlMode,
    pub parity: ParityMode,
    pub stop_bits: StopBitsMode,
    pub dtr_on_open: DtrBehavior,
    pub serial_timeout_ms: u64,
    pub moonraker_host: String,
    pub moonraker_port: u16,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub dialect: DialectSetting,
    pub fallback_dialect: Dialect,
    pub detect_timeout: Duration,
    pub summary_line: bool,
    pub log_level: LogLevel,
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_sources(Config::default(), RunOptions::default())
    }
}

impl AppConfig {
    /// CLI values win over the file; the file wins over built-in defaults.
    pub fn from_sources(config: Config, opts: RunOptions) -> Self {
        Self {
            device: opts.device.unwrap_or(config.device),
            baud: opts.baud.unwrap_or(config.baud),
            flow_control: config.flow_control,
            parity: config.parity,
            stop_bits: config.stop_bits,
            dtr_on_open: config.dtr_on_open,
            serial_timeout_ms: config.serial_timeout_ms,
            moonraker_host: opts.moonraker_host.unwrap_or(config.moonraker_host),
            moonraker_port: opts.moonraker_port.unwrap_or(config.moonraker_port),
            poll_interval: opts
                .poll_interval
                .unwrap_or(Duration::from_millis(config.poll_interval_ms)),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            dialect: opts.dialect.unwrap_or(config.dialect),
            fallback_dialect: config.fallback_dialect,
            detect_timeout: opts
                .detect_timeout
                .unwrap_or(Duration::from_millis(config.detect_timeout_ms)),
            summary_line: config.summary_line,
            log_level: opts
                .log_level
                .as_deref()
                .and_then(|s| LogLevel::from_str(s).ok())
                .unwrap_or_default(),
            log_file: opts.log_file,
        }
    }

    pub fn serial_options(&self) -> SerialOptions {
        SerialOptions {
            baud: self.baud,
            timeout_ms: self.serial_timeout_ms,
            flow_control: self.flow_control,
            parity: self.parity,
            stop_bits: self.stop_bits,
            dtr: self.dtr_on_open,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            dialect: self.dialect,
            fallback: self.fallback_dialect,
            detect_window: self.detect_timeout,
            summary_line: self.summary_line,
        }
    }

    /// Reject merged values that only the CLI could have introduced.
    fn validate(&self) -> Result<()> {
        let merged = Config {
            device: self.device.clone(),
            baud: self.baud,
            moonraker_host: self.moonraker_host.clone(),
            moonraker_port: self.moonraker_port,
            poll_interval_ms: self.poll_interval.as_millis() as u64,
            detect_timeout_ms: self.detect_timeout.as_millis() as u64,
            ..Config::default()
        };
        crate::config::validate(&merged).map_err(|err| match err {
            Error::Config(msg) => Error::InvalidArgs(msg),
            other => other,
        })
    }
}

pub struct App {
    config: AppConfig,
    logger: Logger,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let logger = Logger::new(config.log_level, config.log_file.clone())?;
        Ok(Self { config, logger })
    }

    pub fn from_options(opts: RunOptions) -> Result<Self> {
        let cfg_file = match &opts.config {
            Some(path) => Config::load_from_path(path)?,
            None => Config::load_or_default()?,
        };
        let merged = AppConfig::from_sources(cfg_file, opts);
        Self::new(merged)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Level after `TFTBRIDGE_LOG_LEVEL` has been applied.
    pub fn log_level(&self) -> LogLevel {
        self.logger.level()
    }

    /// Open the panel, start the worker threads, and bridge until shutdown.
    pub fn run(&self) -> Result<()> {
        let config = &self.config;
        let client = MoonrakerClient::new(
            &config.moonraker_host,
            config.moonraker_port,
            config.request_timeout,
        )?;
        info!(
            device = %config.device,
            baud = config.baud,
            moonraker = client.base_url(),
            dialect = %config.dialect,
            log_level = self.logger.level().as_str(),
            log_file = ?self.logger.file(),
            "tftbridge starting"
        );

        let running = lifecycle::create_shutdown_flag()?;
        let port = open_serial(&config.device, config.serial_options())?;

        let (control_tx, control_rx) = channel::unbounded();
        let control_worker = spawn_control_worker(client.clone(), control_rx)?;
        let poller = start_polling(client, config.poll_interval, running.clone())?;

        let mut session = Session::new(port, config.session_options(), control_tx);
        let outcome = run_bridge_loop(&mut session, poller.receiver(), &running);

        // Dropping the session releases the control sender so the worker drains and exits.
        drop(session);
        drop(poller);
        let _ = control_worker.join();
        info!("tftbridge stopped");
        outcome
    }
}
