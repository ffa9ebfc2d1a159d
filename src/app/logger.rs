use crate::{Error, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const ENV_LOG_LEVEL: &str = "TFTBRIDGE_LOG_LEVEL";
const ENV_LOG_PATH: &str = "TFTBRIDGE_LOG_PATH";

/// Log verbosity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    #[default]
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Our crate at the chosen level, dependencies (reqwest, hyper) at warn.
    fn filter_directive(&self) -> String {
        format!("warn,tftbridge={}", self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(()),
        }
    }
}

/// Effective logging settings after environment overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logger {
    level: LogLevel,
    file: Option<PathBuf>,
}

impl Logger {
    /// Resolve settings and install the global `tracing` subscriber.
    ///
    /// A subscriber that is already installed (tests, embedding) is left alone.
    pub fn new(level: LogLevel, file_path: Option<String>) -> Result<Self> {
        let logger = Self::resolve(level, file_path);

        let file_layer = match &logger.file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| {
                        Error::InvalidArgs(format!("cannot open log file {}: {e}", path.display()))
                    })?;
                Some(
                    fmt::layer()
                        .with_ansi(false)
                        .with_target(false)
                        .with_writer(Mutex::new(file)),
                )
            }
            None => None,
        };

        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new(logger.level.filter_directive()))
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .with(file_layer)
            .try_init();

        Ok(logger)
    }

    /// Apply `TFTBRIDGE_LOG_LEVEL` / `TFTBRIDGE_LOG_PATH` over the given values.
    pub fn resolve(level: LogLevel, file_path: Option<String>) -> Self {
        let env_level = std::env::var(ENV_LOG_LEVEL)
            .ok()
            .and_then(|s| LogLevel::from_str(&s).ok());
        let env_file = std::env::var(ENV_LOG_PATH).ok().filter(|p| !p.is_empty());
        Self {
            level: env_level.unwrap_or(level),
            file: file_path.or(env_file).map(PathBuf::from),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn file(&self) -> Option<&PathBuf> {
        self.file.as_ref()
    }
}
