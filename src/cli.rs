use crate::protocol::DialectSetting;
use crate::{Error, Result};
use clap::{error::ErrorKind, Args, CommandFactory, Parser};
use std::path::PathBuf;
use std::time::Duration;

/// Options for the `run` command; values are `None` when not provided on CLI.
#[derive(Debug, Clone, PartialEq, Eq, Default, Args)]
pub struct RunOptions {
    /// Serial device the TFT is wired to (default: /dev/ttyS0)
    #[arg(long, value_name = "PATH")]
    pub device: Option<String>,
    /// Baud rate (default: 115200)
    #[arg(long, value_name = "NUMBER")]
    pub baud: Option<u32>,
    /// Moonraker host name or address (default: localhost)
    #[arg(long, value_name = "HOST")]
    pub moonraker_host: Option<String>,
    /// Moonraker port (default: 7125)
    #[arg(long, value_name = "PORT")]
    pub moonraker_port: Option<u16>,
    /// Telemetry poll interval, e.g. 2s or 1500ms
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub poll_interval: Option<Duration>,
    /// How long to wait for a conclusive frame before assuming a dialect
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub detect_timeout: Option<Duration>,
    /// auto, terse, ok-prefixed or no-power
    #[arg(long, value_name = "DIALECT")]
    pub dialect: Option<DialectSetting>,
    /// error, warn, info, debug or trace
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
    /// Append logs to this file as well as stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<String>,
    /// Config file to use instead of ~/.tftbridge/config.toml
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Parser)]
#[command(
    name = "tftbridge",
    version,
    about = "tftbridge - Moonraker to serial TFT bridge",
    override_usage = "tftbridge [run] [OPTIONS]"
)]
struct Cli {
    #[command(flatten)]
    options: RunOptions,
}

/// Parsed command-line intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(RunOptions),
    ShowHelp,
    ShowVersion,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        // Allow omitting the explicit `run` subcommand.
        let rest = match args.first().map(String::as_str) {
            Some("run") => &args[1..],
            _ => args,
        };
        let argv = std::iter::once("tftbridge".to_string()).chain(rest.iter().cloned());

        match Cli::try_parse_from(argv) {
            Ok(cli) => Ok(Command::Run(cli.options)),
            Err(err) => match err.kind() {
                ErrorKind::DisplayHelp => Ok(Command::ShowHelp),
                ErrorKind::DisplayVersion => Ok(Command::ShowVersion),
                _ => Err(Error::InvalidArgs(err.to_string().trim().to_string())),
            },
        }
    }

    pub fn help() -> String {
        Cli::command().render_help().to_string()
    }

    pub fn print_help() {
        println!("{}", Self::help());
    }
}
