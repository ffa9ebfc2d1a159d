//! Maps one decoded frame to a semantic operation and builds the reply.
//!
//! Replies are dialect-formatted but carry no acknowledgement discipline; the
//! session decides where the bare `ok` goes.

use crate::protocol::{Dialect, Frame, GcodeCommand};
use crate::telemetry::{ControlRequest, Heater, PrintAction, PrintState, PrinterSnapshot};

/// Nominal file size used to synthesize the SD byte counter.
pub const SD_NOMINAL_BYTES: u64 = 1_000_000;
pub const STEPS_PER_UNIT: &str = "M92 X80.00 Y80.00 Z400.00 E420.00";
pub const PLACEHOLDER_FILE: &str = "test.gcode";

/// A numeric parameter as it arrived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg {
    Missing,
    Invalid,
    Value(f64),
}

impl Arg {
    fn from_command(cmd: &GcodeCommand, letter: char) -> Self {
        match cmd.param(letter) {
            None => Arg::Missing,
            Some(_) => cmd.numeric(letter).map_or(Arg::Invalid, Arg::Value),
        }
    }

    /// Usable value; negative numbers are treated as garbage.
    fn value(&self) -> Option<f64> {
        match self {
            Arg::Value(v) if *v >= 0.0 => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    QueryTemperature,
    QueryFirmware,
    QueryPosition,
    QuerySdStatus,
    QueryFileList,
    QueryStepsPerUnit,
    SetHotendTarget(Arg),
    SetBedTarget(Arg),
    SetFanSpeed(Arg),
    FanOff,
    SpeedFactor(Arg),
    FlowFactor(Arg),
    Home,
    Print(PrintAction),
    StatusSummary,
    Unrecognized,
}

impl Operation {
    pub fn decode(frame: &Frame) -> Self {
        if let Some(action) = frame.action() {
            return decode_action(action);
        }
        let Some(cmd) = frame.command() else {
            return Operation::Unrecognized;
        };
        match (cmd.letter, cmd.number) {
            ('M', 105) => Operation::QueryTemperature,
            ('M', 115) => Operation::QueryFirmware,
            ('M', 114) => Operation::QueryPosition,
            ('M', 27) => Operation::QuerySdStatus,
            ('M', 20) => Operation::QueryFileList,
            ('M', 92) => Operation::QueryStepsPerUnit,
            ('M', 104) | ('M', 109) => {
                Operation::SetHotendTarget(Arg::from_command(&cmd, 'S'))
            }
            ('M', 140) | ('M', 190) => Operation::SetBedTarget(Arg::from_command(&cmd, 'S')),
            ('M', 106) => Operation::SetFanSpeed(Arg::from_command(&cmd, 'S')),
            ('M', 107) => Operation::FanOff,
            ('M', 220) => Operation::SpeedFactor(Arg::from_command(&cmd, 'S')),
            ('M', 221) => Operation::FlowFactor(Arg::from_command(&cmd, 'S')),
            ('G', 28) => Operation::Home,
            ('M', 25) => Operation::Print(PrintAction::Pause),
            ('M', 24) => Operation::Print(PrintAction::Resume),
            ('M', 524) => Operation::Print(PrintAction::Cancel),
            ('M', 999) => Operation::StatusSummary,
            _ => Operation::Unrecognized,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::QueryTemperature => "query-temperature",
            Operation::QueryFirmware => "query-firmware",
            Operation::QueryPosition => "query-position",
            Operation::QuerySdStatus => "query-sd-status",
            Operation::QueryFileList => "query-file-list",
            Operation::QueryStepsPerUnit => "query-steps-per-unit",
            Operation::SetHotendTarget(_) => "set-hotend-target",
            Operation::SetBedTarget(_) => "set-bed-target",
            Operation::SetFanSpeed(_) | Operation::FanOff => "set-fan-speed",
            Operation::SpeedFactor(_) => "speed-factor",
            Operation::FlowFactor(_) => "flow-factor",
            Operation::Home => "home",
            Operation::Print(PrintAction::Pause) => "pause",
            Operation::Print(PrintAction::Resume) => "resume",
            Operation::Print(PrintAction::Cancel) => "cancel",
            Operation::StatusSummary => "status-summary",
            Operation::Unrecognized => "unrecognized",
        }
    }
}

fn decode_action(action: &str) -> Operation {
    let action = action.trim().to_ascii_lowercase();
    let verb = action.strip_prefix("remote ").unwrap_or(&action).trim();
    match verb {
        "pause" => Operation::Print(PrintAction::Pause),
        "resume" => Operation::Print(PrintAction::Resume),
        "cancel" => Operation::Print(PrintAction::Cancel),
        _ => Operation::Unrecognized,
    }
}

/// Dialect-formatted outcome of one operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reply {
    pub lines: Vec<String>,
    pub control: Option<ControlRequest>,
    /// The first line already holds the acknowledgement token for this dialect.
    pub embeds_ack: bool,
}

impl Reply {
    fn lines(lines: Vec<String>) -> Self {
        Self {
            lines,
            ..Self::default()
        }
    }

    fn control(request: ControlRequest) -> Self {
        Self {
            control: Some(request),
            ..Self::default()
        }
    }
}

/// Run one operation against the in-memory snapshot.
pub fn dispatch(op: &Operation, dialect: Dialect, snapshot: &mut PrinterSnapshot) -> Reply {
    match op {
        Operation::QueryTemperature => Reply {
            lines: vec![dialect.temperature_reply(snapshot)],
            control: None,
            embeds_ack: dialect.immediate_ok(),
        },
        Operation::QueryFirmware => Reply::lines(dialect.firmware_lines()),
        Operation::QueryPosition => Reply::lines(vec![format!(
            "X:{:.2} Y:{:.2} Z:{:.2} E:0.00",
            snapshot.position.x, snapshot.position.y, snapshot.position.z
        )]),
        Operation::QuerySdStatus => Reply::lines(vec![sd_status(snapshot)]),
        Operation::QueryFileList => {
            let name = if snapshot.filename.is_empty() {
                PLACEHOLDER_FILE.to_string()
            } else {
                snapshot.filename.clone()
            };
            Reply::lines(vec![
                "Begin file list".to_string(),
                name,
                "End file list".to_string(),
            ])
        }
        Operation::QueryStepsPerUnit => Reply::lines(vec![STEPS_PER_UNIT.to_string()]),
        Operation::SetHotendTarget(arg) => match arg.value() {
            Some(value) => {
                snapshot.hotend.target = value;
                Reply::control(ControlRequest::SetTarget {
                    heater: Heater::Hotend,
                    value,
                })
            }
            None => Reply::default(),
        },
        Operation::SetBedTarget(arg) => match arg.value() {
            Some(value) => {
                snapshot.bed.target = value;
                Reply::control(ControlRequest::SetTarget {
                    heater: Heater::Bed,
                    value,
                })
            }
            None => Reply::default(),
        },
        Operation::SetFanSpeed(arg) => match arg.value() {
            Some(pwm) => {
                let pwm = pwm.min(255.0);
                snapshot.fan_percent = fan_percent_from_pwm(pwm);
                let script = format!("M106 S{}", pwm.round() as u16);
                Reply::control(ControlRequest::Gcode(script))
            }
            None => Reply::default(),
        },
        Operation::FanOff => {
            snapshot.fan_percent = 0;
            Reply::control(ControlRequest::Gcode("M107".to_string()))
        }
        Operation::SpeedFactor(arg) => match arg {
            Arg::Missing => Reply::lines(vec![format!("FR:{}%", snapshot.speed_factor)]),
            _ => match arg.value() {
                Some(value) => {
                    snapshot.speed_factor = factor(value);
                    Reply::control(ControlRequest::Gcode(format!(
                        "M220 S{}",
                        snapshot.speed_factor
                    )))
                }
                None => Reply::default(),
            },
        },
        Operation::FlowFactor(arg) => match arg {
            Arg::Missing => Reply::lines(vec![format!("E0 Flow: {}%", snapshot.flow_factor)]),
            _ => match arg.value() {
                Some(value) => {
                    snapshot.flow_factor = factor(value);
                    Reply::control(ControlRequest::Gcode(format!(
                        "M221 S{}",
                        snapshot.flow_factor
                    )))
                }
                None => Reply::default(),
            },
        },
        Operation::Home => Reply::default(),
        Operation::Print(action) => Reply {
            lines: vec![dialect.host_action(confirmation(*action))],
            control: Some(ControlRequest::Print(*action)),
            embeds_ack: false,
        },
        Operation::StatusSummary => Reply::lines(vec![summary_line(snapshot)]),
        Operation::Unrecognized => Reply::default(),
    }
}

/// `round(pwm / 255 * 100)`.
pub fn fan_percent_from_pwm(pwm: f64) -> u8 {
    (pwm.clamp(0.0, 255.0) / 255.0 * 100.0).round() as u8
}

fn factor(value: f64) -> u16 {
    value.round().clamp(1.0, 999.0) as u16
}

fn confirmation(action: PrintAction) -> &'static str {
    match action {
        PrintAction::Pause => "paused",
        PrintAction::Resume => "resumed",
        PrintAction::Cancel => "cancel",
    }
}

fn sd_status(snapshot: &PrinterSnapshot) -> String {
    if snapshot.state == PrintState::Printing {
        let per_percent = SD_NOMINAL_BYTES as f64 / 100.0;
        let done = (snapshot.progress.clamp(0.0, 100.0) * per_percent) as u64;
        format!("SD printing byte {done}/{SD_NOMINAL_BYTES}")
    } else {
        "Not SD printing".to_string()
    }
}

fn hours_minutes(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
}

/// One-line status dump for custom panel screens.
pub fn summary_line(snapshot: &PrinterSnapshot) -> String {
    let filename = if snapshot.filename.is_empty() {
        "No file"
    } else {
        snapshot.filename.as_str()
    };
    format!(
        "KLIP:{:.1}:{:.1}:{:.1}:{:.1}:{}:{:.0}:{:.2}:{:.2}:{:.2}:{}/{}:{}:{}:{}:{}",
        snapshot.hotend.current,
        snapshot.hotend.target,
        snapshot.bed.current,
        snapshot.bed.target,
        snapshot.state,
        snapshot.progress,
        snapshot.position.x,
        snapshot.position.y,
        snapshot.position.z,
        hours_minutes(snapshot.elapsed_secs),
        hours_minutes(snapshot.remaining_secs),
        filename,
        snapshot.speed_factor,
        snapshot.flow_factor,
        snapshot.fan_percent
    )
}
