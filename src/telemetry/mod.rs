//! Printer telemetry: the canonical snapshot plus the read/control seams the
//! bridge talks to. The Moonraker adapter lives in [`moonraker`].

use crate::Result;
use std::fmt;

pub mod moonraker;

pub use moonraker::MoonrakerClient;

/// Longest filename shown on the panel before it is shortened with `...`.
pub const MAX_FILENAME_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HeaterReading {
    pub current: f64,
    pub target: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrintState {
    #[default]
    Standby,
    Printing,
    Paused,
    Complete,
    Cancelled,
    Error,
}

impl PrintState {
    /// Map a Klipper `print_stats.state` string. Unknown values read as standby.
    pub fn from_klipper(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "printing" => Self::Printing,
            "paused" => Self::Paused,
            "complete" => Self::Complete,
            "cancelled" => Self::Cancelled,
            "error" => Self::Error,
            _ => Self::Standby,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standby => "standby",
            Self::Printing => "printing",
            Self::Paused => "paused",
            Self::Complete => "complete",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for PrintState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the panel can ask about, always fully populated.
#[derive(Debug, Clone, PartialEq)]
pub struct PrinterSnapshot {
    pub hotend: HeaterReading,
    pub bed: HeaterReading,
    pub position: Position,
    pub state: PrintState,
    /// 0-100.
    pub progress: f64,
    pub filename: String,
    pub elapsed_secs: u64,
    pub remaining_secs: u64,
    pub current_layer: Option<u32>,
    pub total_layers: Option<u32>,
    pub fan_percent: u8,
    pub speed_factor: u16,
    pub flow_factor: u16,
}

impl Default for PrinterSnapshot {
    fn default() -> Self {
        Self {
            hotend: HeaterReading::default(),
            bed: HeaterReading::default(),
            position: Position::default(),
            state: PrintState::Standby,
            progress: 0.0,
            filename: String::new(),
            elapsed_secs: 0,
            remaining_secs: 0,
            current_layer: None,
            total_layers: None,
            fan_percent: 0,
            speed_factor: 100,
            flow_factor: 100,
        }
    }
}

impl PrinterSnapshot {
    /// Layer pair when the slicer reported both counts and they make sense.
    pub fn layers(&self) -> Option<(u32, u32)> {
        match (self.current_layer, self.total_layers) {
            (Some(current), Some(total)) if current > 0 && current <= total => {
                Some((current, total))
            }
            _ => None,
        }
    }
}

/// `elapsed * (100 / progress) - elapsed`, or 0 before any progress is known.
pub fn remaining_from(elapsed_secs: u64, progress: f64) -> u64 {
    if !(progress > 0.0) || !progress.is_finite() {
        return 0;
    }
    let elapsed = elapsed_secs as f64;
    let remaining = elapsed * (100.0 / progress) - elapsed;
    if remaining > 0.0 {
        remaining as u64
    } else {
        0
    }
}

/// Strip directories and cap the length so the name fits the panel.
pub fn display_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    if base.chars().count() <= MAX_FILENAME_CHARS {
        return base.to_string();
    }
    let mut short: String = base.chars().take(MAX_FILENAME_CHARS - 3).collect();
    short.push_str("...");
    short
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heater {
    Hotend,
    Bed,
}

impl Heater {
    /// Klipper heater object name.
    pub fn klipper_name(&self) -> &'static str {
        match self {
            Heater::Hotend => "extruder",
            Heater::Bed => "heater_bed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintAction {
    Pause,
    Resume,
    Cancel,
}

impl PrintAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrintAction::Pause => "pause",
            PrintAction::Resume => "resume",
            PrintAction::Cancel => "cancel",
        }
    }
}

/// Read side of the printer server.
pub trait TelemetrySource {
    fn fetch(&mut self) -> Result<PrinterSnapshot>;
}

/// Write side of the printer server. Callers treat every call as fire-and-forget.
pub trait PrinterControl {
    fn set_target_temperature(&self, heater: Heater, value: f64) -> Result<()>;
    fn print_control(&self, action: PrintAction) -> Result<()>;
    fn run_gcode(&self, script: &str) -> Result<()>;
}

/// Side effect queued by the session for the control worker.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    SetTarget { heater: Heater, value: f64 },
    Print(PrintAction),
    Gcode(String),
}

impl ControlRequest {
    pub fn apply<C: PrinterControl + ?Sized>(&self, control: &C) -> Result<()> {
        match self {
            ControlRequest::SetTarget { heater, value } => {
                control.set_target_temperature(*heater, *value)
            }
            ControlRequest::Print(action) => control.print_control(*action),
            ControlRequest::Gcode(script) => control.run_gcode(script),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn default_snapshot_is_safe() {
        let snap = PrinterSnapshot::default();
        assert_eq!(snap.hotend.current, 0.0);
        assert_eq!(snap.state, PrintState::Standby);
        assert_eq!(snap.speed_factor, 100);
        assert_eq!(snap.layers(), None);
    }

    #[test]
    fn remaining_time_follows_progress() {
        assert_eq!(remaining_from(600, 50.0), 600);
        assert_eq!(remaining_from(300, 25.0), 900);
        assert_eq!(remaining_from(300, 0.0), 0);
        assert_eq!(remaining_from(300, f64::NAN), 0);
        assert_eq!(remaining_from(300, 100.0), 0);
    }

    #[test]
    fn filenames_are_stripped_and_capped() {
        assert_eq!(display_filename("gcodes/sub/benchy.gcode"), "benchy.gcode");
        assert_eq!(
            display_filename("a_really_long_model_name.gcode"),
            "a_really_long_mod..."
        );
        assert_eq!(display_filename(""), "");
    }

    #[test]
    fn state_strings_map_to_variants() {
        assert_eq!(PrintState::from_klipper("Printing"), PrintState::Printing);
        assert_eq!(PrintState::from_klipper("cancelled"), PrintState::Cancelled);
        assert_eq!(PrintState::from_klipper("startup"), PrintState::Standby);
    }

    #[test]
    fn layers_require_both_counts() {
        let mut snap = PrinterSnapshot {
            current_layer: Some(3),
            ..PrinterSnapshot::default()
        };
        assert_eq!(snap.layers(), None);
        snap.total_layers = Some(120);
        assert_eq!(snap.layers(), Some((3, 120)));
        snap.current_layer = Some(0);
        assert_eq!(snap.layers(), None);
    }

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
    }

    impl PrinterControl for Recorder {
        fn set_target_temperature(&self, heater: Heater, value: f64) -> Result<()> {
            self.calls
                .borrow_mut()
                .push(format!("{} {value}", heater.klipper_name()));
            Ok(())
        }

        fn print_control(&self, action: PrintAction) -> Result<()> {
            self.calls.borrow_mut().push(action.as_str().to_string());
            Ok(())
        }

        fn run_gcode(&self, script: &str) -> Result<()> {
            self.calls.borrow_mut().push(script.to_string());
            Ok(())
        }
    }

    #[test]
    fn control_requests_route_to_the_right_call() {
        let recorder = Recorder::default();
        ControlRequest::SetTarget {
            heater: Heater::Bed,
            value: 60.0,
        }
        .apply(&recorder)
        .unwrap();
        ControlRequest::Print(PrintAction::Cancel)
            .apply(&recorder)
            .unwrap();
        ControlRequest::Gcode("M106 S255".into())
            .apply(&recorder)
            .unwrap();
        assert_eq!(
            recorder.calls.into_inner(),
            vec!["heater_bed 60", "cancel", "M106 S255"]
        );
    }
}
