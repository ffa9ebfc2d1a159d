use crate::protocol::Dialect;
use crate::telemetry::{PrintState, PrinterSnapshot};

use super::dispatch::summary_line;

/// State-change notification sent to the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    PrintStart,
    Pause,
    Resume,
    PrintEnd,
    Cancel,
}

impl Transition {
    pub fn action(&self) -> &'static str {
        match self {
            Transition::PrintStart => "print_start",
            Transition::Pause => "pause",
            Transition::Resume => "resume",
            Transition::PrintEnd => "print_end",
            Transition::Cancel => "cancel",
        }
    }

    fn between(prev: PrintState, next: PrintState) -> Option<Self> {
        use PrintState::*;
        match (prev, next) {
            (Standby | Complete | Cancelled | Error, Printing) => Some(Transition::PrintStart),
            (Printing, Paused) => Some(Transition::Pause),
            (Paused, Printing) => Some(Transition::Resume),
            (Printing, Complete) => Some(Transition::PrintEnd),
            (Printing | Paused, Cancelled | Error) => Some(Transition::Cancel),
            _ => None,
        }
    }
}

/// Last observed print state plus the panel-facing "print active" flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintTracker {
    last_state: PrintState,
    print_active: bool,
}

impl Default for PrintTracker {
    fn default() -> Self {
        Self {
            last_state: PrintState::Standby,
            print_active: false,
        }
    }
}

impl PrintTracker {
    pub fn last_state(&self) -> PrintState {
        self.last_state
    }

    pub fn print_active(&self) -> bool {
        self.print_active
    }

    /// Record a new state and report the transition it completes, if any.
    pub fn observe(&mut self, state: PrintState) -> Option<Transition> {
        let transition = Transition::between(self.last_state, state);
        match transition {
            Some(Transition::PrintStart) => self.print_active = true,
            Some(Transition::PrintEnd | Transition::Cancel) => self.print_active = false,
            _ => {}
        }
        self.last_state = state;
        transition
    }
}

/// Builds the unsolicited lines sent on every telemetry tick.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tracker: PrintTracker,
    summary_line: bool,
}

impl Notifier {
    pub fn new(summary_line: bool) -> Self {
        Self {
            tracker: PrintTracker::default(),
            summary_line,
        }
    }

    pub fn tracker(&self) -> &PrintTracker {
        &self.tracker
    }

    pub fn tick(&mut self, dialect: Dialect, snapshot: &PrinterSnapshot) -> Vec<String> {
        // Auto-report form: never carries the `ok` token.
        let mut lines = vec![dialect.temperature_report(snapshot)];

        if let Some(transition) = self.tracker.observe(snapshot.state) {
            lines.push(dialect.host_action(transition.action()));
        }

        if self.tracker.print_active() {
            lines.push(dialect.host_action(&format!(
                "notification Data Left {:.0}/100",
                snapshot.progress.clamp(0.0, 100.0)
            )));
            lines.push(dialect.host_action(&format!(
                "notification Time Left {}",
                time_left(snapshot.remaining_secs)
            )));
            if let Some((current, total)) = snapshot.layers() {
                lines.push(dialect.host_action(&format!(
                    "notification Layer Left {current}/{total}"
                )));
            }
        }

        if self.summary_line {
            lines.push(summary_line(snapshot));
        }
        lines
    }
}

fn time_left(secs: u64) -> String {
    format!(
        "{:02}h{:02}m{:02}s",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_state(state: PrintState) -> PrinterSnapshot {
        PrinterSnapshot {
            state,
            ..PrinterSnapshot::default()
        }
    }

    fn actions(lines: &[String]) -> Vec<&str> {
        lines
            .iter()
            .filter_map(|l| l.strip_prefix("//action:"))
            .filter(|l| !l.starts_with("notification"))
            .collect()
    }

    #[test]
    fn full_print_cycle_emits_four_transitions() {
        let mut notifier = Notifier::new(false);
        let mut seen = Vec::new();
        for state in [
            PrintState::Standby,
            PrintState::Printing,
            PrintState::Paused,
            PrintState::Printing,
            PrintState::Complete,
        ] {
            let lines = notifier.tick(Dialect::OkPrefixed, &with_state(state));
            seen.extend(actions(&lines).into_iter().map(str::to_string));
        }
        assert_eq!(seen, vec!["print_start", "pause", "resume", "print_end"]);
        assert!(!notifier.tracker().print_active());
    }

    #[test]
    fn repeated_state_emits_once() {
        let mut tracker = PrintTracker::default();
        assert_eq!(tracker.observe(PrintState::Printing), Some(Transition::PrintStart));
        assert_eq!(tracker.observe(PrintState::Printing), None);
        assert!(tracker.print_active());
    }

    #[test]
    fn cancel_from_pause_and_error_clear_active() {
        let mut tracker = PrintTracker::default();
        tracker.observe(PrintState::Printing);
        tracker.observe(PrintState::Paused);
        assert!(tracker.print_active());
        assert_eq!(tracker.observe(PrintState::Cancelled), Some(Transition::Cancel));
        assert!(!tracker.print_active());
        tracker.observe(PrintState::Printing);
        assert_eq!(tracker.observe(PrintState::Error), Some(Transition::Cancel));
    }

    #[test]
    fn untabled_transitions_are_silent_but_recorded() {
        let mut tracker = PrintTracker::default();
        assert_eq!(tracker.observe(PrintState::Complete), None);
        assert_eq!(tracker.last_state(), PrintState::Complete);
        assert_eq!(tracker.observe(PrintState::Standby), None);
        assert_eq!(tracker.observe(PrintState::Paused), None);
    }

    #[test]
    fn heartbeat_has_no_ok_token() {
        let mut notifier = Notifier::new(false);
        let lines = notifier.tick(Dialect::OkPrefixed, &PrinterSnapshot::default());
        assert_eq!(lines, vec!["T:0.0 /0.0 B:0.0 /0.0 @:0 B@:0"]);
    }

    #[test]
    fn active_print_reports_progress_time_and_layers() {
        let mut notifier = Notifier::new(false);
        let snap = PrinterSnapshot {
            state: PrintState::Printing,
            progress: 37.6,
            remaining_secs: 3_725,
            current_layer: Some(20),
            total_layers: Some(200),
            ..PrinterSnapshot::default()
        };
        let lines = notifier.tick(Dialect::NoPower, &snap);
        assert_eq!(
            lines,
            vec![
                "T:0.0 /0.0 B:0.0 /0.0",
                "M118 P0 A1 action:print_start",
                "M118 P0 A1 action:notification Data Left 38/100",
                "M118 P0 A1 action:notification Time Left 01h02m05s",
                "M118 P0 A1 action:notification Layer Left 20/200",
            ]
        );
    }

    #[test]
    fn progress_rounds_the_same_as_the_summary() {
        let mut notifier = Notifier::new(true);
        let snap = PrinterSnapshot {
            state: PrintState::Printing,
            progress: 99.7,
            ..PrinterSnapshot::default()
        };
        let lines = notifier.tick(Dialect::OkPrefixed, &snap);
        assert!(lines.contains(&"//action:notification Data Left 100/100".to_string()));
        assert!(lines
            .last()
            .is_some_and(|l| l.contains(":printing:100:")), "{lines:?}");
    }

    #[test]
    fn summary_line_is_optional() {
        let mut notifier = Notifier::new(true);
        let lines = notifier.tick(Dialect::Terse, &PrinterSnapshot::default());
        assert!(lines.last().is_some_and(|l| l.starts_with("KLIP:")));
    }
}
