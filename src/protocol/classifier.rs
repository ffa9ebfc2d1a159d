use super::{Dialect, Frame};
use std::time::{Duration, Instant};

/// Default length of the detection window.
pub const DEFAULT_DETECT_WINDOW: Duration = Duration::from_secs(10);

/// Why a dialect was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// A frame carried a conclusive signal.
    Detected(Dialect),
    /// The window ran out and the fallback policy applied.
    Defaulted(Dialect),
}

impl Verdict {
    pub fn dialect(&self) -> Dialect {
        match self {
            Verdict::Detected(d) | Verdict::Defaulted(d) => *d,
        }
    }
}

/// Watches the opening frames from the panel and picks a dialect.
#[derive(Debug, Clone)]
pub struct Classifier {
    started: Instant,
    window: Duration,
    fallback: Dialect,
    frames_seen: usize,
}

impl Classifier {
    pub fn new(started: Instant, window: Duration, fallback: Dialect) -> Self {
        Self {
            started,
            window,
            fallback,
            frames_seen: 0,
        }
    }

    pub fn frames_seen(&self) -> usize {
        self.frames_seen
    }

    /// Inspect one frame. `Some` means the frame was conclusive.
    ///
    /// Numbered or checksummed lines mark the ok-prefixed firmware; a plain
    /// `M105` with neither marks the terse one. Anything else stays pending.
    pub fn observe(&mut self, frame: &Frame) -> Option<Verdict> {
        self.frames_seen += 1;
        if frame.has_integrity_markers() {
            return Some(Verdict::Detected(Dialect::OkPrefixed));
        }
        let bare_temperature_query = frame
            .command()
            .is_some_and(|cmd| cmd.is('M', 105));
        if bare_temperature_query {
            return Some(Verdict::Detected(Dialect::Terse));
        }
        None
    }

    pub fn deadline(&self) -> Instant {
        self.started + self.window
    }

    /// Fallback verdict once the window has elapsed.
    pub fn expire(&self, now: Instant) -> Option<Verdict> {
        if now >= self.deadline() {
            Some(Verdict::Defaulted(self.fallback))
        } else {
            None
        }
    }
}
