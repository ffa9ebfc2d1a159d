//! Conversation with one attached panel, from open to close.
//!
//! The session owns the transport, so every write goes through it and
//! multi-line replies can never interleave with notifier output.

use crate::protocol::{Classifier, Dialect, DialectSetting, Frame, Verdict, ACKNOWLEDGEMENT};
use crate::serial::{errors::classify_error, LineIo};
use crate::telemetry::{ControlRequest, PrinterSnapshot};
use crate::{Error, Result};
use crossbeam::channel::Sender;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

pub mod dispatch;
pub mod notifier;

use dispatch::{dispatch, Operation, Reply};
use notifier::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Classifying,
    HandshakeInFlight,
    SteadyState,
    Closed,
}

/// Protocol policy for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub dialect: DialectSetting,
    pub fallback: Dialect,
    pub detect_window: Duration,
    pub summary_line: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            dialect: DialectSetting::Auto,
            fallback: Dialect::OkPrefixed,
            detect_window: crate::protocol::classifier::DEFAULT_DETECT_WINDOW,
            summary_line: false,
        }
    }
}

pub struct Session<IO: LineIo> {
    io: IO,
    options: SessionOptions,
    state: SessionState,
    dialect: Option<Dialect>,
    classifier: Option<Classifier>,
    snapshot: PrinterSnapshot,
    snapshot_seen: bool,
    notifier: Notifier,
    control: Option<Sender<ControlRequest>>,
    line_buffer: String,
}

impl<IO: LineIo> Session<IO> {
    /// Wrap an already-open transport. Nothing is sent until [`Session::begin`].
    pub fn new(io: IO, options: SessionOptions, control: Sender<ControlRequest>) -> Self {
        Self {
            io,
            options,
            state: SessionState::Disconnected,
            dialect: None,
            classifier: None,
            snapshot: PrinterSnapshot::default(),
            snapshot_seen: false,
            notifier: Notifier::new(options.summary_line),
            control: Some(control),
            line_buffer: String::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// `None` until the dialect is settled.
    pub fn dialect(&self) -> Option<Dialect> {
        self.dialect
    }

    pub fn handshake_complete(&self) -> bool {
        self.state == SessionState::SteadyState
    }

    pub fn snapshot(&self) -> &PrinterSnapshot {
        &self.snapshot
    }

    pub fn print_active(&self) -> bool {
        self.notifier.tracker().print_active()
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    /// Start the conversation. A fixed dialect skips detection and handshakes now.
    pub fn begin(&mut self, now: Instant) -> Result<()> {
        if self.state != SessionState::Disconnected {
            return Ok(());
        }
        self.state = SessionState::Classifying;
        match self.options.dialect {
            DialectSetting::Fixed(dialect) => {
                info!(dialect = %dialect, "using configured dialect");
                self.settle(dialect)
            }
            DialectSetting::Auto => {
                debug!(
                    window_ms = self.options.detect_window.as_millis() as u64,
                    "classifying display dialect"
                );
                self.classifier = Some(Classifier::new(
                    now,
                    self.options.detect_window,
                    self.options.fallback,
                ));
                Ok(())
            }
        }
    }

    /// Read at most one frame from the transport and react to it.
    ///
    /// Returns `Ok(false)` when the read timed out. Malformed input is dropped;
    /// transport failures close the session and are returned.
    pub fn service_inbound(&mut self, now: Instant) -> Result<bool> {
        if self.state == SessionState::Closed {
            return Ok(false);
        }
        let mut buf = std::mem::take(&mut self.line_buffer);
        let result = self.io.read_message_line(&mut buf);
        let outcome = match result {
            Ok(0) => Ok(false),
            Ok(_) => self.handle_line(&buf, now).map(|_| true),
            Err(err @ (Error::Parse(_) | Error::ChecksumMismatch { .. })) => {
                debug!(error = %err, "dropping malformed frame");
                Ok(true)
            }
            Err(err) => Err(self.fail(err)),
        };
        self.line_buffer = buf;
        outcome
    }

    /// React to one raw inbound line.
    pub fn handle_line(&mut self, raw: &str, now: Instant) -> Result<()> {
        let frame = match Frame::parse(raw) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(err) => {
                debug!(error = %err, line = raw.trim(), "dropping malformed frame");
                return Ok(());
            }
        };
        trace!(line = %frame.body, "panel >>");

        match self.state {
            SessionState::Disconnected | SessionState::Closed => Ok(()),
            SessionState::Classifying => self.classify(&frame, now),
            SessionState::HandshakeInFlight => Ok(()),
            SessionState::SteadyState => {
                let Some(dialect) = self.dialect else {
                    return Ok(());
                };
                let op = Operation::decode(&frame);
                trace!(operation = op.name(), "dispatch");
                let reply = dispatch(&op, dialect, &mut self.snapshot);
                self.respond(dialect, reply)
            }
        }
    }

    /// Apply the detection-window fallback once it has elapsed.
    pub fn poll_detection(&mut self, now: Instant) -> Result<()> {
        if self.state != SessionState::Classifying {
            return Ok(());
        }
        let verdict = self.classifier.as_ref().and_then(|c| c.expire(now));
        match verdict {
            Some(verdict) => self.conclude(verdict),
            None => Ok(()),
        }
    }

    /// Replace the snapshot wholesale and run the notifier.
    pub fn on_snapshot(&mut self, snapshot: PrinterSnapshot) -> Result<()> {
        self.snapshot = snapshot;
        self.snapshot_seen = true;
        self.notify()
    }

    /// Keep the last-known-good snapshot; still heartbeat if one exists.
    pub fn on_fetch_failure(&mut self, reason: &str) -> Result<()> {
        debug!(reason, "telemetry fetch failed; keeping previous snapshot");
        if !self.snapshot_seen {
            return Ok(());
        }
        self.notify()
    }

    /// Close the transport. Later writes become no-ops.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.io.close();
        self.control = None;
        self.state = SessionState::Closed;
        info!("session closed");
    }

    fn classify(&mut self, frame: &Frame, now: Instant) -> Result<()> {
        let verdict = match self.classifier.as_mut() {
            Some(classifier) => classifier.observe(frame),
            None => None,
        };
        if let Some(verdict) = verdict {
            return self.conclude(verdict);
        }
        if let Some(verdict) = self.classifier.as_ref().and_then(|c| c.expire(now)) {
            return self.conclude(verdict);
        }

        // Keep the panel from timing out while undecided.
        self.write_lines(&[ACKNOWLEDGEMENT])
    }

    fn conclude(&mut self, verdict: Verdict) -> Result<()> {
        let frames = self.classifier.take().map_or(0, |c| c.frames_seen());
        match verdict {
            Verdict::Detected(dialect) => {
                info!(dialect = %dialect, frames, "detected display dialect")
            }
            Verdict::Defaulted(dialect) => warn!(
                dialect = %dialect,
                frames,
                "no conclusive frame within the detection window; assuming dialect"
            ),
        }
        self.settle(verdict.dialect())
    }

    fn settle(&mut self, dialect: Dialect) -> Result<()> {
        self.dialect = Some(dialect);
        self.state = SessionState::HandshakeInFlight;
        let lines = dialect.handshake(&self.snapshot);
        self.write_lines(&lines)?;
        self.state = SessionState::SteadyState;
        debug!(dialect = %dialect, "handshake sent");
        Ok(())
    }

    fn respond(&mut self, dialect: Dialect, reply: Reply) -> Result<()> {
        let mut lines = Vec::with_capacity(reply.lines.len() + 1);
        if dialect.immediate_ok() {
            if !reply.embeds_ack {
                lines.push(ACKNOWLEDGEMENT.to_string());
            }
            lines.extend(reply.lines);
        } else if reply.lines.is_empty() {
            lines.push(ACKNOWLEDGEMENT.to_string());
        } else {
            lines.extend(reply.lines);
        }
        self.write_lines(&lines)?;

        if let Some(request) = reply.control {
            self.queue_control(request);
        }
        Ok(())
    }

    fn notify(&mut self) -> Result<()> {
        let (SessionState::SteadyState, Some(dialect)) = (self.state, self.dialect) else {
            return Ok(());
        };
        let lines = self.notifier.tick(dialect, &self.snapshot);
        self.write_lines(&lines)
    }

    fn queue_control(&mut self, request: ControlRequest) {
        let Some(tx) = self.control.as_ref() else {
            return;
        };
        debug!(?request, "queueing control request");
        if tx.send(request).is_err() {
            warn!("control worker gone; dropping request");
            self.control = None;
        }
    }

    fn write_lines<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        for line in lines {
            let line = line.as_ref();
            trace!(line, "panel <<");
            if let Err(err) = self.io.send_command_line(line) {
                return Err(self.fail(err));
            }
        }
        Ok(())
    }

    fn fail(&mut self, err: Error) -> Error {
        warn!(
            reason = %classify_error(&err),
            error = %err,
            "transport failure; closing session"
        );
        self.close();
        err
    }
}

impl<IO: LineIo> Drop for Session<IO> {
    fn drop(&mut self) {
        self.close();
    }
}
