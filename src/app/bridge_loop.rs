use super::polling::PollEvent;
use crate::serial::LineIo;
use crate::session::{Session, SessionState};
use crate::Result;
use crossbeam::channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pause used when a pass neither read a frame nor drained an event.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Drive one session until shutdown or a transport failure.
///
/// Each pass does a bounded read, checks the detection window, then drains
/// telemetry so notifier lines only ever go out between replies.
pub(crate) fn run_bridge_loop<IO: LineIo>(
    session: &mut Session<IO>,
    poll_events: &Receiver<PollEvent>,
    running: &AtomicBool,
) -> Result<()> {
    session.begin(Instant::now())?;
    let mut failing = false;

    let outcome = loop {
        if !running.load(Ordering::SeqCst) {
            info!("shutdown requested");
            break Ok(());
        }
        if session.state() == SessionState::Closed {
            break Ok(());
        }

        let mut busy = match session.service_inbound(Instant::now()) {
            Ok(read) => read,
            Err(err) => break Err(err),
        };
        if let Err(err) = session.poll_detection(Instant::now()) {
            break Err(err);
        }

        let mut drained = Ok(());
        for event in poll_events.try_iter() {
            busy = true;
            drained = match event {
                PollEvent::Snapshot(snapshot) => {
                    if failing {
                        info!("telemetry recovered");
                        failing = false;
                    }
                    session.on_snapshot(snapshot)
                }
                PollEvent::Error(reason) => {
                    if failing {
                        debug!(reason, "telemetry still failing");
                    } else {
                        warn!(reason, "telemetry fetch failed");
                        failing = true;
                    }
                    session.on_fetch_failure(&reason)
                }
            };
            if drained.is_err() {
                break;
            }
        }
        if let Err(err) = drained {
            break Err(err);
        }

        if !busy {
            thread::sleep(IDLE_SLEEP);
        }
    };

    session.close();
    outcome
}
