use crate::telemetry::{PrinterSnapshot, TelemetrySource};
use crossbeam::channel::{self, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Granularity of the interruptible sleep between polls.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Reports sent over the polling channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Snapshot(PrinterSnapshot),
    Error(String),
}

/// Guard that keeps the poller thread alive until the flag is toggled.
pub struct PollingHandle {
    receiver: Receiver<PollEvent>,
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl PollingHandle {
    pub fn receiver(&self) -> &Receiver<PollEvent> {
        &self.receiver
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the background poller that fetches a snapshot roughly every `interval`.
///
/// Slow or failing requests only ever stall this thread.
pub fn start_polling<S>(
    mut source: S,
    interval: Duration,
    app_running: Arc<AtomicBool>,
) -> std::io::Result<PollingHandle>
where
    S: TelemetrySource + Send + 'static,
{
    let interval = interval.max(Duration::from_millis(1));
    let (tx, rx) = channel::unbounded();
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    let thread = thread::Builder::new()
        .name("tftbridge-poller".into())
        .spawn(move || {
            let keep_going = || {
                app_running.load(Ordering::SeqCst) && running_clone.load(Ordering::SeqCst)
            };
            while keep_going() {
                let start = Instant::now();
                let event = match source.fetch() {
                    Ok(snapshot) => PollEvent::Snapshot(snapshot),
                    Err(err) => PollEvent::Error(err.to_string()),
                };
                if tx.send(event).is_err() {
                    break;
                }
                while keep_going() && start.elapsed() < interval {
                    thread::sleep(SLEEP_SLICE.min(interval - start.elapsed().min(interval)));
                }
            }
        })?;
    Ok(PollingHandle {
        receiver: rx,
        running,
        thread: Some(thread),
    })
}
