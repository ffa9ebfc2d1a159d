use crate::telemetry::{ControlRequest, PrinterControl};
use crossbeam::channel::Receiver;
use std::thread;
use tracing::{debug, warn};

/// Run printer-control requests off the serial thread.
///
/// The worker exits once every sender has been dropped.
pub fn spawn_control_worker<C>(
    control: C,
    requests: Receiver<ControlRequest>,
) -> std::io::Result<thread::JoinHandle<()>>
where
    C: PrinterControl + Send + 'static,
{
    thread::Builder::new()
        .name("tftbridge-control".into())
        .spawn(move || {
            for request in requests.iter() {
                match request.apply(&control) {
                    Ok(()) => debug!(?request, "control request applied"),
                    Err(err) => warn!(?request, error = %err, "control request failed"),
                }
            }
            debug!("control worker stopped");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{Heater, PrintAction};
    use crate::{Error, Result};
    use crossbeam::channel;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl PrinterControl for Recorder {
        fn set_target_temperature(&self, heater: Heater, value: f64) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}={value}", heater.klipper_name()));
            Ok(())
        }

        fn print_control(&self, action: PrintAction) -> Result<()> {
            self.calls.lock().unwrap().push(action.as_str().to_string());
            Err(Error::Telemetry("HTTP 503".into()))
        }

        fn run_gcode(&self, script: &str) -> Result<()> {
            self.calls.lock().unwrap().push(script.to_string());
            Ok(())
        }
    }

    #[test]
    fn worker_applies_requests_in_order_and_survives_failures() {
        let recorder = Recorder::default();
        let (tx, rx) = channel::unbounded();
        let handle = spawn_control_worker(recorder.clone(), rx).unwrap();

        tx.send(ControlRequest::Print(PrintAction::Pause)).unwrap();
        tx.send(ControlRequest::SetTarget {
            heater: Heater::Bed,
            value: 60.0,
        })
        .unwrap();
        tx.send(ControlRequest::Gcode("M107".into())).unwrap();
        drop(tx);
        handle.join().unwrap();

        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["pause", "heater_bed=60", "M107"]);
    }
}
