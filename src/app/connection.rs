use crate::serial::{errors::classify_error, SerialOptions, SerialPort};
use crate::Result;
use tracing::{error, info};

/// Open the panel's serial port, logging the classified reason on failure.
pub(crate) fn open_serial(device: &str, options: SerialOptions) -> Result<SerialPort> {
    match SerialPort::connect(device, options) {
        Ok(port) => {
            info!(
                device,
                baud = options.baud,
                flow_control = %options.flow_control,
                parity = %options.parity,
                stop_bits = %options.stop_bits,
                "serial connected"
            );
            Ok(port)
        }
        Err(err) => {
            error!(
                device,
                reason = %classify_error(&err),
                error = %err,
                "serial connect failed"
            );
            Err(err)
        }
    }
}
