use crate::{Error, Result};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

use super::{
    DtrBehavior, FlowControlMode, LineIo, ParityMode, SerialOptions, StopBitsMode,
    MAX_FRAME_BYTES,
};

/// Blocking serial transport with a bounded read timeout.
pub struct SerialPort {
    device: String,
    baud: u32,
    port: Option<Box<dyn serialport::SerialPort>>,
    pending: Vec<u8>,
    discarding: bool,
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPort")
            .field("device", &self.device)
            .field("baud", &self.baud)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl SerialPort {
    pub fn connect(device: &str, options: SerialOptions) -> Result<Self> {
        if device.trim().is_empty() {
            return Err(Error::InvalidArgs(
                "device path cannot be empty".to_string(),
            ));
        }

        let mut builder = serialport::new(device, options.baud)
            .data_bits(DataBits::Eight)
            .parity(to_serial_parity(options.parity))
            .stop_bits(to_serial_stop_bits(options.stop_bits))
            .flow_control(to_serial_flow(options.flow_control))
            .timeout(Duration::from_millis(options.timeout_ms));

        builder = match options.dtr {
            DtrBehavior::Preserve => builder,
            DtrBehavior::Assert => builder.dtr_on_open(true),
            DtrBehavior::Deassert => builder.dtr_on_open(false),
        };

        let port = builder.open().map_err(map_serial_error)?;

        Ok(Self {
            device: device.to_string(),
            baud: options.baud,
            port: Some(port),
            pending: Vec::with_capacity(MAX_FRAME_BYTES),
            discarding: false,
        })
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Pull one complete line out of `pending`, if present.
    fn take_line(&mut self, line_buffer: &mut String) -> Option<Result<usize>> {
        let newline = self.pending.iter().position(|b| *b == b'\n')?;
        let mut raw: Vec<u8> = self.pending.drain(..=newline).collect();
        let total = raw.len();
        if self.discarding || newline > MAX_FRAME_BYTES {
            self.discarding = false;
            return Some(Err(Error::Parse(format!(
                "frame exceeds {MAX_FRAME_BYTES} bytes"
            ))));
        }
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        match String::from_utf8(raw) {
            Ok(text) => {
                line_buffer.push_str(&text);
                Some(Ok(total))
            }
            Err(_) => Some(Err(Error::Parse("frame is not valid UTF-8".into()))),
        }
    }
}

impl LineIo for SerialPort {
    fn send_command_line(&mut self, line: &str) -> Result<()> {
        let Some(port) = self.port.as_mut() else {
            return Ok(());
        };

        let mut buf = Vec::with_capacity(line.len() + 2);
        buf.extend_from_slice(line.as_bytes());
        buf.extend_from_slice(b"\r\n");
        port.write_all(&buf)?;
        port.flush()?;
        Ok(())
    }

    fn read_message_line(&mut self, line_buffer: &mut String) -> Result<usize> {
        line_buffer.clear();
        if let Some(result) = self.take_line(line_buffer) {
            return result;
        }

        let mut chunk = [0u8; 64];
        loop {
            let port = self
                .port
                .as_deref_mut()
                .ok_or_else(|| Error::InvalidArgs("serial port not connected".into()))?;
            match port.read(&mut chunk) {
                Ok(0) => return Ok(0),
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    if let Some(result) = self.take_line(line_buffer) {
                        return result;
                    }
                    if self.pending.len() > MAX_FRAME_BYTES {
                        // Keep dropping bytes until the next newline so the
                        // tail of an oversized frame is not parsed as a command.
                        self.pending.clear();
                        self.discarding = true;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(0),
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            let _ = port.flush();
        }
        self.pending.clear();
    }
}

fn map_serial_error(err: serialport::Error) -> Error {
    use serialport::ErrorKind;

    let kind = match err.kind() {
        ErrorKind::NoDevice => io::ErrorKind::NotFound,
        ErrorKind::InvalidInput => io::ErrorKind::InvalidInput,
        ErrorKind::Io(inner) => inner,
        ErrorKind::Unknown => io::ErrorKind::Other,
    };

    Error::Io(io::Error::new(kind, err))
}

fn to_serial_flow(mode: FlowControlMode) -> FlowControl {
    match mode {
        FlowControlMode::None => FlowControl::None,
        FlowControlMode::Software => FlowControl::Software,
        FlowControlMode::Hardware => FlowControl::Hardware,
    }
}

fn to_serial_parity(mode: ParityMode) -> Parity {
    match mode {
        ParityMode::None => Parity::None,
        ParityMode::Odd => Parity::Odd,
        ParityMode::Even => Parity::Even,
    }
}

fn to_serial_stop_bits(mode: StopBitsMode) -> StopBits {
    match mode {
        StopBitsMode::One => StopBits::One,
        StopBitsMode::Two => StopBits::Two,
    }
}
