use crate::Error;
use std::fmt;
use std::io::{self, ErrorKind};

// Linux errno values the serial driver reports without a matching `ErrorKind`.
const EIO: i32 = 5;
const ENXIO: i32 = 6;
const EBUSY: i32 = 16;
const ENODEV: i32 = 19;

/// Why the panel's serial link could not be opened or went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialFailureKind {
    PermissionDenied,
    DeviceMissing,
    Busy,
    Disconnected,
    Config,
    Unknown,
}

impl SerialFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SerialFailureKind::PermissionDenied => "permission_denied",
            SerialFailureKind::DeviceMissing => "device_missing",
            SerialFailureKind::Busy => "busy",
            SerialFailureKind::Disconnected => "disconnected",
            SerialFailureKind::Config => "config",
            SerialFailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SerialFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason attached to open failures and fatal mid-session transport errors.
///
/// Read timeouts and malformed frames never reach here; the session handles
/// them without closing.
pub fn classify_error(err: &Error) -> SerialFailureKind {
    match err {
        Error::Io(io_err) => classify_io_error(io_err),
        Error::InvalidArgs(_) | Error::Config(_) => SerialFailureKind::Config,
        _ => SerialFailureKind::Unknown,
    }
}

fn classify_io_error(err: &io::Error) -> SerialFailureKind {
    match (err.kind(), err.raw_os_error()) {
        (ErrorKind::PermissionDenied, _) => SerialFailureKind::PermissionDenied,
        (ErrorKind::NotFound, _) | (_, Some(ENODEV | ENXIO)) => SerialFailureKind::DeviceMissing,
        (_, Some(EBUSY)) => SerialFailureKind::Busy,
        (ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof, _)
        | (_, Some(EIO)) => SerialFailureKind::Disconnected,
        (ErrorKind::InvalidInput, _) => SerialFailureKind::Config,
        _ => SerialFailureKind::Unknown,
    }
}
