use crate::Result;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub mod errors;
pub mod fake;
pub mod sync;

pub use sync::SerialPort;

/// Longest inbound frame accepted before the line is treated as garbage.
pub const MAX_FRAME_BYTES: usize = 256;

/// Line-oriented transport shared by the real port and test fakes.
pub trait LineIo {
    /// Write one frame; the transport appends CRLF and flushes.
    fn send_command_line(&mut self, line: &str) -> Result<()>;
    /// Read one frame into `line_buffer` without its terminator. Returns 0 on timeout.
    fn read_message_line(&mut self, line_buffer: &mut String) -> Result<usize>;
    /// Release the device. Writes after close are silently discarded.
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FlowControlMode {
    #[default]
    None,
    Software,
    Hardware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ParityMode {
    #[default]
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StopBitsMode {
    #[default]
    One,
    Two,
}

/// What to do with the DTR line when the port opens. Some TFT boards reset on DTR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DtrBehavior {
    #[default]
    Preserve,
    Assert,
    Deassert,
}

impl FromStr for FlowControlMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "software" | "xonxoff" => Ok(Self::Software),
            "hardware" | "rtscts" => Ok(Self::Hardware),
            other => Err(format!(
                "unknown flow control '{other}' (expected none, software or hardware)"
            )),
        }
    }
}

impl fmt::Display for FlowControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Software => "software",
            Self::Hardware => "hardware",
        })
    }
}

impl FromStr for ParityMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "odd" => Ok(Self::Odd),
            "even" => Ok(Self::Even),
            other => Err(format!(
                "unknown parity '{other}' (expected none, odd or even)"
            )),
        }
    }
}

impl fmt::Display for ParityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Odd => "odd",
            Self::Even => "even",
        })
    }
}

impl FromStr for StopBitsMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "1" => Ok(Self::One),
            "2" => Ok(Self::Two),
            other => Err(format!("unknown stop bits '{other}' (expected 1 or 2)")),
        }
    }
}

impl fmt::Display for StopBitsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::One => "1",
            Self::Two => "2",
        })
    }
}

impl FromStr for DtrBehavior {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "preserve" => Ok(Self::Preserve),
            "assert" | "on" => Ok(Self::Assert),
            "deassert" | "off" => Ok(Self::Deassert),
            other => Err(format!(
                "unknown dtr behavior '{other}' (expected preserve, assert or deassert)"
            )),
        }
    }
}

impl fmt::Display for DtrBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Preserve => "preserve",
            Self::Assert => "assert",
            Self::Deassert => "deassert",
        })
    }
}

macro_rules! string_serde {
    ($($ty:ty),*) => {
        $(
            impl TryFrom<String> for $ty {
                type Error = String;

                fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
                    value.parse()
                }
            }

            impl From<$ty> for String {
                fn from(value: $ty) -> Self {
                    value.to_string()
                }
            }
        )*
    };
}

string_serde!(FlowControlMode, ParityMode, StopBitsMode, DtrBehavior);

/// Line settings applied when the port opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialOptions {
    pub baud: u32,
    pub flow_control: FlowControlMode,
    pub parity: ParityMode,
    pub stop_bits: StopBitsMode,
    pub dtr: DtrBehavior,
    pub timeout_ms: u64,
}

impl Default for SerialOptions {
    fn default() -> Self {
        Self {
            baud: crate::config::DEFAULT_BAUD,
            flow_control: FlowControlMode::default(),
            parity: ParityMode::default(),
            stop_bits: StopBitsMode::default(),
            dtr: DtrBehavior::default(),
            timeout_ms: crate::config::DEFAULT_SERIAL_TIMEOUT_MS,
        }
    }
}
