use crate::{Error, Result};
use std::collections::VecDeque;

use super::LineIo;

/// Scripted line transport used by tests in place of a real TFT.
#[derive(Default)]
pub struct FakeSerialPort {
    script: VecDeque<Result<String>>,
    writes: Vec<String>,
    fail_writes: bool,
    closed: bool,
}

impl FakeSerialPort {
    pub fn new(script: Vec<Result<String>>) -> Self {
        Self {
            script: script.into(),
            ..Self::default()
        }
    }

    /// Queue another inbound line after construction.
    pub fn push_line(&mut self, line: impl Into<String>) {
        self.script.push_back(Ok(line.into()));
    }

    /// Make every subsequent write fail as if the cable was pulled.
    pub fn fail_writes(&mut self) {
        self.fail_writes = true;
    }

    pub fn writes(&self) -> &[String] {
        &self.writes
    }

    /// Hand back everything written so far and start a fresh record.
    pub fn take_writes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.writes)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl LineIo for FakeSerialPort {
    fn send_command_line(&mut self, line: &str) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.fail_writes {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "fake port unplugged",
            )));
        }
        self.writes.push(line.to_string());
        Ok(())
    }

    fn read_message_line(&mut self, line_buffer: &mut String) -> Result<usize> {
        match self.script.pop_front() {
            Some(Ok(line)) => {
                *line_buffer = line;
                Ok(line_buffer.len())
            }
            Some(Err(e)) => Err(e),
            None => Ok(0),
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
