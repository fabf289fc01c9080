//! RS-232 transport for serial-attached instruments.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::debug;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::{LabError, Result};
use crate::visa::Instrument;

/// Instrument handle over a serial port.
///
/// Commands are framed with `"\r"` by default. `read` accumulates one byte
/// at a time until the accumulated tail equals the termination sequence, so
/// the reply length never needs to be known up front. A device that goes
/// silent mid-reply surfaces the port's timed-out read as
/// [`LabError::Transport`]; a device that keeps trickling bytes without
/// ever terminating keeps the loop alive, which is the caller's cue to pick
/// a sane port timeout.
///
/// The type is generic over the port so the framing logic can run against
/// any `Read + Write` stream; [`SerialInstrument::open`] supplies the real
/// port at the fixed lab default of 9600 Bd, eight data bits, two stop
/// bits, no parity, no flow control.
pub struct SerialInstrument<P: Read + Write + Send = Box<dyn SerialPort>> {
    port: Option<P>,
    term: Vec<u8>,
}

impl SerialInstrument<Box<dyn SerialPort>> {
    /// Opens `path` at the default port configuration with the given read
    /// timeout.
    pub fn open(path: &str, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, 9600)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::Two)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| LabError::Connection {
                target: path.to_string(),
                source: e.into(),
            })?;
        debug!("opened serial port {path} at 9600 Bd");
        Ok(Self::from_port(port))
    }
}

impl<P: Read + Write + Send> SerialInstrument<P> {
    /// Wraps an already-open port with the default `"\r"` framing.
    pub fn from_port(port: P) -> Self {
        Self {
            port: Some(port),
            term: b"\r".to_vec(),
        }
    }
}

impl<P: Read + Write + Send> Instrument for SerialInstrument<P> {
    fn write(&mut self, command: &str) -> Result<()> {
        let port = self.port.as_mut().ok_or(LabError::NotConnected)?;
        let mut payload = Vec::with_capacity(command.len() + self.term.len());
        payload.extend_from_slice(command.as_bytes());
        payload.extend_from_slice(&self.term);
        port.write_all(&payload)?;
        Ok(())
    }

    fn read(&mut self) -> Result<String> {
        let port = self.port.as_mut().ok_or(LabError::NotConnected)?;
        let mut message: Vec<u8> = Vec::new();
        let mut byte = [0u8; 1];
        while !message.ends_with(&self.term) {
            match port.read(&mut byte) {
                Ok(0) => {
                    return Err(LabError::Transport(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "port returned end of stream mid-reply",
                    )))
                }
                Ok(_) => message.push(byte[0]),
                Err(e) => return Err(LabError::Transport(e)),
            }
        }
        let reply = &message[..message.len() - self.term.len()];
        Ok(String::from_utf8_lossy(reply).trim_end().to_string())
    }

    fn set_termination(&mut self, term: &[u8]) -> Result<()> {
        self.term = term.to_vec();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the port releases the device node.
        self.port.take();
        Ok(())
    }
}
