//! Alicat mass flow controller on an RS-232 multidrop bus.
//!
//! Each controller answers to a single-letter unit id. Polling is just
//! the id followed by `\r`; the reply is one whitespace-separated data
//! frame (pressure, temperature, volumetric and mass flow, set point,
//! gas). Set points are written as `<id><counts>\r` where counts scale
//! 0..=100 sccm onto 0..=64000.

use std::io::{self, Read, Write};

use log::warn;

use crate::error::{LabError, Result};

/// Full-scale flow of the lab's controllers, in sccm.
pub const FULL_SCALE_SCCM: f64 = 100.0;

/// Set point counts corresponding to full scale.
const FULL_SCALE_COUNTS: f64 = 64_000.0;

/// Flow controller driver owning its serial port.
///
/// Generic over the port for the in-memory protocol tests;
/// [`FlowController::open`] supplies the real port.
pub struct FlowController<P: Read + Write + Send> {
    port: P,
    unit: char,
}

#[cfg(feature = "serial")]
impl FlowController<Box<dyn serialport::SerialPort>> {
    /// Opens the bus port at 19200 Bd 8N1 for the controller with the
    /// given unit id.
    pub fn open(path: &str, unit: char, timeout: std::time::Duration) -> Result<Self> {
        let port = serialport::new(path, 19_200)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| LabError::Connection {
                target: path.to_string(),
                source: e.into(),
            })?;
        Ok(Self::from_port(port, unit))
    }
}

impl<P: Read + Write + Send> FlowController<P> {
    /// Wraps an already-open port.
    pub fn from_port(port: P, unit: char) -> Self {
        Self { port, unit }
    }

    /// Polls the controller and returns the fields of its data frame.
    pub fn poll(&mut self) -> Result<Vec<String>> {
        self.port.write_all(format!("{}\r", self.unit).as_bytes())?;
        self.read_frame()
    }

    /// Sets the flow set point in sccm, clamped to 0..=100, and returns
    /// the data frame the controller echoes back.
    pub fn set_flow(&mut self, sccm: f64) -> Result<Vec<String>> {
        let clamped = sccm.clamp(0.0, FULL_SCALE_SCCM);
        if clamped != sccm {
            warn!("flow set point {sccm} sccm outside range, clamped to {clamped} sccm");
        }
        let counts = (clamped * FULL_SCALE_COUNTS / FULL_SCALE_SCCM) as i64;
        self.port
            .write_all(format!("{}{}\r", self.unit, counts).as_bytes())?;
        self.read_frame()
    }

    /// Reads one `\r`-terminated frame and splits it on whitespace.
    fn read_frame(&mut self) -> Result<Vec<String>> {
        let mut frame = Vec::new();
        let mut byte = [0u8; 1];
        while !frame.ends_with(b"\r") {
            match self.port.read(&mut byte) {
                Ok(0) => {
                    return Err(LabError::Transport(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "port returned end of stream mid-frame",
                    )))
                }
                Ok(_) => frame.push(byte[0]),
                Err(e) => return Err(LabError::Transport(e)),
            }
        }
        Ok(String::from_utf8_lossy(&frame)
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }
}
