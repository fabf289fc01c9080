//! Pfeiffer TPG361 single gauge pressure controller.
//!
//! The controller uses a three-step handshake over RS-232 at 115200 Bd:
//!
//! 1. host sends the mnemonic terminated with `\r\n`,
//! 2. controller answers with an ACK (`0x06`) or NAK (`0x15`) line,
//! 3. on ACK the host sends ENQ (`0x05`) and reads the data line.
//!
//! Pressure replies are `<state>,<value>` with the gauge state codes of
//! [`GaugeState`].

use std::io::{self, Read, Write};

use prse::try_parse;

use crate::error::{LabError, Result};

const ENQ: u8 = 0x05;
const ACK: u8 = 0x06;
const NAK: u8 = 0x15;

/// Gauge status codes reported in front of every pressure value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaugeState {
    /// Measurement data okay.
    Okay = 0,
    /// Pressure below measurement range.
    Underrange = 1,
    /// Pressure above measurement range.
    Overrange = 2,
    /// Sensor error.
    SensorError = 3,
    /// Sensor switched off.
    GaugeInactive = 4,
    /// No sensor connected.
    NoGauge = 5,
    /// Identification error.
    IdError = 6,
}

impl GaugeState {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Okay),
            1 => Some(Self::Underrange),
            2 => Some(Self::Overrange),
            3 => Some(Self::SensorError),
            4 => Some(Self::GaugeInactive),
            5 => Some(Self::NoGauge),
            6 => Some(Self::IdError),
            _ => None,
        }
    }
}

/// TPG361 driver owning its serial port.
///
/// Generic over the port so the handshake can be tested against an
/// in-memory script; [`Tpg361::open`] supplies the real port.
pub struct Tpg361<P: Read + Write + Send> {
    port: P,
}

#[cfg(feature = "serial")]
impl Tpg361<Box<dyn serialport::SerialPort>> {
    /// Opens the controller's serial port at 115200 Bd 8N1.
    pub fn open(path: &str, timeout: std::time::Duration) -> Result<Self> {
        let port = serialport::new(path, 115_200)
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
        Ok(Self::from_port(port))
    }
}

impl<P: Read + Write + Send> Tpg361<P> {
    /// Wraps an already-open port.
    pub fn from_port(port: P) -> Self {
        Self { port }
    }

    /// Runs the mnemonic/ACK/ENQ handshake and returns the data line.
    pub fn transact(&mut self, mnemonic: &str) -> Result<String> {
        self.port.write_all(mnemonic.as_bytes())?;
        self.port.write_all(b"\r\n")?;

        let status = self.read_line()?;
        match status.first() {
            Some(&ACK) => {
                self.port.write_all(&[ENQ])?;
                let data = self.read_line()?;
                Ok(String::from_utf8_lossy(&data).trim().to_string())
            }
            Some(&NAK) => Err(LabError::Device(format!(
                "controller rejected '{mnemonic}'"
            ))),
            _ => Err(LabError::ReplyParse {
                reply: String::from_utf8_lossy(&status).into_owned(),
                expected: "an ACK or NAK line",
            }),
        }
    }

    /// Reads gauge 1 or 2. Returns the gauge state alongside the
    /// pressure in millibar; callers decide whether a non-okay state is
    /// fatal for their measurement.
    pub fn pressure(&mut self, gauge: usize) -> Result<(GaugeState, f64)> {
        if !(1..=2).contains(&gauge) {
            return Err(LabError::ChannelOutOfRange {
                channel: gauge,
                max: 2,
            });
        }
        let reply = self.transact(&format!("PR{gauge}"))?;
        let (code, value): (u8, f64) =
            try_parse!(reply.as_str(), "{},{}").map_err(|_| LabError::ReplyParse {
                reply: reply.clone(),
                expected: "state,value",
            })?;
        let state = GaugeState::from_code(code).ok_or(LabError::ReplyParse {
            reply,
            expected: "gauge state 0..=6",
        })?;
        Ok((state, value))
    }

    /// One byte at a time until LF, like every line this controller
    /// sends.
    fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        while !line.ends_with(b"\n") {
            match self.port.read(&mut byte) {
                Ok(0) => {
                    return Err(LabError::Transport(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "port returned end of stream mid-reply",
                    )))
                }
                Ok(_) => line.push(byte[0]),
                Err(e) => return Err(LabError::Transport(e)),
            }
        }
        Ok(line)
    }
}
