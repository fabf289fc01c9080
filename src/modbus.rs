//! Minimal blocking Modbus RTU master.
//!
//! Implements the two function codes the lab's PID rack needs: read
//! holding registers (0x03) and preset multiple registers (0x10), one
//! register at a time, with the fixed-decimal scaling convention the
//! device documentation uses (a register holding `2350` with two decimals
//! reads as `23.50`).
//!
//! ## Frame layout
//!
//! | Direction | Bytes                                                    |
//! |-----------|----------------------------------------------------------|
//! | request   | slave, function, payload…, CRC lo, CRC hi                |
//! | reply     | slave, function, payload…, CRC lo, CRC hi                |
//! | exception | slave, function \| 0x80, code, CRC lo, CRC hi            |
//!
//! The checksum is CRC-16/MODBUS over everything before the trailer,
//! transmitted low byte first. Replies are read in lockstep right after
//! each request; there is no pipelining, so the port's read timeout is the
//! only pacing this master needs.

use std::io::{Read, Write};
use std::time::Duration;

use crc::{Crc, CRC_16_MODBUS};
use log::debug;

use crate::error::{LabError, Result};

const MODBUS_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

const READ_HOLDING: u8 = 0x03;
const WRITE_MULTIPLE: u8 = 0x10;

/// Blocking single-master RTU endpoint over any byte stream.
///
/// Generic over the port for the same reason as the serial transport: the
/// framing logic tests against an in-memory bus, while [`RtuMaster::open`]
/// supplies a real serial port.
pub struct RtuMaster<P: Read + Write + Send> {
    port: P,
    slave: u8,
}

#[cfg(feature = "serial")]
impl RtuMaster<Box<dyn serialport::SerialPort>> {
    /// Opens `path` at `baud` 8N1 and addresses `slave`.
    pub fn open(path: &str, slave: u8, baud: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud)
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
        debug!("opened Modbus RTU port {path} at {baud} Bd, slave {slave}");
        Ok(Self::from_port(port, slave))
    }
}

impl<P: Read + Write + Send> RtuMaster<P> {
    /// Wraps an already-open port.
    pub fn from_port(port: P, slave: u8) -> Self {
        Self { port, slave }
    }

    /// Read access to the underlying port.
    pub fn port_ref(&self) -> &P {
        &self.port
    }

    /// Reads one holding register and scales it by `10^-decimals`,
    /// interpreting the raw value as two's complement when `signed`.
    pub fn read_register(&mut self, address: u16, decimals: u8, signed: bool) -> Result<f64> {
        let mut request = vec![self.slave, READ_HOLDING];
        request.extend_from_slice(&address.to_be_bytes());
        request.extend_from_slice(&1u16.to_be_bytes());

        let payload = self.transact(&request, READ_HOLDING)?;
        // payload: byte count, register hi, register lo
        if payload.len() != 3 || payload[0] != 2 {
            return Err(LabError::ModbusFrame(format!(
                "unexpected read payload {payload:02x?}"
            )));
        }
        let raw = u16::from_be_bytes([payload[1], payload[2]]);
        let value = if signed {
            f64::from(raw as i16)
        } else {
            f64::from(raw)
        };
        Ok(value / 10f64.powi(i32::from(decimals)))
    }

    /// Scales `value` by `10^decimals`, rounds, and writes it to one
    /// holding register. Values that do not fit the register after scaling
    /// are rejected rather than wrapped.
    pub fn write_register(
        &mut self,
        address: u16,
        value: f64,
        decimals: u8,
        signed: bool,
    ) -> Result<()> {
        let scaled = (value * 10f64.powi(i32::from(decimals))).round();
        let raw: u16 = if signed {
            if scaled < f64::from(i16::MIN) || scaled > f64::from(i16::MAX) {
                return Err(LabError::InvalidInput(format!(
                    "{value} does not fit a signed register with {decimals} decimals"
                )));
            }
            (scaled as i16) as u16
        } else {
            if scaled < 0.0 || scaled > f64::from(u16::MAX) {
                return Err(LabError::InvalidInput(format!(
                    "{value} does not fit a register with {decimals} decimals"
                )));
            }
            scaled as u16
        };

        let mut request = vec![self.slave, WRITE_MULTIPLE];
        request.extend_from_slice(&address.to_be_bytes());
        request.extend_from_slice(&1u16.to_be_bytes());
        request.push(2);
        request.extend_from_slice(&raw.to_be_bytes());

        let payload = self.transact(&request, WRITE_MULTIPLE)?;
        // payload: address hi/lo, count hi/lo as echoed by the slave
        if payload.len() != 4 {
            return Err(LabError::ModbusFrame(format!(
                "unexpected write acknowledgement {payload:02x?}"
            )));
        }
        Ok(())
    }

    /// Sends `request` (without trailer) and returns the reply payload
    /// between the function byte and the checksum.
    fn transact(&mut self, request: &[u8], function: u8) -> Result<Vec<u8>> {
        let mut frame = request.to_vec();
        frame.extend_from_slice(&MODBUS_CRC.checksum(request).to_le_bytes());
        self.port.write_all(&frame)?;

        // Reply header: slave and function, then either an exception code
        // or a function-specific body.
        let mut head = [0u8; 2];
        self.port.read_exact(&mut head)?;
        let mut reply = head.to_vec();

        if head[1] & 0x80 != 0 {
            let mut rest = [0u8; 3];
            self.port.read_exact(&mut rest)?;
            reply.extend_from_slice(&rest);
            self.verify(&reply)?;
            return Err(LabError::ModbusException {
                slave: head[0],
                code: rest[0],
            });
        }

        let body_len = match head[1] {
            READ_HOLDING => {
                let mut count = [0u8; 1];
                self.port.read_exact(&mut count)?;
                reply.push(count[0]);
                usize::from(count[0]) + 2
            }
            WRITE_MULTIPLE => 4 + 2,
            other => {
                return Err(LabError::ModbusFrame(format!(
                    "reply for unrequested function {other:#04x}"
                )))
            }
        };
        let mut body = vec![0u8; body_len];
        self.port.read_exact(&mut body)?;
        reply.extend_from_slice(&body);

        self.verify(&reply)?;
        if head[0] != self.slave {
            return Err(LabError::ModbusFrame(format!(
                "reply from slave {}, expected {}",
                head[0], self.slave
            )));
        }
        if head[1] != function {
            return Err(LabError::ModbusFrame(format!(
                "reply for function {:#04x}, expected {function:#04x}",
                head[1]
            )));
        }
        Ok(reply[2..reply.len() - 2].to_vec())
    }

    /// Checks the CRC trailer of a complete reply frame.
    fn verify(&self, reply: &[u8]) -> Result<()> {
        if reply.len() < 4 {
            return Err(LabError::ModbusFrame("reply too short".to_string()));
        }
        let (data, trailer) = reply.split_at(reply.len() - 2);
        let expected = MODBUS_CRC.checksum(data);
        let received = u16::from_le_bytes([trailer[0], trailer[1]]);
        if expected != received {
            return Err(LabError::CrcMismatch { expected, received });
        }
        Ok(())
    }
}
