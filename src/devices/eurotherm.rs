//! Eurotherm Mini8 multi-loop PID controller on Modbus RTU.
//!
//! The controller is slave 1 at 19200 Bd. Everything of interest lives
//! in signed two-decimal holding registers: eight thermocouple inputs
//! at fixed addresses and one 256-register block per control loop.
//!
//! | Register         | Meaning                          |
//! |------------------|----------------------------------|
//! | 4228..4239       | thermocouple inputs (with gaps)  |
//! | n*256 + 1        | loop n process value             |
//! | n*256 + 2        | loop n target set point (r/w)    |
//! | n*256 + 4        | loop n active output, percent    |
//! | n*256 + 5        | loop n working set point         |

use std::io::{Read, Write};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{LabError, Result};
use crate::modbus::RtuMaster;

/// Holding registers of the eight thermocouple inputs.
pub const TEMPERATURE_REGISTERS: [u16; 8] = [4228, 4229, 4230, 4231, 4236, 4237, 4238, 4239];

/// Modbus slave address of the controller.
pub const SLAVE: u8 = 1;

const DECIMALS: u8 = 2;

/// Mini8 driver sharing one RTU master between the temperature inputs
/// and any number of [`ControlLoop`] handles.
pub struct Mini8<P: Read + Write + Send> {
    master: Arc<Mutex<RtuMaster<P>>>,
}

#[cfg(feature = "serial")]
impl Mini8<Box<dyn serialport::SerialPort>> {
    /// Opens the controller's bus at 19200 Bd.
    pub fn open(path: &str, timeout: std::time::Duration) -> Result<Self> {
        Ok(Self::from_master(RtuMaster::open(
            path, SLAVE, 19_200, timeout,
        )?))
    }
}

impl<P: Read + Write + Send> Mini8<P> {
    /// Wraps an already-open RTU master.
    pub fn from_master(master: RtuMaster<P>) -> Self {
        Self {
            master: Arc::new(Mutex::new(master)),
        }
    }

    /// Reads thermocouple input 0..=7, in degrees Celsius.
    pub fn temperature(&self, sensor: usize) -> Result<f64> {
        let register = *TEMPERATURE_REGISTERS
            .get(sensor)
            .ok_or(LabError::ChannelOutOfRange {
                channel: sensor,
                max: TEMPERATURE_REGISTERS.len() - 1,
            })?;
        self.lock().read_register(register, DECIMALS, true)
    }

    /// Hands out a view of control loop 0..=7. Loops share the bus with
    /// each other and the temperature inputs.
    pub fn control_loop(&self, number: u16) -> Result<ControlLoop<P>> {
        if number > 7 {
            return Err(LabError::ChannelOutOfRange {
                channel: usize::from(number),
                max: 7,
            });
        }
        Ok(ControlLoop {
            master: Arc::clone(&self.master),
            base: number * 256,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RtuMaster<P>> {
        self.master.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One PID loop of the Mini8.
pub struct ControlLoop<P: Read + Write + Send> {
    master: Arc<Mutex<RtuMaster<P>>>,
    base: u16,
}

impl<P: Read + Write + Send> ControlLoop<P> {
    fn lock(&self) -> std::sync::MutexGuard<'_, RtuMaster<P>> {
        self.master.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Measured process value, in degrees Celsius.
    pub fn process_value(&self) -> Result<f64> {
        self.lock().read_register(self.base + 1, DECIMALS, true)
    }

    /// Programmed target set point.
    pub fn target_set_point(&self) -> Result<f64> {
        self.lock().read_register(self.base + 2, DECIMALS, true)
    }

    /// Writes the target set point.
    pub fn set_target_set_point(&self, value: f64) -> Result<()> {
        self.lock().write_register(self.base + 2, value, DECIMALS, true)
    }

    /// Output power the loop is currently driving, in percent.
    pub fn active_output(&self) -> Result<f64> {
        self.lock().read_register(self.base + 4, DECIMALS, true)
    }

    /// Set point the ramp generator is tracking right now.
    pub fn working_set_point(&self) -> Result<f64> {
        self.lock().read_register(self.base + 5, DECIMALS, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crc::{Crc, CRC_16_MODBUS};
    use std::collections::VecDeque;
    use std::io;

    const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

    struct FakeBus {
        replies: VecDeque<Vec<u8>>,
        pending: Vec<u8>,
        requests: Vec<Vec<u8>>,
    }

    impl FakeBus {
        fn scripted(replies: &[&[u8]]) -> Self {
            Self {
                replies: replies.iter().map(|body| framed(body)).collect(),
                pending: Vec::new(),
                requests: Vec::new(),
            }
        }
    }

    fn framed(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend_from_slice(&CRC.checksum(body).to_le_bytes());
        frame
    }

    impl Read for FakeBus {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pending.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply"));
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }
    }

    impl Write for FakeBus {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.requests.push(buf.to_vec());
            if let Some(reply) = self.replies.pop_front() {
                self.pending = reply;
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn requests(mini8: &Mini8<FakeBus>) -> Vec<Vec<u8>> {
        mini8.lock().port_ref().requests.clone()
    }

    #[test]
    fn test_temperature_reads_the_sensor_register() {
        // 2345 raw with two decimals is 23.45 C.
        let bus = FakeBus::scripted(&[&[0x01, 0x03, 0x02, 0x09, 0x29]]);
        let mini8 = Mini8::from_master(RtuMaster::from_port(bus, SLAVE));
        assert!((mini8.temperature(0).expect("read") - 23.45).abs() < 1e-9);
        // Register 4228 is 0x1084.
        assert_eq!(&requests(&mini8)[0][..6], &[0x01, 0x03, 0x10, 0x84, 0x00, 0x01]);
    }

    #[test]
    fn test_sensor_index_is_checked() {
        let bus = FakeBus::scripted(&[]);
        let mini8 = Mini8::from_master(RtuMaster::from_port(bus, SLAVE));
        assert!(matches!(
            mini8.temperature(8),
            Err(LabError::ChannelOutOfRange { channel: 8, max: 7 })
        ));
    }

    #[test]
    fn test_loop_registers_are_offset_from_base() {
        let bus = FakeBus::scripted(&[&[0x01, 0x03, 0x02, 0x00, 0x64]]);
        let mini8 = Mini8::from_master(RtuMaster::from_port(bus, SLAVE));
        let pid = mini8.control_loop(1).expect("loop");
        assert!((pid.process_value().expect("read") - 1.0).abs() < 1e-9);
        // Loop 1 process value is register 257.
        assert_eq!(&requests(&mini8)[0][..6], &[0x01, 0x03, 0x01, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_set_point_write_scales_two_decimals() {
        let bus = FakeBus::scripted(&[&[0x01, 0x10, 0x01, 0x02, 0x00, 0x01]]);
        let mini8 = Mini8::from_master(RtuMaster::from_port(bus, SLAVE));
        let pid = mini8.control_loop(1).expect("loop");
        pid.set_target_set_point(25.0).expect("write");
        // 25.00 C scales to 2500 = 0x09C4 in register 258.
        assert_eq!(
            &requests(&mini8)[0][..9],
            &[0x01, 0x10, 0x01, 0x02, 0x00, 0x01, 0x02, 0x09, 0xC4]
        );
    }

    #[test]
    fn test_loop_number_is_checked() {
        let bus = FakeBus::scripted(&[]);
        let mini8 = Mini8::from_master(RtuMaster::from_port(bus, SLAVE));
        assert!(matches!(
            mini8.control_loop(8),
            Err(LabError::ChannelOutOfRange { channel: 8, max: 7 })
        ));
    }
}
