//! Scientific Magnetics / Twickenham superconducting magnet controller
//! (SMC 5.52).
//!
//! Reference: SMC operating manual, `smc552+.pdf`.
//!
//! Commands are single letters with fixed-width numeric fields; the
//! controller echoes a status line for every command, so setters read
//! and discard one reply. Replies to `G` (output) and `S` (set points)
//! carry their values at fixed column positions.

use log::warn;

use crate::error::{LabError, Result};
use crate::visa::Instrument;

/// Conversion factor of the lab's magnet, in amperes per tesla.
pub const DEFAULT_AMPS_PER_TESLA: f64 = 9.755555;

/// Highest field the magnet may be driven to, in tesla.
pub const MAX_FIELD_TESLA: f64 = 10.0;

/// Fastest allowed ramp, in tesla per second.
pub const MAX_RAMP_TESLA_PER_SECOND: f64 = 0.006;

/// Unit the controller displays and accepts set points in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUnit {
    /// Amperes through the coil.
    Amps = 0,
    /// Tesla at the field center.
    Tesla = 1,
}

/// Target of the `R` ramp command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampTarget {
    /// Ramp the output to zero.
    Zero = 0,
    /// Ramp to the lower set point.
    Lower = 1,
    /// Ramp to the upper set point.
    Upper = 2,
}

/// Current direction through the coil.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Positive field.
    Forward = 0,
    /// Negative field.
    Reverse = 1,
}

/// Decoded `S` reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetPoints {
    /// Unit the set points are expressed in.
    pub unit: FieldUnit,
    /// Upper set point.
    pub upper: f64,
    /// Lower set point.
    pub lower: f64,
}

/// SMC driver over any transport.
pub struct Smc<I: Instrument> {
    smc: I,
    unit: FieldUnit,
    amps_per_tesla: f64,
}

impl<I: Instrument> Smc<I> {
    /// Wraps an open transport handle using the lab magnet's
    /// [`DEFAULT_AMPS_PER_TESLA`] calibration.
    pub fn new(device: I) -> Result<Self> {
        Self::with_amps_per_tesla(device, DEFAULT_AMPS_PER_TESLA)
    }

    /// Wraps an open transport handle with an explicit coil calibration
    /// and brings the controller into a known state: ampere display,
    /// unpaused, forward, 0.005 T/s ramp rate.
    pub fn with_amps_per_tesla(mut device: I, amps_per_tesla: f64) -> Result<Self> {
        device.set_termination(b"\r\n")?;
        let mut smc = Self {
            smc: device,
            unit: FieldUnit::Amps,
            amps_per_tesla,
        };
        smc.set_unit(FieldUnit::Amps)?;
        smc.set_pause(false)?;
        smc.set_direction(Direction::Forward)?;
        smc.set_ramp_rate_tesla(0.005)?;
        Ok(smc)
    }

    /// Echo-discarding command write.
    fn command(&mut self, command: &str) -> Result<()> {
        self.smc.ask(command)?;
        Ok(())
    }

    /// Selects whether set points are in amperes or tesla.
    pub fn set_unit(&mut self, unit: FieldUnit) -> Result<()> {
        self.command(&format!("T{}", unit as i32))?;
        self.unit = unit;
        Ok(())
    }

    /// Pauses or resumes ramping.
    pub fn set_pause(&mut self, paused: bool) -> Result<()> {
        self.command(&format!("P{}", i32::from(paused)))
    }

    /// Sets the current direction. Only change this at zero field.
    pub fn set_direction(&mut self, direction: Direction) -> Result<()> {
        self.command(&format!("D{}", direction as i32))
    }

    /// Selects what the controller ramps towards.
    pub fn set_ramp_target(&mut self, target: RampTarget) -> Result<()> {
        self.command(&format!("R{}", target as i32))
    }

    /// Sets the ramp rate in tesla per second, clamped to the magnet's
    /// [`MAX_RAMP_TESLA_PER_SECOND`]. The controller itself takes the
    /// rate in amperes per second.
    pub fn set_ramp_rate_tesla(&mut self, tesla_per_second: f64) -> Result<()> {
        let tesla_per_second = if tesla_per_second.abs() > MAX_RAMP_TESLA_PER_SECOND {
            let clamped = MAX_RAMP_TESLA_PER_SECOND.copysign(tesla_per_second);
            warn!("ramp rate {tesla_per_second} T/s beyond magnet limit, clamped to {clamped} T/s");
            clamped
        } else {
            tesla_per_second
        };
        self.set_ramp_rate_amps(tesla_per_second * self.amps_per_tesla)
    }

    /// Sets the ramp rate in amperes per second.
    pub fn set_ramp_rate_amps(&mut self, amps_per_second: f64) -> Result<()> {
        let limit = MAX_RAMP_TESLA_PER_SECOND * self.amps_per_tesla;
        let amps_per_second = if amps_per_second.abs() > limit {
            let clamped = limit.copysign(amps_per_second);
            warn!("ramp rate {amps_per_second} A/s beyond magnet limit, clamped to {clamped} A/s");
            clamped
        } else {
            amps_per_second
        };
        self.command(&format!("A{amps_per_second:08.5}"))
    }

    /// Magnet output in amperes, read from the `G` status line.
    pub fn amps(&mut self) -> Result<f64> {
        let reply = self.smc.ask("G")?;
        parse_columns(&reply, 1, 9)
    }

    /// Magnet output in tesla.
    pub fn tesla(&mut self) -> Result<f64> {
        Ok(self.amps()? / self.amps_per_tesla)
    }

    /// Reads both set points from the `S` status line.
    pub fn set_points(&mut self) -> Result<SetPoints> {
        let reply = self.smc.ask("S")?;
        let unit = match reply.as_bytes().get(1) {
            Some(b'0') => FieldUnit::Amps,
            Some(b'1') => FieldUnit::Tesla,
            _ => {
                return Err(LabError::ReplyParse {
                    reply,
                    expected: "unit digit at column 1",
                })
            }
        };
        let upper = parse_columns(&reply, 3, 10)?;
        let lower = parse_columns(&reply, 11, 18)?;
        Ok(SetPoints { unit, upper, lower })
    }

    /// Sets the upper set point in the active unit. The sign picks the
    /// current direction.
    pub fn set_upper_set_point(&mut self, value: f64) -> Result<()> {
        self.checked_set_point(value)?;
        self.command(&self.format_set_point('U', value))?;
        self.set_direction_for(value)
    }

    /// Sets the lower set point in the active unit, pausing the ramp
    /// first. The sign picks the current direction.
    pub fn set_lower_set_point(&mut self, value: f64) -> Result<()> {
        self.checked_set_point(value)?;
        self.set_pause(true)?;
        self.command(&self.format_set_point('L', value))?;
        self.set_direction_for(value)
    }

    /// Releases the transport handle.
    pub fn into_inner(self) -> I {
        self.smc
    }

    fn checked_set_point(&self, value: f64) -> Result<()> {
        let limit = match self.unit {
            FieldUnit::Amps => MAX_FIELD_TESLA * self.amps_per_tesla,
            FieldUnit::Tesla => MAX_FIELD_TESLA,
        };
        if value.abs() >= limit {
            return Err(LabError::InvalidInput(format!(
                "set point {value} beyond the magnet's limit of {limit}"
            )));
        }
        Ok(())
    }

    fn format_set_point(&self, letter: char, value: f64) -> String {
        match self.unit {
            FieldUnit::Amps => format!("{letter}{value:07.3}"),
            FieldUnit::Tesla => format!("{letter}{value:07.4}"),
        }
    }

    fn set_direction_for(&mut self, value: f64) -> Result<()> {
        if value >= 0.0 {
            self.set_direction(Direction::Forward)
        } else {
            self.set_direction(Direction::Reverse)
        }
    }
}

/// Parses the float between two byte columns of a status line.
fn parse_columns(reply: &str, start: usize, end: usize) -> Result<f64> {
    reply
        .get(start..end)
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| LabError::ReplyParse {
            reply: reply.to_string(),
            expected: "numeric field at fixed columns",
        })
}
