//! Oxford Instruments cryostat electronics.
//!
//! Covers the ITC503 temperature controller and the ILM level meter.
//! Both speak the ISOBUS dialect: commands open with `@` and the ISOBUS
//! address, replies echo the command letter in front of the value, and
//! every message ends with a bare `\r`.
//!
//! | Command      | Meaning                                  |
//! |--------------|------------------------------------------|
//! | `@0R<n>`     | read sensor `n` (ITC is ISOBUS address 0)|
//! | `@0T<temp>`  | temperature set point                    |
//! | `@0C<mode>`  | local/remote control mode                |
//! | `@0S<n>`     | stop (0) or start (1) a sweep            |
//! | `@0x/y/s`    | sweep table step, field, value           |
//! | `@6R1`       | helium level (ILM is ISOBUS address 6)   |

use std::fmt::Display;

use log::warn;

use crate::error::{LabError, Result};
use crate::visa::Instrument;

/// Highest temperature the controller accepts as a set point, in kelvin.
pub const MAX_SET_POINT: f64 = 299.0;

/// Longest sweep or hold duration the sweep table accepts, in minutes.
pub const MAX_SWEEP_MINUTES: f64 = 1399.0;

/// Strips the echoed command letter and parses the remaining digits.
fn parse_reading(reply: &str) -> Result<f64> {
    reply
        .get(1..)
        .unwrap_or_default()
        .trim()
        .parse()
        .map_err(|_| LabError::ReplyParse {
            reply: reply.to_string(),
            expected: "numeric field after the status character",
        })
}

/// Renders a numeric field the way the controller wants it: at most five
/// characters, truncated rather than rounded past that.
fn field(value: f64) -> String {
    let mut text = format!("{value:.2}");
    text.truncate(5);
    text
}

fn clamp(quantity: &str, value: f64, min: f64, max: f64, unit: impl Display) -> f64 {
    if value < min {
        warn!("{quantity} {value} {unit} below range, clamped to {min} {unit}");
        min
    } else if value > max {
        warn!("{quantity} {value} {unit} above range, clamped to {max} {unit}");
        max
    } else {
        value
    }
}

/// Oxford ITC503 intelligent temperature controller.
///
/// Sensor readings go through a bus clear first; the controller is known
/// to wedge its reply buffer when a previous transaction was cut short.
pub struct Itc503<I: Instrument> {
    itc: I,
}

impl<I: Instrument> Itc503<I> {
    /// Wraps an open transport handle and switches it to `\r` framing.
    pub fn new(mut device: I) -> Result<Self> {
        device.set_termination(b"\r")?;
        Ok(Self { itc: device })
    }

    /// Reads one of the three temperature sensors, in kelvin.
    pub fn temperature(&mut self, sensor: usize) -> Result<f64> {
        if !(1..=3).contains(&sensor) {
            return Err(LabError::ChannelOutOfRange {
                channel: sensor,
                max: 3,
            });
        }
        self.itc.clear()?;
        let reply = self.itc.ask(&format!("@0R{sensor}"))?;
        parse_reading(&reply)
    }

    /// Sets the temperature set point, stopping any running sweep first.
    /// Values outside 0..=299 K are clamped.
    pub fn set_temperature_set_point(&mut self, kelvin: f64) -> Result<()> {
        let kelvin = clamp("set point", kelvin, 0.0, MAX_SET_POINT, "K");
        self.itc.write("@0C3")?; // remote & unlocked
        self.itc.write("@0S0")?; // stop any running sweep
        self.itc.write(&format!("@0T{}", field(kelvin)))?;
        self.itc.write("@0C0")?; // back to local & locked
        Ok(())
    }

    /// Programs step 1 of the sweep table: ramp to `kelvin` over
    /// `sweep_minutes`, then hold for `hold_minutes`. A zero sweep time
    /// degenerates to a plain set point. The sweep is armed, not started;
    /// see [`Itc503::start_temperature_sweep`].
    pub fn set_temperature_sweep(
        &mut self,
        kelvin: f64,
        sweep_minutes: f64,
        hold_minutes: f64,
    ) -> Result<()> {
        let kelvin = clamp("sweep goal", kelvin, 0.0, MAX_SET_POINT, "K");
        let sweep_minutes = clamp("sweep time", sweep_minutes, 0.0, MAX_SWEEP_MINUTES, "min");
        let hold_minutes = clamp("hold time", hold_minutes, 0.0, MAX_SWEEP_MINUTES, "min");

        self.itc.write("@0C3")?;
        self.itc.write("@0S0")?;

        if sweep_minutes == 0.0 {
            self.itc.write(&format!("@0T{}", field(kelvin)))?;
        } else {
            self.itc.write("@0x001")?; // select sweep step 1
            self.itc.write("@0y001")?; // field: step temperature
            self.itc.write(&format!("@0s{}", field(kelvin)))?;
            self.itc.write("@0y002")?; // field: sweep time
            self.itc.write(&format!("@0s{}", field(sweep_minutes)))?;
            self.itc.write("@0y003")?; // field: hold time
            self.itc.write(&format!("@0s{}", field(hold_minutes)))?;
            self.itc.write("@0x000")?;
            self.itc.write("@0y000")?;
        }

        self.itc.write("@0C0")?;
        Ok(())
    }

    /// Starts the sweep armed by [`Itc503::set_temperature_sweep`].
    pub fn start_temperature_sweep(&mut self) -> Result<()> {
        self.itc.write("@0C3")?;
        self.itc.write("@0S0")?;
        self.itc.write("@0S1")?;
        self.itc.write("@0C0")?;
        Ok(())
    }

    /// Clears the controller's I/O buffers.
    pub fn clear(&mut self) -> Result<()> {
        self.itc.clear()
    }

    /// Releases the transport handle.
    pub fn into_inner(self) -> I {
        self.itc
    }
}

/// Oxford ILM helium level meter, ISOBUS address 6.
pub struct Ilm<I: Instrument> {
    ilm: I,
}

impl<I: Instrument> Ilm<I> {
    /// Wraps an open transport handle and switches it to `\r` framing.
    pub fn new(mut device: I) -> Result<Self> {
        device.set_termination(b"\r")?;
        Ok(Self { ilm: device })
    }

    /// Current He4 level of the cryostat in percent. The meter reports
    /// tenths of a percent.
    pub fn helium_level(&mut self) -> Result<f64> {
        let reply = self.ilm.ask("@6R1")?;
        Ok(parse_reading(&reply)? / 10.0)
    }

    /// Releases the transport handle.
    pub fn into_inner(self) -> I {
        self.ilm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visa::MockInstrument;

    #[test]
    fn test_temperature_strips_echo_letter() {
        let mock = MockInstrument::with_replies(["R123.45"]);
        let mut itc = Itc503::new(mock).expect("wrap");
        assert_eq!(itc.temperature(1).expect("read"), 123.45);
        let mock = itc.into_inner();
        assert_eq!(mock.written_commands(), ["@0R1"]);
        assert_eq!(mock.clears(), 1);
        assert_eq!(mock.termination(), b"\r");
    }

    #[test]
    fn test_sensor_number_is_checked() {
        let mut itc = Itc503::new(MockInstrument::echo()).expect("wrap");
        assert!(matches!(
            itc.temperature(0),
            Err(LabError::ChannelOutOfRange { channel: 0, max: 3 })
        ));
        assert!(matches!(
            itc.temperature(4),
            Err(LabError::ChannelOutOfRange { channel: 4, max: 3 })
        ));
    }

    #[test]
    fn test_garbled_reading_is_a_parse_error() {
        let mock = MockInstrument::with_replies([""]);
        let mut itc = Itc503::new(mock).expect("wrap");
        assert!(matches!(
            itc.temperature(2),
            Err(LabError::ReplyParse { .. })
        ));
    }

    #[test]
    fn test_set_point_sequence_and_clamp() {
        let mut itc = Itc503::new(MockInstrument::echo()).expect("wrap");
        itc.set_temperature_set_point(350.0).expect("set");
        assert_eq!(
            itc.into_inner().written_commands(),
            ["@0C3", "@0S0", "@0T299.0", "@0C0"]
        );
    }

    #[test]
    fn test_zero_sweep_time_degenerates_to_set_point() {
        let mut itc = Itc503::new(MockInstrument::echo()).expect("wrap");
        itc.set_temperature_sweep(77.0, 0.0, 60.0).expect("set");
        assert_eq!(
            itc.into_inner().written_commands(),
            ["@0C3", "@0S0", "@0T77.00", "@0C0"]
        );
    }

    #[test]
    fn test_sweep_programs_step_one() {
        let mut itc = Itc503::new(MockInstrument::echo()).expect("wrap");
        itc.set_temperature_sweep(100.0, 30.0, 2000.0).expect("set");
        assert_eq!(
            itc.into_inner().written_commands(),
            [
                "@0C3", "@0S0", "@0x001", "@0y001", "@0s100.0", "@0y002", "@0s30.00", "@0y003",
                "@0s1399.", "@0x000", "@0y000", "@0C0"
            ]
        );
    }

    #[test]
    fn test_start_sweep() {
        let mut itc = Itc503::new(MockInstrument::echo()).expect("wrap");
        itc.start_temperature_sweep().expect("start");
        assert_eq!(
            itc.into_inner().written_commands(),
            ["@0C3", "@0S0", "@0S1", "@0C0"]
        );
    }

    #[test]
    fn test_helium_level_is_in_tenths() {
        let mock = MockInstrument::with_replies(["R985"]);
        let mut ilm = Ilm::new(mock).expect("wrap");
        assert_eq!(ilm.helium_level().expect("read"), 98.5);
        assert_eq!(ilm.into_inner().written_commands(), ["@6R1"]);
    }
}
