//! HP 4284A precision LCR meter.
//!
//! The meter is set up for bus-triggered ASCII readout: `FORM ASCII`,
//! `TRIG:SOUR BUS`, `INIT:CONT ON`. After that, `*TRG` moves one
//! primary/secondary measurement pair into the output buffer.
//!
//! The instrument wedges its reply buffer when a transaction is cut
//! short, so every exchange is bracketed by a device clear with short
//! settle pauses around it. Source and bias limits double in high power
//! mode; the driver tracks that mode to clamp against the right limit.

use std::thread;
use std::time::Duration;

use log::warn;

use crate::error::{LabError, Result};
use crate::visa::Instrument;

/// Measurement function idents from the `FUNC:IMP` command tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum MeasurementFunction {
    CpD,
    CpQ,
    CpG,
    CpRp,
    CsD,
    CsQ,
    CsRs,
    LpQ,
    LpD,
    LpG,
    LpRp,
    LsD,
    LsQ,
    LsRs,
    Rx,
    ZThetaDeg,
    ZThetaRad,
    Gb,
    YThetaDeg,
    YThetaRad,
}

impl MeasurementFunction {
    /// The ident the command set uses for this function.
    pub fn ident(self) -> &'static str {
        match self {
            Self::CpD => "CPD",
            Self::CpQ => "CPQ",
            Self::CpG => "CPG",
            Self::CpRp => "CPRP",
            Self::CsD => "CSD",
            Self::CsQ => "CSQ",
            Self::CsRs => "CSRS",
            Self::LpQ => "LPQ",
            Self::LpD => "LPD",
            Self::LpG => "LPG",
            Self::LpRp => "LPRP",
            Self::LsD => "LSD",
            Self::LsQ => "LSQ",
            Self::LsRs => "LSRS",
            Self::Rx => "RX",
            Self::ZThetaDeg => "ZTD",
            Self::ZThetaRad => "ZTR",
            Self::Gb => "GB",
            Self::YThetaDeg => "YTD",
            Self::YThetaRad => "YTR",
        }
    }

    fn from_ident(ident: &str) -> Option<Self> {
        [
            Self::CpD,
            Self::CpQ,
            Self::CpG,
            Self::CpRp,
            Self::CsD,
            Self::CsQ,
            Self::CsRs,
            Self::LpQ,
            Self::LpD,
            Self::LpG,
            Self::LpRp,
            Self::LsD,
            Self::LsQ,
            Self::LsRs,
            Self::Rx,
            Self::ZThetaDeg,
            Self::ZThetaRad,
            Self::Gb,
            Self::YThetaDeg,
            Self::YThetaRad,
        ]
        .into_iter()
        .find(|f| f.ident() == ident)
    }
}

/// Integration time idents for the `APER` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationTime {
    /// Short aperture.
    Short,
    /// Medium aperture, the power-on default.
    Medium,
    /// Long aperture.
    Long,
}

impl IntegrationTime {
    fn ident(self) -> &'static str {
        match self {
            Self::Short => "SHOR",
            Self::Medium => "MED",
            Self::Long => "LONG",
        }
    }

    fn from_ident(ident: &str) -> Option<Self> {
        match ident {
            "SHOR" => Some(Self::Short),
            "MED" => Some(Self::Medium),
            "LONG" => Some(Self::Long),
            _ => None,
        }
    }
}

/// Measurement frequency limits of the instrument, in hertz.
pub const FREQUENCY_RANGE: (f64, f64) = (20.0, 1_000_000.0);

/// HP 4284A driver over any transport.
pub struct Hp4284a<I: Instrument> {
    lcr: I,
    high_power: bool,
    // APER couples integration time and averaging count in one command,
    // so both sides are cached to re-send the other half.
    integration: IntegrationTime,
    averages: u8,
}

impl<I: Instrument> Hp4284a<I> {
    /// Wraps an open transport handle and puts the meter into
    /// bus-triggered ASCII mode.
    pub fn new(mut device: I) -> Result<Self> {
        device.set_termination(b"\r")?;
        let mut lcr = Self {
            lcr: device,
            high_power: false,
            integration: IntegrationTime::Medium,
            averages: 1,
        };
        lcr.guarded_clear()?;
        lcr.lcr.write("FORM ASCII")?;
        lcr.lcr.write("TRIG:SOUR BUS")?;
        lcr.lcr.write("INIT:CONT ON")?;
        Ok(lcr)
    }

    /// Device clear bracketed by settle pauses.
    fn guarded_clear(&mut self) -> Result<()> {
        thread::sleep(Duration::from_millis(100));
        self.lcr.clear()?;
        thread::sleep(Duration::from_millis(100));
        Ok(())
    }

    fn ask(&mut self, query: &str) -> Result<String> {
        self.guarded_clear()?;
        self.lcr.ask(query)
    }

    fn command(&mut self, command: &str) -> Result<()> {
        self.guarded_clear()?;
        self.lcr.write(command)
    }

    fn ask_f64(&mut self, query: &str, expected: &'static str) -> Result<f64> {
        let reply = self.ask(query)?;
        reply.trim().parse().map_err(|_| LabError::ReplyParse {
            reply,
            expected,
        })
    }

    fn ask_bool(&mut self, query: &str) -> Result<bool> {
        let reply = self.ask(query)?;
        match reply.trim() {
            "1" | "+1" | "ON" => Ok(true),
            "0" | "+0" | "OFF" => Ok(false),
            _ => Err(LabError::ReplyParse {
                reply,
                expected: "0 or 1",
            }),
        }
    }

    /// Measurement frequency in hertz.
    pub fn frequency(&mut self) -> Result<f64> {
        self.ask_f64("FREQ?", "frequency in hertz")
    }

    /// Sets the measurement frequency. The instrument only accepts
    /// values between 20 Hz and 1 MHz.
    pub fn set_frequency(&mut self, hertz: f64) -> Result<()> {
        if !(FREQUENCY_RANGE.0..=FREQUENCY_RANGE.1).contains(&hertz) {
            return Err(LabError::InvalidInput(format!(
                "frequency {hertz} Hz outside the instrument's {} Hz to {} Hz range",
                FREQUENCY_RANGE.0, FREQUENCY_RANGE.1
            )));
        }
        self.command(&format!("FREQ {hertz}"))
    }

    /// Active measurement function.
    pub fn measurement_function(&mut self) -> Result<MeasurementFunction> {
        let reply = self.ask("FUNC:IMP?")?;
        MeasurementFunction::from_ident(reply.trim()).ok_or(LabError::ReplyParse {
            reply,
            expected: "a FUNC:IMP ident",
        })
    }

    /// Selects the measurement function.
    pub fn set_measurement_function(&mut self, function: MeasurementFunction) -> Result<()> {
        self.command(&format!("FUNC:IMP {}", function.ident()))
    }

    /// Whether impedance auto-ranging is on.
    pub fn auto_range(&mut self) -> Result<bool> {
        self.ask_bool("FUNC:IMP:RANG:AUTO?")
    }

    /// Switches impedance auto-ranging.
    pub fn set_auto_range(&mut self, on: bool) -> Result<()> {
        self.command(if on {
            "FUNC:IMP:RANG:AUTO ON"
        } else {
            "FUNC:IMP:RANG:AUTO OFF"
        })
    }

    /// Whether automatic level control is on.
    pub fn auto_level_control(&mut self) -> Result<bool> {
        self.ask_bool("AMPL:ALC?")
    }

    /// Switches automatic level control.
    pub fn set_auto_level_control(&mut self, on: bool) -> Result<()> {
        self.command(if on { "AMPL:ALC ON" } else { "AMPL:ALC OFF" })
    }

    /// Whether the high power option output is on. Refreshes the cached
    /// mode used for clamping.
    pub fn high_power_mode(&mut self) -> Result<bool> {
        let on = self.ask_bool("OUTP:HPOW?")?;
        self.high_power = on;
        Ok(on)
    }

    /// Switches the high power option output.
    pub fn set_high_power_mode(&mut self, on: bool) -> Result<()> {
        self.command(if on { "OUTP:HPOW ON" } else { "OUTP:HPOW OFF" })?;
        self.high_power = on;
        Ok(())
    }

    /// Whether the DC bias output is on.
    pub fn dc_bias_enabled(&mut self) -> Result<bool> {
        self.ask_bool("BIAS:STAT?")
    }

    /// Switches the DC bias output.
    pub fn set_dc_bias_enabled(&mut self, on: bool) -> Result<()> {
        self.command(if on { "BIAS:STAT ON" } else { "BIAS:STAT OFF" })
    }

    /// Oscillator voltage level in volts.
    pub fn source_voltage(&mut self) -> Result<f64> {
        self.ask_f64("VOLT?", "oscillator voltage in volts")
    }

    /// Sets the oscillator voltage level. Clamped to 5 mV up to 2 V, or
    /// 20 V in high power mode.
    pub fn set_source_voltage(&mut self, volts: f64) -> Result<()> {
        let max = if self.high_power { 20.0 } else { 2.0 };
        let volts = clamp("source voltage", volts, 0.005, max, "V");
        self.command(&format!("VOLT {volts}V"))
    }

    /// Oscillator current level in milliamperes.
    pub fn source_current(&mut self) -> Result<f64> {
        self.ask_f64("CURR?", "oscillator current")
    }

    /// Sets the oscillator current level in milliamperes. Clamped to
    /// 0.05 mA up to 20 mA, or 200 mA in high power mode.
    pub fn set_source_current(&mut self, milliamps: f64) -> Result<()> {
        let max = if self.high_power { 200.0 } else { 20.0 };
        let milliamps = clamp("source current", milliamps, 0.05, max, "mA");
        self.command(&format!("CURR {milliamps}MA"))
    }

    /// DC bias voltage in volts.
    pub fn dc_bias_voltage(&mut self) -> Result<f64> {
        self.ask_f64("BIAS:VOLT?", "bias voltage in volts")
    }

    /// Sets the DC bias voltage. Clamped to 0 V up to 2 V, or 40 V in
    /// high power mode.
    pub fn set_dc_bias_voltage(&mut self, volts: f64) -> Result<()> {
        let max = if self.high_power { 40.0 } else { 2.0 };
        let volts = clamp("bias voltage", volts, 0.0, max, "V");
        self.command(&format!("BIAS:VOLT {volts}V"))
    }

    /// DC bias current in milliamperes.
    pub fn dc_bias_current(&mut self) -> Result<f64> {
        self.ask_f64("BIAS:CURR?", "bias current")
    }

    /// Sets the DC bias current in milliamperes. The bias current source
    /// only exists with the high power option, so this refuses to write
    /// in normal mode.
    pub fn set_dc_bias_current(&mut self, milliamps: f64) -> Result<()> {
        if !self.high_power {
            return Err(LabError::InvalidInput(
                "bias current needs high power mode".to_string(),
            ));
        }
        let milliamps = clamp("bias current", milliamps, 0.0, 100.0, "mA");
        self.command(&format!("BIAS:CURR {milliamps}MA"))
    }

    /// Integration time half of the `APER?` pair.
    pub fn integration_time(&mut self) -> Result<IntegrationTime> {
        let reply = self.ask("APER?")?;
        let ident = reply.split(',').next().unwrap_or_default().trim();
        let time = IntegrationTime::from_ident(ident).ok_or(LabError::ReplyParse {
            reply,
            expected: "SHOR, MED or LONG",
        })?;
        self.integration = time;
        Ok(time)
    }

    /// Sets the integration time, keeping the cached averaging count.
    pub fn set_integration_time(&mut self, time: IntegrationTime) -> Result<()> {
        let averages = self.averages;
        self.command(&format!("APER {},{averages}", time.ident()))?;
        self.integration = time;
        Ok(())
    }

    /// Averaging count half of the `APER?` pair.
    pub fn averages(&mut self) -> Result<u8> {
        let reply = self.ask("APER?")?;
        let count = reply.split(',').nth(1).unwrap_or_default().trim();
        let count = count.parse().map_err(|_| LabError::ReplyParse {
            reply,
            expected: "averaging count 1..=128",
        })?;
        self.averages = count;
        Ok(count)
    }

    /// Sets the averaging count, clamped to 1..=128, keeping the cached
    /// integration time.
    pub fn set_averages(&mut self, count: u16) -> Result<()> {
        let count = clamp("averaging count", f64::from(count), 1.0, 128.0, "") as u8;
        let ident = self.integration.ident();
        self.command(&format!("APER {ident},{count}"))?;
        self.averages = count;
        Ok(())
    }

    /// Triggers one measurement and returns the primary and secondary
    /// values of the active function.
    pub fn read_data(&mut self) -> Result<(f64, f64)> {
        let reply = self.ask("*TRG")?;
        let mut fields = reply.split(',');
        let parse = |field: Option<&str>, reply: &str| -> Result<f64> {
            field
                .and_then(|f| f.trim().parse().ok())
                .ok_or_else(|| LabError::ReplyParse {
                    reply: reply.to_string(),
                    expected: "two comma-separated values",
                })
        };
        let primary = parse(fields.next(), &reply)?;
        let secondary = parse(fields.next(), &reply)?;
        Ok((primary, secondary))
    }

    /// Releases the transport handle.
    pub fn into_inner(self) -> I {
        self.lcr
    }
}

fn clamp(quantity: &str, value: f64, min: f64, max: f64, unit: &str) -> f64 {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visa::MockInstrument;

    fn meter() -> Hp4284a<MockInstrument> {
        Hp4284a::new(MockInstrument::echo()).expect("setup")
    }

    fn meter_with_replies<const N: usize>(replies: [&str; N]) -> Hp4284a<MockInstrument> {
        Hp4284a::new(MockInstrument::with_replies(replies)).expect("setup")
    }

    #[test]
    fn test_setup_sequence() {
        let lcr = meter().into_inner();
        assert_eq!(
            lcr.written_commands(),
            ["FORM ASCII", "TRIG:SOUR BUS", "INIT:CONT ON"]
        );
        assert_eq!(lcr.clears(), 1);
    }

    #[test]
    fn test_frequency_parses_scpi_float() {
        let mut lcr = meter_with_replies(["+1.00000E+03"]);
        assert_eq!(lcr.frequency().expect("read"), 1000.0);
    }

    #[test]
    fn test_frequency_range_is_enforced() {
        let mut lcr = meter();
        assert!(matches!(
            lcr.set_frequency(5.0),
            Err(LabError::InvalidInput(_))
        ));
        assert!(matches!(
            lcr.set_frequency(2e6),
            Err(LabError::InvalidInput(_))
        ));
        lcr.set_frequency(1000.0).expect("set");
        assert_eq!(lcr.into_inner().written_commands().last().map(String::as_str), Some("FREQ 1000"));
    }

    #[test]
    fn test_measurement_function_round_trip() {
        let mut lcr = meter_with_replies(["CPRP"]);
        assert_eq!(
            lcr.measurement_function().expect("read"),
            MeasurementFunction::CpRp
        );
        lcr.set_measurement_function(MeasurementFunction::ZThetaDeg)
            .expect("set");
        assert_eq!(
            lcr.into_inner().written_commands().last().map(String::as_str),
            Some("FUNC:IMP ZTD")
        );
    }

    #[test]
    fn test_source_voltage_clamp_follows_power_mode() {
        let mut lcr = meter();
        lcr.set_source_voltage(25.0).expect("set");
        lcr.set_high_power_mode(true).expect("hp");
        lcr.set_source_voltage(25.0).expect("set");
        let commands = lcr.into_inner().written_commands().to_vec();
        assert!(commands.contains(&"VOLT 2V".to_string()));
        assert!(commands.contains(&"VOLT 20V".to_string()));
    }

    #[test]
    fn test_bias_current_requires_high_power() {
        let mut lcr = meter();
        assert!(matches!(
            lcr.set_dc_bias_current(10.0),
            Err(LabError::InvalidInput(_))
        ));
        lcr.set_high_power_mode(true).expect("hp");
        lcr.set_dc_bias_current(150.0).expect("set");
        assert_eq!(
            lcr.into_inner().written_commands().last().map(String::as_str),
            Some("BIAS:CURR 100MA")
        );
    }

    #[test]
    fn test_aperture_pair_is_kept_coupled() {
        let mut lcr = meter_with_replies(["LONG,4"]);
        assert_eq!(lcr.integration_time().expect("read"), IntegrationTime::Long);
        lcr.set_averages(300).expect("set");
        assert_eq!(
            lcr.into_inner().written_commands().last().map(String::as_str),
            Some("APER LONG,128")
        );
    }

    #[test]
    fn test_read_data_takes_first_two_fields() {
        let mut lcr = meter_with_replies(["+1.23456E-12,+5.00000E-03,+0"]);
        let (primary, secondary) = lcr.read_data().expect("trigger");
        assert_eq!(primary, 1.23456e-12);
        assert_eq!(secondary, 5.0e-3);
    }

    #[test]
    fn test_read_data_rejects_short_reply() {
        let mut lcr = meter_with_replies(["+1.0E0"]);
        assert!(matches!(lcr.read_data(), Err(LabError::ReplyParse { .. })));
    }
}
