//! Stanford Research Systems SR830 lock-in amplifier.
//!
//! Reference: SR830 manual, chapter 5 (remote programming).
//!
//! Sensitivity and time constant are discrete range indices on the
//! instrument; [`SENSITIVITIES`] and [`INTEGRATION_TIMES`] map indices to
//! physical values. `SNAP?` reads several output channels in one
//! transaction so X/Y pairs come from the same sample.

use std::thread;
use std::time::Duration;

use log::{debug, warn};
use prse::try_parse;

use crate::error::{LabError, Result};
use crate::visa::Instrument;

/// Time constants selectable with `OFLT`, in seconds.
pub const INTEGRATION_TIMES: [f64; 20] = [
    10e-6, 30e-6, 100e-6, 300e-6, 1e-3, 3e-3, 10e-3, 30e-3, 100e-3, 300e-3, 1.0, 3.0, 10.0, 30.0,
    100.0, 300.0, 1e3, 3e3, 10e3, 30e3,
];

/// Full-scale sensitivities selectable with `SENS`, in volts rms.
pub const SENSITIVITIES: [f64; 27] = [
    2e-9, 5e-9, 10e-9, 20e-9, 50e-9, 100e-9, 200e-9, 500e-9, 1e-6, 2e-6, 5e-6, 10e-6, 20e-6,
    50e-6, 100e-6, 200e-6, 500e-6, 1e-3, 2e-3, 5e-3, 10e-3, 20e-3, 50e-3, 100e-3, 200e-3, 500e-3,
    1.0,
];

/// Sine output amplitude limits, in volts rms.
pub const OUTPUT_VOLTAGE_RANGE: (f64, f64) = (0.004, 5.0);

/// Reference frequency limits, in hertz.
pub const FREQUENCY_RANGE: (f64, f64) = (0.001, 102_000.0);

/// Aux output voltage magnitude limit, in volts.
pub const AUX_OUTPUT_LIMIT: f64 = 10.5;

/// One `SNAP? 1,2,3,4,9` sample: both quadratures, magnitude, phase and
/// the reference frequency, all taken at the same instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    /// In-phase component, volts.
    pub x: f64,
    /// Quadrature component, volts.
    pub y: f64,
    /// Magnitude, volts.
    pub r: f64,
    /// Phase angle, degrees.
    pub phase: f64,
    /// Reference frequency, hertz.
    pub frequency: f64,
}

/// SR830 driver over any transport.
pub struct Sr830<I: Instrument> {
    lia: I,
}

impl<I: Instrument> Sr830<I> {
    /// Wraps an open transport handle and brings the amplifier into a
    /// known state: GPIB output, scan reset, floating A-B input, zero
    /// phase, first harmonic, 1 V sensitivity, 1 s time constant.
    pub fn new(mut device: I) -> Result<Self> {
        device.set_termination(b"\r\n")?;
        let mut lia = Self { lia: device };
        lia.lia.clear()?;
        lia.lia.write("OUTX 1")?; // replies go to GPIB, not RS-232
        lia.lia.write("REST")?; // reset the scan, stored data is lost
        lia.lia.write("IGND 0")?; // input shield floating
        lia.lia.write("ISRC 1")?; // A-B input
        lia.lia.write("PHAS 0.0")?;
        lia.lia.write("HARM 1")?;
        lia.set_sensitivity(1.0)?;
        lia.set_integration_time(1.0)?;
        thread::sleep(Duration::from_secs(1));
        Ok(lia)
    }

    /// Sine output amplitude in volts rms.
    pub fn output_voltage(&mut self) -> Result<f64> {
        self.ask_f64("SLVL?", "amplitude in volts")
    }

    /// Sets the sine output amplitude, clamped to 4 mV up to 5 V rms.
    pub fn set_output_voltage(&mut self, vrms: f64) -> Result<()> {
        let vrms = clamp("output voltage", vrms, OUTPUT_VOLTAGE_RANGE, "Vrms");
        self.lia.write(&format!("SLVL {vrms}"))
    }

    /// Reference frequency in hertz.
    pub fn frequency(&mut self) -> Result<f64> {
        self.ask_f64("FREQ?", "frequency in hertz")
    }

    /// Sets the reference frequency (internal reference mode only),
    /// clamped to 1 mHz up to 102 kHz.
    pub fn set_frequency(&mut self, hertz: f64) -> Result<()> {
        let hertz = clamp("frequency", hertz, FREQUENCY_RANGE, "Hz");
        self.lia.write(&format!("FREQ {hertz}"))
    }

    /// Time constant in seconds, decoded from the `OFLT?` index.
    pub fn integration_time(&mut self) -> Result<f64> {
        self.table_entry("OFLT?", &INTEGRATION_TIMES)
    }

    /// Sets the time constant. `seconds` must be one of
    /// [`INTEGRATION_TIMES`]; the instrument has no ranges in between.
    pub fn set_integration_time(&mut self, seconds: f64) -> Result<()> {
        let index = INTEGRATION_TIMES
            .iter()
            .position(|&t| t == seconds)
            .ok_or_else(|| {
                LabError::InvalidInput(format!("{seconds} s is not a selectable time constant"))
            })?;
        self.lia.write(&format!("OFLT {index}"))
    }

    /// Sensitivity in volts rms full scale, decoded from the `SENS?`
    /// index.
    pub fn sensitivity(&mut self) -> Result<f64> {
        self.table_entry("SENS?", &SENSITIVITIES)
    }

    /// Sets the sensitivity. `vrms` must be one of [`SENSITIVITIES`].
    pub fn set_sensitivity(&mut self, vrms: f64) -> Result<()> {
        let index = SENSITIVITIES
            .iter()
            .position(|&s| s == vrms)
            .ok_or_else(|| {
                LabError::InvalidInput(format!("{vrms} V is not a selectable sensitivity"))
            })?;
        self.lia.write(&format!("SENS {index}"))
    }

    /// Walks the sensitivity ranges until the measured X/Y pair fits
    /// with a 10 % margin, waiting three time constants between steps
    /// for the output filter to settle. Returns the sensitivity that was
    /// finally kept, in volts rms.
    pub fn adjust_sensitivity(&mut self) -> Result<f64> {
        let tau = self.integration_time()?;
        loop {
            thread::sleep(Duration::from_secs_f64(3.0 * tau));
            let current = self.table_index("SENS?", SENSITIVITIES.len())?;
            let reply = self.lia.ask("SNAP? 1,2")?;
            let (x, y): (f64, f64) =
                try_parse!(reply.as_str(), "{},{}").map_err(|_| LabError::ReplyParse {
                    reply,
                    expected: "two comma-separated values",
                })?;
            let needed = x.abs().max(y.abs()) * 1.1;
            let wanted = SENSITIVITIES
                .iter()
                .position(|&s| needed < s)
                .unwrap_or(SENSITIVITIES.len() - 1);
            if wanted == current {
                return Ok(SENSITIVITIES[wanted]);
            }
            debug!("sensitivity {current} -> {wanted} for |signal| {needed:.3e} V");
            self.lia.write(&format!("SENS {wanted}"))?;
        }
    }

    /// Reads X, Y, R, phase and reference frequency in one transaction.
    pub fn snapshot(&mut self) -> Result<Snapshot> {
        let reply = self.lia.ask("SNAP? 1,2,3,4,9")?;
        let (x, y, r, phase, frequency): (f64, f64, f64, f64, f64) =
            try_parse!(reply.as_str(), "{},{},{},{},{}").map_err(|_| LabError::ReplyParse {
                reply,
                expected: "five comma-separated values",
            })?;
        Ok(Snapshot {
            x,
            y,
            r,
            phase,
            frequency,
        })
    }

    /// Reads one display channel: 1 = X, 2 = Y, 3 = R, 4 = phase.
    pub fn output(&mut self, channel: usize) -> Result<f64> {
        if !(1..=4).contains(&channel) {
            return Err(LabError::ChannelOutOfRange { channel, max: 4 });
        }
        self.ask_f64(&format!("OUTP? {channel}"), "channel value")
    }

    /// In-phase component in volts.
    pub fn x(&mut self) -> Result<f64> {
        self.output(1)
    }

    /// Quadrature component in volts.
    pub fn y(&mut self) -> Result<f64> {
        self.output(2)
    }

    /// Magnitude in volts.
    pub fn r(&mut self) -> Result<f64> {
        self.output(3)
    }

    /// Phase angle in degrees.
    pub fn phase(&mut self) -> Result<f64> {
        self.output(4)
    }

    /// Sets aux output `channel` (1..=4) to `volts`, clamped to
    /// ±10.5 V.
    pub fn set_aux_output(&mut self, channel: usize, volts: f64) -> Result<()> {
        if !(1..=4).contains(&channel) {
            return Err(LabError::ChannelOutOfRange { channel, max: 4 });
        }
        let volts = clamp("aux output", volts, (-AUX_OUTPUT_LIMIT, AUX_OUTPUT_LIMIT), "V");
        self.lia.write(&format!("AUXV {channel},{volts:.3}"))
    }

    /// Triggers the instrument's built-in auto-gain routine. Prefer
    /// [`Sr830::adjust_sensitivity`], which settles deterministically.
    pub fn auto_gain(&mut self) -> Result<()> {
        self.lia.write("AGAN")
    }

    /// Parks the amplifier in a safe state: all aux outputs to zero,
    /// sine output to its 4 mV minimum, sensitivity to 1 V full scale.
    pub fn clean_up(&mut self) -> Result<()> {
        for channel in 1..=4 {
            self.set_aux_output(channel, 0.0)?;
        }
        self.set_output_voltage(OUTPUT_VOLTAGE_RANGE.0)?;
        self.set_sensitivity(1.0)
    }

    /// Releases the transport handle.
    pub fn into_inner(self) -> I {
        self.lia
    }

    fn ask_f64(&mut self, query: &str, expected: &'static str) -> Result<f64> {
        let reply = self.lia.ask(query)?;
        reply.trim().parse().map_err(|_| LabError::ReplyParse {
            reply,
            expected,
        })
    }

    fn table_index(&mut self, query: &str, len: usize) -> Result<usize> {
        let reply = self.lia.ask(query)?;
        let index: usize = reply.trim().parse().map_err(|_| LabError::ReplyParse {
            reply: reply.clone(),
            expected: "a range index",
        })?;
        if index >= len {
            return Err(LabError::ReplyParse {
                reply,
                expected: "an index inside the range table",
            });
        }
        Ok(index)
    }

    fn table_entry(&mut self, query: &str, table: &[f64]) -> Result<f64> {
        let index = self.table_index(query, table.len())?;
        Ok(table[index])
    }
}

#[allow(clippy::float_cmp)]
fn clamp(quantity: &str, value: f64, range: (f64, f64), unit: &str) -> f64 {
    let clamped = value.clamp(range.0, range.1);
    if clamped != value {
        warn!("{quantity} {value} {unit} outside range, clamped to {clamped} {unit}");
    }
    clamped
}
