//! Agilent 34970A switch unit with a 34901A multiplexer card in slot 1.
//!
//! Routes are addressed `(@1nn)` where `nn` is the two-digit channel on
//! the card.

use crate::error::{LabError, Result};
use crate::visa::Instrument;

/// Channels on the 34901A card.
pub const CHANNELS: usize = 20;

/// 34970A driver over any transport.
pub struct Multiplexer34970A<I: Instrument> {
    mux: I,
}

impl<I: Instrument> Multiplexer34970A<I> {
    /// Wraps an open transport handle and resets the unit.
    pub fn new(mut device: I) -> Result<Self> {
        device.set_termination(b"\n")?;
        device.write("*RST")?;
        Ok(Self { mux: device })
    }

    /// Opens the relay on a route, disconnecting it.
    pub fn open_route(&mut self, route: usize) -> Result<()> {
        self.mux.write(&format!(":ROUTE:OPEN (@1{:02})", checked(route)?))
    }

    /// Closes the relay on a route, connecting it.
    pub fn close_route(&mut self, route: usize) -> Result<()> {
        self.mux.write(&format!(":ROUTE:CLOSE (@1{:02})", checked(route)?))
    }

    /// Releases the transport handle.
    pub fn into_inner(self) -> I {
        self.mux
    }
}

fn checked(route: usize) -> Result<usize> {
    if (1..=CHANNELS).contains(&route) {
        Ok(route)
    } else {
        Err(LabError::ChannelOutOfRange {
            channel: route,
            max: CHANNELS,
        })
    }
}
