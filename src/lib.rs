//! Drivers and transport layer for the lab's instrument park.
//!
//! The [`visa`] module unifies GPIB, serial and Ethernet access behind one
//! blocking [`visa::Instrument`] trait; [`devices`] holds one driver module
//! per vendor on top of it. Instruments are usually opened by name through
//! a [`config::LabConfig`] setup file rather than hard-coded addresses.
//!
//! ```no_run
//! use cryolab::config::LabConfig;
//! use cryolab::devices::oxford::Itc503;
//!
//! # fn main() -> cryolab::Result<()> {
//! let config = LabConfig::load()?;
//! let mut itc = Itc503::new(config.open("itc")?)?;
//! println!("sample at {} K", itc.temperature(1)?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod devices;
pub mod error;
#[cfg(feature = "modbus")]
pub mod modbus;
pub mod visa;

pub use error::{LabError, Result};
