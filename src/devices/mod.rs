//! Drivers for the lab's instrument park.
//!
//! Drivers come in two shapes. Message-based instruments (the cryostat
//! electronics, the LCR meter, the lock-in, the magnet controller, the
//! multiplexer) are generic over the transport-layer
//! [`Instrument`](crate::visa::Instrument) trait and work over whichever
//! bus the address string selects. Byte-protocol devices (the flow
//! controller, the pressure gauge, the Modbus PID rack, the relay card)
//! own their port directly because their framing does not fit the
//! command/reply model.

pub mod agilent;
pub mod alicat;
#[cfg(feature = "modbus")]
pub mod eurotherm;
pub mod hp;
pub mod oxford;
pub mod pfeiffer;
pub mod scientific_magnetics;
pub mod srs;
pub mod usbdii;
