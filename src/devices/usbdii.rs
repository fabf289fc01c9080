//! Decision Computer USBDII relay and digital I/O cards.
//!
//! The cards appear as USB-HID devices under `/dev/usb/hiddev*` and are
//! driven through the vendor's `dcihid` library. Each card exposes a few
//! byte-wide ports addressed by channel number; a relay output card maps
//! one bit per relay.
//!
//! [`RelayCard`] talks to real hardware and needs the `relay` feature (and
//! the vendor library installed). [`RelayCardSim`] keeps the same surface
//! in memory so experiment code runs headless on machines without the
//! card; both sides implement [`DigitalIo`].

use log::debug;

use crate::error::{LabError, Result};

/// Card idents understood by the vendor library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CardType {
    Usb16Pio,
    UsbLabKit,
    Usb16Pr,
    Usb8Pr,
    Usb4Pr,
    Usb8Pi,
    Usb8Ro,
    Usb16Pi,
    Usb16Ro,
    Usb32Pi,
    Usb32Ro,
}

impl CardType {
    /// The vendor id passed to the library when opening.
    pub fn id(self) -> u32 {
        match self {
            Self::Usb16Pio => 0x01,
            Self::UsbLabKit => 0x02,
            Self::Usb16Pr => 0x03,
            Self::Usb8Pr => 0x06,
            Self::Usb4Pr => 0x07,
            Self::Usb8Pi => 0x08,
            Self::Usb8Ro => 0x09,
            Self::Usb16Pi => 0x0A,
            Self::Usb16Ro => 0x0B,
            Self::Usb32Pi => 0x0C,
            Self::Usb32Ro => 0x0D,
        }
    }
}

/// Byte-wide digital I/O as the cards expose it.
pub trait DigitalIo {
    /// Writes one output port.
    fn set_digital_byte(&mut self, channel: u32, byte: u8) -> Result<()>;

    /// Reads one port back.
    fn digital_byte(&mut self, channel: u32) -> Result<u8>;

    /// Switches a single output bit, preserving the rest of the port.
    fn set_digital_bit(&mut self, channel: u32, bit: u8, on: bool) -> Result<()> {
        if bit > 7 {
            return Err(LabError::ChannelOutOfRange {
                channel: usize::from(bit),
                max: 7,
            });
        }
        let byte = self.digital_byte(channel)?;
        let byte = if on {
            byte | (1 << bit)
        } else {
            byte & !(1 << bit)
        };
        self.set_digital_byte(channel, byte)
    }
}

/// Ports the simulated card keeps.
pub const SIM_CHANNELS: usize = 4;

/// In-memory stand-in for a relay card.
///
/// Accepts the same channel/byte calls as the real card and remembers the
/// last written state, so interlock logic and tests run without hardware.
#[derive(Debug, Default)]
pub struct RelayCardSim {
    channels: [u8; SIM_CHANNELS],
}

impl RelayCardSim {
    /// A simulated card with all ports cleared.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DigitalIo for RelayCardSim {
    fn set_digital_byte(&mut self, channel: u32, byte: u8) -> Result<()> {
        let slot = self
            .channels
            .get_mut(channel as usize)
            .ok_or(LabError::ChannelOutOfRange {
                channel: channel as usize,
                max: SIM_CHANNELS - 1,
            })?;
        debug!("sim relay channel {channel} = {byte:08b}");
        *slot = byte;
        Ok(())
    }

    fn digital_byte(&mut self, channel: u32) -> Result<u8> {
        self.channels
            .get(channel as usize)
            .copied()
            .ok_or(LabError::ChannelOutOfRange {
                channel: channel as usize,
                max: SIM_CHANNELS - 1,
            })
    }
}

#[cfg(feature = "relay")]
pub use real::RelayCard;

#[cfg(feature = "relay")]
mod real {
    #![allow(unsafe_code)]

    use std::ffi::CString;
    use std::io;

    use log::debug;

    use super::{CardType, DigitalIo};
    use crate::error::{LabError, Result};

    /// One USBDII card reached through the vendor library.
    ///
    /// The hiddev node number is not stable across replugs, so
    /// [`RelayCard::open_scan`] tries every node until the card with the
    /// requested type and unit number answers.
    pub struct RelayCard {
        handle: Option<u32>,
    }

    impl RelayCard {
        /// Opens the card of `card_type` with unit number `card_number` at
        /// a specific hiddev node.
        pub fn open(path: &str, card_type: CardType, card_number: u32) -> Result<Self> {
            let dev_name = CString::new(path).map_err(|_| {
                LabError::InvalidInput(format!("device path '{path}' contains a NUL byte"))
            })?;
            let handle =
                unsafe { usbdii_sys::dcihid_open(dev_name.as_ptr(), card_type.id(), card_number) };
            if handle == usbdii_sys::INVALID_HANDLE || handle == 0 {
                return Err(LabError::Connection {
                    target: path.to_string(),
                    source: io::Error::new(
                        io::ErrorKind::NotFound,
                        "no matching card behind this hiddev node",
                    ),
                });
            }
            debug!("opened {card_type:?} unit {card_number} at {path}");
            Ok(Self {
                handle: Some(handle),
            })
        }

        /// Walks `/dev/usb/hiddev0` through `hiddev15` and opens the first
        /// node hosting the requested card.
        pub fn open_scan(card_type: CardType, card_number: u32) -> Result<Self> {
            for node in 0..16 {
                let path = format!("/dev/usb/hiddev{node}");
                if let Ok(card) = Self::open(&path, card_type, card_number) {
                    return Ok(card);
                }
            }
            Err(LabError::Connection {
                target: format!("{card_type:?} unit {card_number}"),
                source: io::Error::new(
                    io::ErrorKind::NotFound,
                    "no hiddev node hosts this card",
                ),
            })
        }

        /// Releases the library handle. Closing twice is a no-op.
        pub fn close(&mut self) -> Result<()> {
            if let Some(handle) = self.handle.take() {
                if unsafe { usbdii_sys::dcihid_close(handle) } < 0 {
                    return Err(LabError::Device(
                        "library refused to release the card handle".to_string(),
                    ));
                }
            }
            Ok(())
        }

        fn handle(&self) -> Result<u32> {
            self.handle.ok_or(LabError::NotConnected)
        }
    }

    impl DigitalIo for RelayCard {
        fn set_digital_byte(&mut self, channel: u32, byte: u8) -> Result<()> {
            let handle = self.handle()?;
            if unsafe { usbdii_sys::dcihid_write(handle, channel, u32::from(byte)) } < 0 {
                return Err(LabError::Device(format!(
                    "write to channel {channel} failed; USB connection may be interrupted"
                )));
            }
            debug!("relay channel {channel} = {byte:08b}");
            Ok(())
        }

        fn digital_byte(&mut self, channel: u32) -> Result<u8> {
            let handle = self.handle()?;
            let mut byte: u8 = 0;
            if unsafe { usbdii_sys::dcihid_read(handle, channel, &mut byte) } < 0 {
                return Err(LabError::Device(format!(
                    "read of channel {channel} failed; USB connection may be interrupted"
                )));
            }
            Ok(byte)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_remembers_written_bytes() {
        let mut card = RelayCardSim::new();
        card.set_digital_byte(0, 0b1010_0001).expect("write");
        card.set_digital_byte(3, 0xFF).expect("write");
        assert_eq!(card.digital_byte(0).expect("read"), 0b1010_0001);
        assert_eq!(card.digital_byte(1).expect("read"), 0);
        assert_eq!(card.digital_byte(3).expect("read"), 0xFF);
    }

    #[test]
    fn test_sim_channel_range() {
        let mut card = RelayCardSim::new();
        assert!(matches!(
            card.set_digital_byte(4, 0),
            Err(LabError::ChannelOutOfRange { channel: 4, max: 3 })
        ));
        assert!(matches!(
            card.digital_byte(9),
            Err(LabError::ChannelOutOfRange { channel: 9, max: 3 })
        ));
    }

    #[test]
    fn test_bit_twiddling_keeps_neighbours() {
        let mut card = RelayCardSim::new();
        card.set_digital_byte(0, 0b0000_1111).expect("write");
        card.set_digital_bit(0, 6, true).expect("set bit");
        assert_eq!(card.digital_byte(0).expect("read"), 0b0100_1111);
        card.set_digital_bit(0, 0, false).expect("clear bit");
        assert_eq!(card.digital_byte(0).expect("read"), 0b0100_1110);
        assert!(matches!(
            card.set_digital_bit(0, 8, true),
            Err(LabError::ChannelOutOfRange { .. })
        ));
    }

    #[test]
    fn test_card_ids_match_the_vendor_table() {
        assert_eq!(CardType::Usb16Pio.id(), 0x01);
        assert_eq!(CardType::Usb4Pr.id(), 0x07);
        assert_eq!(CardType::Usb32Ro.id(), 0x0D);
    }

    #[test]
    fn test_sim_behind_the_trait_object() {
        let mut card: Box<dyn DigitalIo> = Box::new(RelayCardSim::new());
        card.set_digital_byte(2, 0x55).expect("write");
        assert_eq!(card.digital_byte(2).expect("read"), 0x55);
    }
}
