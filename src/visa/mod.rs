//! Instrument transport layer.
//!
//! This module unifies GPIB, serial and Ethernet byte-stream access behind
//! one blocking read/write/ask interface. A device driver holds any type
//! implementing [`Instrument`] and speaks its command vocabulary through it;
//! the transport takes care of message framing (termination sequences) and
//! resource lifetime.
//!
//! ## Address strings
//!
//! [`open`] accepts addresses of the form `<TYPE>::<ENDPOINT>`:
//!
//! | Type             | Endpoint                | Example                     |
//! |------------------|-------------------------|-----------------------------|
//! | `GPIB` / `GPIB0` | primary address (int)   | `GPIB::24`                  |
//! | `ETHER`          | `host:port`             | `ETHER::127.0.0.1:5025`     |
//! | `SERIAL`         | device path             | `SERIAL::/dev/ttyUSB0`      |
//!
//! The type token matches case-sensitively. Serial ports open at 9600 Bd,
//! eight data bits, two stop bits, no parity, no flow control; drivers with
//! other port requirements (Pfeiffer, Alicat) open their ports directly.
//!
//! ## Message framing
//!
//! Every `write` appends the handle's termination sequence; `read` strips
//! it from the reply. Defaults are `"\n"` for GPIB and Ethernet and `"\r"`
//! for serial. Several instruments frame with `"\r"` or `"\r\n"` instead,
//! so drivers may switch a handle with [`Instrument::set_termination`].
//!
//! All I/O is synchronous and blocking; the layer holds no locks and no
//! shared state. A handle is exclusively owned, and callers that share one
//! across threads must serialize access themselves.

pub mod ethernet;
#[cfg(feature = "gpib")]
pub mod gpib;
pub mod mock;
#[cfg(feature = "serial")]
pub mod serial;
pub mod timeout;

pub use ethernet::EthernetInstrument;
#[cfg(feature = "gpib")]
pub use gpib::GpibInstrument;
pub use mock::MockInstrument;
#[cfg(feature = "serial")]
pub use serial::SerialInstrument;
pub use timeout::{gpib_timeout, GpibTimeout};

use std::time::Duration;

use crate::error::{LabError, Result};

/// Bytes fetched per bus or socket receive. One receive is interpreted as
/// one complete reply; longer replies are truncated.
pub const RECV_BUFFER: usize = 512;

/// Timeout applied by [`open_default`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocking query interface shared by all transports.
///
/// Operations take `&mut self`: a handle owns exactly one transport
/// resource and provides no interior locking.
pub trait Instrument: Send {
    /// Sends `command` followed by the termination sequence.
    fn write(&mut self, command: &str) -> Result<()>;

    /// Blocks until one complete reply is available and returns it with
    /// trailing whitespace and termination stripped.
    fn read(&mut self) -> Result<String>;

    /// Writes `query`, then reads the reply. Not atomic: two threads
    /// sharing a handle can interleave their write/read pairs.
    fn ask(&mut self, query: &str) -> Result<String> {
        self.write(query)?;
        self.read()
    }

    /// Flushes the device's communication buffers where the transport
    /// supports it (GPIB device clear). Default is a no-op; drivers call
    /// this before queries on instruments that leave stale replies queued.
    fn clear(&mut self) -> Result<()> {
        Ok(())
    }

    /// Replaces the termination sequence used for framing.
    fn set_termination(&mut self, term: &[u8]) -> Result<()>;

    /// Releases the transport resource. Closing twice is a no-op; any
    /// later `write` or `read` fails with [`LabError::NotConnected`].
    fn close(&mut self) -> Result<()>;
}

impl<T: Instrument + ?Sized> Instrument for Box<T> {
    fn write(&mut self, command: &str) -> Result<()> {
        (**self).write(command)
    }

    fn read(&mut self) -> Result<String> {
        (**self).read()
    }

    fn ask(&mut self, query: &str) -> Result<String> {
        (**self).ask(query)
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn set_termination(&mut self, term: &[u8]) -> Result<()> {
        (**self).set_termination(term)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Opens the instrument at `address` with [`DEFAULT_TIMEOUT`].
pub fn open_default(address: &str) -> Result<Box<dyn Instrument>> {
    open(address, DEFAULT_TIMEOUT)
}

/// Parses `address` and opens the matching transport.
///
/// `timeout` bounds connect and read/write waits. On GPIB it is mapped to
/// the nearest greater-or-equal bus timeout code (see [`timeout`]); on the
/// other transports it is applied as-is to the port or socket.
///
/// Open or connect failures surface as [`LabError::Connection`] with the
/// OS error attached; nothing is retried.
pub fn open(address: &str, timeout: Duration) -> Result<Box<dyn Instrument>> {
    let (transport, endpoint) = address
        .split_once("::")
        .ok_or_else(|| LabError::MalformedAddress(address.to_string()))?;

    match transport {
        "GPIB" | "GPIB0" => open_gpib(address, endpoint, timeout),
        "ETHER" => {
            let (host, port) = split_host_port(address, endpoint)?;
            let inst = EthernetInstrument::open(host, port, timeout)?;
            Ok(Box::new(inst))
        }
        "SERIAL" => open_serial(endpoint, timeout),
        _ => Err(LabError::UnsupportedTransport(address.to_string())),
    }
}

fn split_host_port(address: &str, endpoint: &str) -> Result<(String, u16)> {
    // Both "host:port" and "host::port" are accepted.
    let (host, port) = endpoint
        .split_once("::")
        .or_else(|| endpoint.rsplit_once(':'))
        .ok_or_else(|| LabError::MalformedAddress(address.to_string()))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| LabError::MalformedAddress(address.to_string()))?;
    Ok((host.to_string(), port))
}

fn open_gpib(address: &str, endpoint: &str, timeout: Duration) -> Result<Box<dyn Instrument>> {
    #[cfg(feature = "gpib")]
    {
        let pad = endpoint
            .trim()
            .parse::<i32>()
            .map_err(|_| LabError::MalformedAddress(address.to_string()))?;
        let inst = GpibInstrument::open(0, pad, timeout)?;
        Ok(Box::new(inst))
    }

    #[cfg(not(feature = "gpib"))]
    {
        let _ = (address, endpoint, timeout);
        Err(LabError::FeatureNotEnabled("gpib"))
    }
}

fn open_serial(endpoint: &str, timeout: Duration) -> Result<Box<dyn Instrument>> {
    #[cfg(feature = "serial")]
    {
        let inst = SerialInstrument::open(endpoint, timeout)?;
        Ok(Box::new(inst))
    }

    #[cfg(not(feature = "serial"))]
    {
        let _ = (endpoint, timeout);
        Err(LabError::FeatureNotEnabled("serial"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_separator_is_malformed() {
        let err = match open_default("GPIB24") {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, LabError::MalformedAddress(_)));
        assert!(err.to_string().contains("GPIB24"));
    }

    #[test]
    fn test_unknown_transport_token() {
        let err = match open_default("USB::0x1234") {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, LabError::UnsupportedTransport(_)));
    }

    #[test]
    fn test_transport_token_is_case_sensitive() {
        assert!(matches!(
            open_default("gpib::24"),
            Err(LabError::UnsupportedTransport(_))
        ));
        assert!(matches!(
            open_default("Ether::localhost:5025"),
            Err(LabError::UnsupportedTransport(_))
        ));
    }

    #[test]
    fn test_ether_without_port_is_malformed() {
        assert!(matches!(
            open_default("ETHER::localhost"),
            Err(LabError::MalformedAddress(_))
        ));
    }

    #[test]
    fn test_ether_bad_port_is_malformed() {
        assert!(matches!(
            open_default("ETHER::localhost:spam"),
            Err(LabError::MalformedAddress(_))
        ));
    }

    #[test]
    fn test_host_port_forms() {
        let (host, port) = split_host_port("ETHER::10.0.0.7:5025", "10.0.0.7:5025")
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(host, "10.0.0.7");
        assert_eq!(port, 5025);

        let (host, port) = split_host_port("ETHER::10.0.0.7::5025", "10.0.0.7::5025")
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(host, "10.0.0.7");
        assert_eq!(port, 5025);
    }

    #[cfg(feature = "gpib")]
    #[test]
    fn test_gpib_address_must_be_integer() {
        assert!(matches!(
            open_default("GPIB::twentyfour"),
            Err(LabError::MalformedAddress(_))
        ));
    }
}
