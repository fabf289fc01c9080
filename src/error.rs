//! Custom error types for the crate.
//!
//! This module defines the primary error type, `LabError`, used across the
//! transport layer and every device driver. Using the `thiserror` crate, it
//! provides one consistent surface for everything that can go wrong between
//! a method call and a parsed instrument reply.
//!
//! ## Error Hierarchy
//!
//! `LabError` consolidates the following sources:
//!
//! - **`MalformedAddress` / `UnsupportedTransport`**: the instrument address
//!   string handed to the factory did not parse, or named a transport this
//!   crate does not know. Raised before any resource is opened.
//! - **`Connection`**: opening the transport failed at the OS or driver
//!   level (socket connect refused, serial port missing, GPIB board absent).
//!   Carries the endpoint and the underlying I/O error.
//! - **`Transport`**: a write or read failed on an already-open handle,
//!   including reads that timed out. Wraps `std::io::Error`.
//! - **`NotConnected`**: an operation was attempted on a handle that has
//!   been closed.
//! - **`ReplyParse`**: the device answered, but the reply did not have the
//!   shape the driver expected.
//! - **`Device`**: the device itself reported a fault (negative acknowledge,
//!   gauge error state, Modbus exception).
//! - **`ChannelOutOfRange` / `InvalidInput`**: a driver argument was outside
//!   the device's accepted domain in a way that clamping does not cover.
//! - **`FeatureNotEnabled`**: the address named a transport whose support
//!   was not compiled in, with a hint on which feature to rebuild with.
//!
//! Errors propagate immediately via `?`; nothing in this crate retries or
//! swallows a failure.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, LabError>;

#[derive(Error, Debug)]
pub enum LabError {
    #[error("'{0}' is not a legal instrument address")]
    MalformedAddress(String),

    #[error("unsupported transport type in '{0}'")]
    UnsupportedTransport(String),

    #[error("failed to connect to '{target}': {source}")]
    Connection {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transport I/O error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("instrument handle is closed")]
    NotConnected,

    #[error("could not parse reply '{reply}': expected {expected}")]
    ReplyParse { reply: String, expected: &'static str },

    #[error("device fault: {0}")]
    Device(String),

    #[error("channel {channel} out of range, device has {max}")]
    ChannelOutOfRange { channel: usize, max: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("support for '{0}' is not enabled. Rebuild with --features {0}")]
    FeatureNotEnabled(&'static str),

    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("no instrument named '{0}' in the lab configuration")]
    UnknownInstrument(String),

    #[cfg(feature = "gpib")]
    #[error("GPIB {call} failed: {message} (status {status:#06x})")]
    Gpib {
        call: &'static str,
        status: i32,
        message: String,
    },

    #[cfg(feature = "modbus")]
    #[error("Modbus CRC mismatch: expected {expected:#06x}, received {received:#06x}")]
    CrcMismatch { expected: u16, received: u16 },

    #[cfg(feature = "modbus")]
    #[error("Modbus exception from slave {slave}: code {code:#04x}")]
    ModbusException { slave: u8, code: u8 },

    #[cfg(feature = "modbus")]
    #[error("malformed Modbus frame: {0}")]
    ModbusFrame(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LabError::MalformedAddress("GPIB24".to_string());
        assert_eq!(err.to_string(), "'GPIB24' is not a legal instrument address");
    }

    #[test]
    fn test_reply_parse_display() {
        let err = LabError::ReplyParse {
            reply: "R?12".into(),
            expected: "numeric field after the status character",
        };
        assert!(err.to_string().contains("R?12"));
        assert!(err.to_string().contains("numeric field"));
    }

    #[test]
    fn test_feature_hint_names_the_feature() {
        let err = LabError::FeatureNotEnabled("gpib");
        assert!(err.to_string().contains("--features gpib"));
    }
}
