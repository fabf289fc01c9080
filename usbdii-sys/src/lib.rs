//! Declarations for the Decision Computer `dcihid` library, which drives the
//! USBDII family of USB-HID digital I/O cards through the hiddev interface.
//!
//! Matches the prototypes in the vendor `dcihid.h`.

use std::os::raw::{c_char, c_uint};

/// Value returned by [`dcihid_open`] when the device could not be opened.
pub const INVALID_HANDLE: u32 = u32::MAX;

extern "C" {
    /// Opens the hiddev node at `dev_name` and matches it against the card
    /// type `card_id` and unit number `card_num`. Returns a handle, or
    /// `INVALID_HANDLE` / 0 on failure.
    pub fn dcihid_open(dev_name: *const c_char, card_id: c_uint, card_num: c_uint) -> u32;

    /// Releases a handle obtained from [`dcihid_open`]. Negative on failure.
    pub fn dcihid_close(handle: u32) -> i32;

    /// Writes `data` to the output port at `addr`. Negative on failure.
    pub fn dcihid_write(handle: u32, addr: u32, data: u32) -> i32;

    /// Reads the port at `addr` into `data`. Negative on failure.
    pub fn dcihid_read(handle: u32, addr: u32, data: *mut u8) -> i32;
}
