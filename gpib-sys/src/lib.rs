//! Hand-written declarations for the subset of the linux-gpib user API used
//! by the transport layer: device open/offline, buffered read/write, device
//! clear, timeout and end-of-string configuration, and the thread-local
//! status accessors.
//!
//! Status words, error codes and timeout codes follow `gpib/ib.h`.

#![allow(non_upper_case_globals)]

use std::os::raw::{c_char, c_int, c_long, c_void};

// ibsta status bits.
/// Function call terminated on error.
pub const ERR: c_int = 1 << 15;
/// Timeout limit exceeded.
pub const TIMO: c_int = 1 << 14;
/// EOI asserted or EOS byte received.
pub const END: c_int = 1 << 13;
/// I/O completed.
pub const CMPL: c_int = 1 << 8;

// ibeos mode bits (high byte of the ibeos argument).
/// Terminate reads when the EOS byte is received.
pub const REOS: c_int = 0x400;
/// Assert EOI whenever the EOS byte is sent.
pub const XEOS: c_int = 0x800;
/// Compare all eight bits of the EOS byte rather than seven.
pub const BIN: c_int = 0x1000;

// Timeout codes for ibtmo / the ibdev tmo argument.
/// No timeout.
pub const TNONE: c_int = 0;
/// 10 microseconds.
pub const T10us: c_int = 1;
/// 30 microseconds.
pub const T30us: c_int = 2;
/// 100 microseconds.
pub const T100us: c_int = 3;
/// 300 microseconds.
pub const T300us: c_int = 4;
/// 1 millisecond.
pub const T1ms: c_int = 5;
/// 3 milliseconds.
pub const T3ms: c_int = 6;
/// 10 milliseconds.
pub const T10ms: c_int = 7;
/// 30 milliseconds.
pub const T30ms: c_int = 8;
/// 100 milliseconds.
pub const T100ms: c_int = 9;
/// 300 milliseconds.
pub const T300ms: c_int = 10;
/// 1 second.
pub const T1s: c_int = 11;
/// 3 seconds.
pub const T3s: c_int = 12;
/// 10 seconds.
pub const T10s: c_int = 13;
/// 30 seconds.
pub const T30s: c_int = 14;
/// 100 seconds.
pub const T100s: c_int = 15;
/// 300 seconds.
pub const T300s: c_int = 16;
/// 1000 seconds.
pub const T1000s: c_int = 17;

extern "C" {
    /// Opens a device descriptor on `board_index` for primary address `pad`.
    /// Returns a unit descriptor, or a negative value on failure.
    pub fn ibdev(
        board_index: c_int,
        pad: c_int,
        sad: c_int,
        tmo: c_int,
        send_eoi: c_int,
        eosmode: c_int,
    ) -> c_int;

    /// Reads up to `cnt` bytes into `buf`. Returns the status word.
    pub fn ibrd(ud: c_int, buf: *mut c_void, cnt: c_long) -> c_int;

    /// Writes `cnt` bytes from `buf`. Returns the status word.
    pub fn ibwrt(ud: c_int, buf: *const c_void, cnt: c_long) -> c_int;

    /// Sends Selected Device Clear to the device. Returns the status word.
    pub fn ibclr(ud: c_int) -> c_int;

    /// Sets the I/O timeout to one of the `T*` codes. Returns the status word.
    pub fn ibtmo(ud: c_int, tmo: c_int) -> c_int;

    /// Configures end-of-string recognition; low byte of `v` is the EOS
    /// character, high bits are `REOS`/`XEOS`/`BIN`. Returns the status word.
    pub fn ibeos(ud: c_int, v: c_int) -> c_int;

    /// Takes the descriptor offline (`onl == 0`) or resets it. Returns the
    /// status word.
    pub fn ibonl(ud: c_int, onl: c_int) -> c_int;

    /// Thread-local copy of the status word after the last call.
    pub fn ThreadIbsta() -> c_int;

    /// Thread-local error code valid when `ERR` is set in the status word.
    pub fn ThreadIberr() -> c_int;

    /// Thread-local count of bytes transferred by the last read or write.
    pub fn ThreadIbcnt() -> c_int;

    /// Human-readable description of an `iberr` code.
    pub fn gpib_error_string(error: c_int) -> *const c_char;
}
