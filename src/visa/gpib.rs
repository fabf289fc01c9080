//! GPIB bus transport via the linux-gpib user library.

#![allow(unsafe_code)]

use std::ffi::CStr;
use std::io;
use std::os::raw::{c_int, c_long, c_void};
use std::time::Duration;

use log::debug;

use crate::error::{LabError, Result};
use crate::visa::timeout::gpib_timeout;
use crate::visa::{Instrument, RECV_BUFFER};

/// Instrument handle for one primary address on a GPIB board.
///
/// Commands are framed with `"\n"` by default. A reply is one bus read of
/// up to [`RECV_BUFFER`] bytes with trailing whitespace stripped. The
/// caller timeout is mapped to the bus timeout ladder at open time.
pub struct GpibInstrument {
    ud: Option<c_int>,
    term: Vec<u8>,
}

/// Maps an `ERR` status word to the thread's current bus error.
fn check(call: &'static str, status: c_int) -> Result<()> {
    if status & gpib_sys::ERR == 0 {
        return Ok(());
    }
    let message = unsafe {
        let code = gpib_sys::ThreadIberr();
        let text = gpib_sys::gpib_error_string(code);
        if text.is_null() {
            format!("iberr {code}")
        } else {
            CStr::from_ptr(text).to_string_lossy().into_owned()
        }
    };
    Err(LabError::Gpib {
        call,
        status,
        message,
    })
}

impl GpibInstrument {
    /// Opens primary address `pad` on `board`, with `timeout` rounded up to
    /// the nearest bus timeout code.
    pub fn open(board: i32, pad: i32, timeout: Duration) -> Result<Self> {
        let code = gpib_timeout(timeout);
        let ud = unsafe { gpib_sys::ibdev(board, pad, 0, code.code(), 1, 0) };
        if ud < 0 {
            return Err(LabError::Connection {
                target: format!("GPIB{board}::{pad}"),
                source: io::Error::new(io::ErrorKind::NotFound, "ibdev returned no descriptor"),
            });
        }
        debug!("opened GPIB{board}::{pad} with timeout code {:?}", code);
        Ok(Self {
            ud: Some(ud),
            term: b"\n".to_vec(),
        })
    }
}

impl Instrument for GpibInstrument {
    fn write(&mut self, command: &str) -> Result<()> {
        let ud = self.ud.ok_or(LabError::NotConnected)?;
        let mut payload = Vec::with_capacity(command.len() + self.term.len());
        payload.extend_from_slice(command.as_bytes());
        payload.extend_from_slice(&self.term);
        let status =
            unsafe { gpib_sys::ibwrt(ud, payload.as_ptr() as *const c_void, payload.len() as c_long) };
        check("ibwrt", status)
    }

    fn read(&mut self) -> Result<String> {
        let ud = self.ud.ok_or(LabError::NotConnected)?;
        let mut buf = [0u8; RECV_BUFFER];
        let status =
            unsafe { gpib_sys::ibrd(ud, buf.as_mut_ptr() as *mut c_void, buf.len() as c_long) };
        check("ibrd", status)?;
        let n = (unsafe { gpib_sys::ThreadIbcnt() } as usize).min(buf.len());
        Ok(String::from_utf8_lossy(&buf[..n]).trim_end().to_string())
    }

    fn clear(&mut self) -> Result<()> {
        let ud = self.ud.ok_or(LabError::NotConnected)?;
        let status = unsafe { gpib_sys::ibclr(ud) };
        check("ibclr", status)
    }

    fn set_termination(&mut self, term: &[u8]) -> Result<()> {
        let ud = self.ud.ok_or(LabError::NotConnected)?;
        // Reads stop on the final byte of the sequence; an empty sequence
        // turns end-of-string recognition off again.
        let eos = match term.last() {
            Some(&byte) => gpib_sys::REOS | c_int::from(byte),
            None => 0,
        };
        let status = unsafe { gpib_sys::ibeos(ud, eos) };
        check("ibeos", status)?;
        self.term = term.to_vec();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(ud) = self.ud.take() {
            let status = unsafe { gpib_sys::ibonl(ud, 0) };
            check("ibonl", status)?;
        }
        Ok(())
    }
}
