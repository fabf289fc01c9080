//! Scripted stand-in transport for tests and dry runs.

use std::collections::VecDeque;
use std::io;

use crate::error::{LabError, Result};
use crate::visa::Instrument;

/// In-memory [`Instrument`] that records every written command.
///
/// Two flavors: [`MockInstrument::echo`] answers each `read` with the most
/// recently written command (handy for transport-contract tests), and
/// [`MockInstrument::with_replies`] plays back a fixed reply script (handy
/// for driver tests). Reading past the script, or reading in echo mode
/// with nothing written, behaves like a silent device: a timed-out
/// transport error.
pub struct MockInstrument {
    replies: VecDeque<String>,
    echo: bool,
    last_written: Option<String>,
    written: Vec<String>,
    clears: usize,
    term: Vec<u8>,
    closed: bool,
}

impl MockInstrument {
    /// A mock whose every reply echoes the last written command.
    pub fn echo() -> Self {
        Self {
            replies: VecDeque::new(),
            echo: true,
            last_written: None,
            written: Vec::new(),
            clears: 0,
            term: b"\n".to_vec(),
            closed: false,
        }
    }

    /// A mock that answers `read` calls from `replies`, in order.
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            echo: false,
            last_written: None,
            written: Vec::new(),
            clears: 0,
            term: b"\n".to_vec(),
            closed: false,
        }
    }

    /// Every command written so far, oldest first, without termination.
    pub fn written_commands(&self) -> &[String] {
        &self.written
    }

    /// How many times `clear` was called.
    pub fn clears(&self) -> usize {
        self.clears
    }

    /// The termination sequence currently configured on the handle.
    pub fn termination(&self) -> &[u8] {
        &self.term
    }

    fn silent() -> LabError {
        LabError::Transport(io::Error::new(io::ErrorKind::TimedOut, "no scripted reply"))
    }
}

impl Instrument for MockInstrument {
    fn write(&mut self, command: &str) -> Result<()> {
        if self.closed {
            return Err(LabError::NotConnected);
        }
        self.written.push(command.to_string());
        self.last_written = Some(command.to_string());
        Ok(())
    }

    fn read(&mut self) -> Result<String> {
        if self.closed {
            return Err(LabError::NotConnected);
        }
        if self.echo {
            return self.last_written.take().ok_or_else(Self::silent);
        }
        self.replies.pop_front().ok_or_else(Self::silent)
    }

    fn clear(&mut self) -> Result<()> {
        if self.closed {
            return Err(LabError::NotConnected);
        }
        self.clears += 1;
        Ok(())
    }

    fn set_termination(&mut self, term: &[u8]) -> Result<()> {
        self.term = term.to_vec();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
