//! TCP socket transport for LAN-attached instruments.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;

use crate::error::{LabError, Result};
use crate::visa::{Instrument, RECV_BUFFER};

/// Instrument handle over a connected TCP stream.
///
/// Commands are framed with `"\n"` by default. A reply is whatever one
/// socket receive returns, up to [`RECV_BUFFER`] bytes; replies longer than
/// that are truncated and no reassembly across receives is attempted. This
/// is a known limitation of the interface, adequate for the short textual
/// replies lab instruments produce.
pub struct EthernetInstrument {
    stream: Option<TcpStream>,
    term: Vec<u8>,
}

impl EthernetInstrument {
    /// Connects to `host:port`, applying `timeout` to the connect attempt
    /// and to every subsequent read and write. A zero timeout disables the
    /// I/O deadline entirely.
    pub fn open(host: impl AsRef<str>, port: u16, timeout: Duration) -> Result<Self> {
        let target = format!("{}:{}", host.as_ref(), port);
        let connect = |target: &str| -> io::Result<TcpStream> {
            let addr = target.to_socket_addrs()?.next().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "host did not resolve")
            })?;
            let stream = if timeout.is_zero() {
                TcpStream::connect(addr)?
            } else {
                TcpStream::connect_timeout(&addr, timeout)?
            };
            let io_timeout = (!timeout.is_zero()).then_some(timeout);
            stream.set_read_timeout(io_timeout)?;
            stream.set_write_timeout(io_timeout)?;
            Ok(stream)
        };

        let stream = connect(&target).map_err(|source| LabError::Connection {
            target: target.clone(),
            source,
        })?;
        debug!("connected to {target}");

        Ok(Self {
            stream: Some(stream),
            term: b"\n".to_vec(),
        })
    }
}

impl Instrument for EthernetInstrument {
    fn write(&mut self, command: &str) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(LabError::NotConnected)?;
        let mut payload = Vec::with_capacity(command.len() + self.term.len());
        payload.extend_from_slice(command.as_bytes());
        payload.extend_from_slice(&self.term);
        // write_all loops over partial sends until the payload is out.
        stream.write_all(&payload)?;
        Ok(())
    }

    fn read(&mut self) -> Result<String> {
        let stream = self.stream.as_mut().ok_or(LabError::NotConnected)?;
        let mut buf = [0u8; RECV_BUFFER];
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(LabError::Transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            )));
        }
        Ok(String::from_utf8_lossy(&buf[..n]).trim_end().to_string())
    }

    fn set_termination(&mut self, term: &[u8]) -> Result<()> {
        self.term = term.to_vec();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the stream closes the socket.
        self.stream.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn loopback_pair() -> (EthernetInstrument, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let inst = EthernetInstrument::open("127.0.0.1", port, Duration::from_secs(1))
            .expect("connect");
        let (peer, _) = listener.accept().expect("accept");
        (inst, peer)
    }

    #[test]
    fn test_write_appends_newline() {
        let (mut inst, mut peer) = loopback_pair();
        inst.write("FOO").expect("write");
        let mut buf = [0u8; 8];
        let n = peer.read(&mut buf).expect("peer read");
        assert_eq!(&buf[..n], b"FOO\n");
    }

    #[test]
    fn test_read_strips_termination() {
        let (mut inst, mut peer) = loopback_pair();
        peer.write_all(b"42.0\r\n").expect("peer write");
        assert_eq!(inst.read().expect("read"), "42.0");
    }

    #[test]
    fn test_peer_close_is_a_transport_error() {
        let (mut inst, peer) = loopback_pair();
        drop(peer);
        assert!(matches!(inst.read(), Err(LabError::Transport(_))));
    }

    #[test]
    fn test_closed_handle_rejects_io() {
        let (mut inst, _peer) = loopback_pair();
        inst.close().expect("close");
        inst.close().expect("second close is a no-op");
        assert!(matches!(inst.write("FOO"), Err(LabError::NotConnected)));
        assert!(matches!(inst.read(), Err(LabError::NotConnected)));
    }

    #[test]
    fn test_refused_connection_maps_to_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        let err = match EthernetInstrument::open("127.0.0.1", port, Duration::from_millis(200)) {
            Err(e) => e,
            Ok(_) => return, // port was rebound by something else; nothing to assert
        };
        assert!(matches!(err, LabError::Connection { .. }));
    }
}
