//! Stream transports for network-attached devices.
//!
//! A [`Dialer`] opens one [`Connection`] per request. Connections must never block forever:
//! [`TcpDialer`] applies the caller's timeout to connect, read and write.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::TransportError;

/// Bidirectional byte stream to a device.
pub trait Connection: Read + Write + Send {}

impl<T: Read + Write + Send> Connection for T {}

/// Opens connections to `host:port` style addresses.
pub trait Dialer: Send + Sync {
    /// Connect to `address`, giving up after `timeout`.
    fn dial(&self, address: &str, timeout: Duration) -> Result<Box<dyn Connection>, TransportError>;
}

/// Map an I/O error, turning timeouts into [`TransportError::Timeout`].
pub fn io_error(err: io::Error, timeout: Duration) -> TransportError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout(timeout),
        _ => TransportError::Io(err),
    }
}

/// Plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    fn dial(&self, address: &str, timeout: Duration) -> Result<Box<dyn Connection>, TransportError> {
        let addr = address
            .to_socket_addrs()
            .map_err(|e| io_error(e, timeout))?
            .next()
            .ok_or_else(|| TransportError::Protocol(format!("{address} did not resolve")))?;

        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| io_error(e, timeout))?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|e| io_error(e, timeout))?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(|e| io_error(e, timeout))?;
        debug!(%addr, "connected");
        Ok(Box::new(stream))
    }
}

// =============================================================================
// Mock dialer
// =============================================================================

#[derive(Debug, Default)]
struct MockDialerState {
    responses: VecDeque<Vec<u8>>,
    sessions: Vec<(String, Vec<u8>)>,
    failing_dials: usize,
}

/// In-memory dialer.
///
/// Each dial consumes the next queued response as the bytes the peer sends back (EOF when
/// none is queued) and records everything the client writes.
#[derive(Debug, Default, Clone)]
pub struct MockDialer {
    state: Arc<Mutex<MockDialerState>>,
}

impl MockDialer {
    /// Dialer with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes the next connection will read.
    pub fn queue_response(&self, bytes: impl Into<Vec<u8>>) {
        self.state.lock().responses.push_back(bytes.into());
    }

    /// Fail the next `count` dials with a timeout.
    pub fn fail_next_dials(&self, count: usize) {
        self.state.lock().failing_dials = count;
    }

    /// `(address, bytes written)` per connection, oldest first.
    pub fn sessions(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().sessions.clone()
    }
}

impl Dialer for MockDialer {
    fn dial(&self, address: &str, timeout: Duration) -> Result<Box<dyn Connection>, TransportError> {
        let mut state = self.state.lock();
        if state.failing_dials > 0 {
            state.failing_dials -= 1;
            return Err(TransportError::Timeout(timeout));
        }
        let response = state.responses.pop_front().unwrap_or_default();
        state.sessions.push((address.to_string(), Vec::new()));
        Ok(Box::new(MockConnection {
            input: io::Cursor::new(response),
            session: state.sessions.len() - 1,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockConnection {
    input: io::Cursor<Vec<u8>>,
    session: usize,
    state: Arc<Mutex<MockDialerState>>,
}

impl Read for MockConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for MockConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if let Some((_, sent)) = state.sessions.get_mut(self.session) {
            sent.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
