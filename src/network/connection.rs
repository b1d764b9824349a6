//! Connection Handler
//!
//! Handles one verification exchange per client connection.

use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::protocol::{read_request, write_response, VerifyStatus};

use super::server::VerifierState;

/// Handles a single client connection
pub struct Connection {
    /// Client socket
    stream: TcpStream,

    /// Holder bookkeeping shared with the server
    state: Arc<Mutex<VerifierState>>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Wrap an accepted socket
    pub fn new(stream: TcpStream, state: Arc<Mutex<VerifierState>>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Accepted sockets may inherit the listener's non-blocking mode
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            state,
            peer_addr,
        })
    }

    /// Configure connection timeouts
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.stream
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.stream
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Read one request, record it and answer.
    ///
    /// Returns the verdict, or `None` when the client went away without
    /// sending a complete request.
    pub fn handle(&mut self) -> Result<Option<VerifyStatus>> {
        let request = match read_request(&mut self.stream) {
            Ok(request) => request,
            Err(StoreError::Io(ref e)) if is_disconnect(e.kind()) => {
                tracing::debug!("Client {} disconnected before sending a request", self.peer_addr);
                return Ok(None);
            }
            Err(StoreError::Io(ref e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                tracing::debug!("Read timeout for client {}", self.peer_addr);
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!("Bad request from {}: {}", self.peer_addr, e);
                return Err(e);
            }
        };

        tracing::trace!("Received {:?} from {}", request, self.peer_addr);
        let status = self.state.lock().apply(request);

        if let Err(e) = write_response(&mut self.stream, status) {
            if let StoreError::Io(ref io_err) = e {
                if is_disconnect(io_err.kind()) {
                    tracing::debug!(
                        "Client {} disconnected before response could be sent: {}",
                        self.peer_addr,
                        e
                    );
                    return Ok(Some(status));
                }
            }
            tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
            return Err(e);
        }

        Ok(Some(status))
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}
