//! Verification client
//!
//! Opens a fresh connection per report, as the verifier expects.

use std::net::TcpStream;
use std::time::Duration;

use crate::error::{Result, StoreError};
use crate::protocol::{read_response, write_request, VerifyRequest, VerifyStatus};

/// Socket timeout for one exchange
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Report `request` to the verifier at `addr` and return its verdict.
///
/// Connectivity problems are `Network` errors; they are never treated as an
/// OK verdict.
pub fn send_event(addr: &str, request: VerifyRequest) -> Result<VerifyStatus> {
    let mut stream = TcpStream::connect(addr)
        .map_err(|e| StoreError::Network(format!("connect to verifier {} failed: {}", addr, e)))?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(EXCHANGE_TIMEOUT))?;
    stream.set_write_timeout(Some(EXCHANGE_TIMEOUT))?;

    write_request(&mut stream, &request).map_err(|e| network_error(addr, e))?;
    let status = read_response(&mut stream).map_err(|e| network_error(addr, e))?;

    tracing::trace!("Verifier {} answered {:?} to {:?}", addr, status, request);
    Ok(status)
}

fn network_error(addr: &str, e: StoreError) -> StoreError {
    match e {
        StoreError::Io(io) => StoreError::Network(format!("verifier {}: {}", addr, io)),
        other => other,
    }
}
