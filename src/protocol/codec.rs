//! Protocol codec
//!
//! Encoding and decoding functions for the verification protocol.
//!
//! ## Wire Format
//!
//! ### Request
//! ```text
//! ┌──────────────┬──────────────┐
//! │ ClientId (1) │  Event (1)   │
//! └──────────────┴──────────────┘
//! ```
//!
//! ### Response
//! ```text
//! ┌──────────────┐
//! │  Result (1)  │
//! └──────────────┘
//! ```

use std::io::{Read, Write};

use crate::error::{Result, StoreError};

use super::{LockEvent, VerifyRequest, VerifyStatus};

/// Request frame size: client id + event code
pub const REQUEST_SIZE: usize = 2;

/// Response frame size: result byte
pub const RESPONSE_SIZE: usize = 1;

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request to bytes
pub fn encode_request(request: &VerifyRequest) -> [u8; REQUEST_SIZE] {
    [request.client_id, request.event as u8]
}

/// Decode a request from bytes
pub fn decode_request(bytes: &[u8]) -> Result<VerifyRequest> {
    if bytes.len() != REQUEST_SIZE {
        return Err(StoreError::Protocol(format!(
            "Bad request size: expected {} bytes, got {}",
            REQUEST_SIZE,
            bytes.len()
        )));
    }

    Ok(VerifyRequest {
        client_id: bytes[0],
        event: LockEvent::from_u8(bytes[1])?,
    })
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
pub fn encode_response(status: VerifyStatus) -> [u8; RESPONSE_SIZE] {
    [status as u8]
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<VerifyStatus> {
    match bytes {
        [code] => Ok(VerifyStatus::from_u8(*code)),
        _ => Err(StoreError::Protocol(format!(
            "Bad response size: expected {} byte, got {}",
            RESPONSE_SIZE,
            bytes.len()
        ))),
    }
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one request from a stream
pub fn read_request<R: Read>(reader: &mut R) -> Result<VerifyRequest> {
    let mut frame = [0u8; REQUEST_SIZE];
    reader.read_exact(&mut frame)?;
    decode_request(&frame)
}

/// Write one request to a stream
pub fn write_request<W: Write>(writer: &mut W, request: &VerifyRequest) -> Result<()> {
    writer.write_all(&encode_request(request))?;
    writer.flush()?;
    Ok(())
}

/// Read one response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<VerifyStatus> {
    let mut frame = [0u8; RESPONSE_SIZE];
    reader.read_exact(&mut frame)?;
    decode_response(&frame)
}

/// Write one response to a stream
pub fn write_response<W: Write>(writer: &mut W, status: VerifyStatus) -> Result<()> {
    writer.write_all(&encode_response(status))?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_request_wire_bytes() {
        assert_eq!(encode_request(&VerifyRequest::obtained(7)), [7, 1]);
        assert_eq!(encode_request(&VerifyRequest::released(0)), [0, 0]);
    }

    #[test]
    fn test_decode_request() {
        let request = decode_request(&[42, 1]).unwrap();
        assert_eq!(request.client_id, 42);
        assert_eq!(request.event, LockEvent::Obtained);
    }

    #[test]
    fn test_decode_request_unknown_event() {
        assert!(matches!(decode_request(&[1, 9]), Err(StoreError::Protocol(_))));
    }

    #[test]
    fn test_decode_request_wrong_size() {
        assert!(decode_request(&[1]).is_err());
        assert!(decode_request(&[1, 0, 0]).is_err());
    }

    #[test]
    fn test_any_nonzero_response_is_violation() {
        assert_eq!(decode_response(&[0]).unwrap(), VerifyStatus::Ok);
        assert_eq!(decode_response(&[1]).unwrap(), VerifyStatus::Violation);
        assert_eq!(decode_response(&[200]).unwrap(), VerifyStatus::Violation);
        assert!(decode_response(&[]).is_err());
    }

    #[test]
    fn test_stream_helpers() {
        let mut wire = Vec::new();
        write_request(&mut wire, &VerifyRequest::released(3)).unwrap();
        write_response(&mut wire, VerifyStatus::Violation).unwrap();
        assert_eq!(wire, vec![3, 0, 1]);

        let mut cursor = Cursor::new(wire);
        assert_eq!(read_request(&mut cursor).unwrap(), VerifyRequest::released(3));
        assert_eq!(read_response(&mut cursor).unwrap(), VerifyStatus::Violation);
    }

    #[test]
    fn test_truncated_request_is_eof() {
        let mut cursor = Cursor::new(vec![5u8]);
        match read_request(&mut cursor) {
            Err(StoreError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
