//! Request definitions
//!
//! One lock transition reported by a client.

use crate::error::{Result, StoreError};

/// Lock transition being reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LockEvent {
    /// About to release the lock
    Released = 0x00,
    /// Just obtained the lock
    Obtained = 0x01,
}

impl LockEvent {
    /// Parse a wire event code
    pub fn from_u8(code: u8) -> Result<Self> {
        match code {
            0x00 => Ok(LockEvent::Released),
            0x01 => Ok(LockEvent::Obtained),
            _ => Err(StoreError::Protocol(format!(
                "Unknown lock event: 0x{:02x}",
                code
            ))),
        }
    }
}

impl std::fmt::Display for LockEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockEvent::Released => write!(f, "release"),
            LockEvent::Obtained => write!(f, "obtain"),
        }
    }
}

/// A client's report of one lock transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyRequest {
    /// Caller-chosen id of the reporting process
    pub client_id: u8,

    pub event: LockEvent,
}

impl VerifyRequest {
    pub fn obtained(client_id: u8) -> Self {
        Self {
            client_id,
            event: LockEvent::Obtained,
        }
    }

    pub fn released(client_id: u8) -> Self {
        Self {
            client_id,
            event: LockEvent::Released,
        }
    }
}
