//! Protocol Module
//!
//! Wire protocol between a `VerifyingLockFactory` and a `LockVerifyServer`.
//!
//! ## Exchange
//! One TCP connection per lock transition:
//! ```text
//! client                         server
//!   │──── connect ─────────────────►│
//!   │──── [client_id, event] ──────►│
//!   │◄─── [result] ─────────────────│
//!   │──── close ───────────────────►│
//! ```
//!
//! ### Events
//! - 0x00: about to release
//! - 0x01: just obtained
//!
//! ### Results
//! - 0x00: OK
//! - nonzero: mutual exclusion violated

mod codec;
mod request;
mod response;

pub use codec::{
    decode_request, decode_response, encode_request, encode_response, read_request,
    read_response, write_request, write_response, REQUEST_SIZE, RESPONSE_SIZE,
};
pub use request::{LockEvent, VerifyRequest};
pub use response::VerifyStatus;
