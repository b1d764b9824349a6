//! Network Module
//!
//! Lock verification over TCP.
//!
//! ## Architecture
//! - `LockVerifyServer`: single acceptor thread, connections handled in order
//! - `Connection`: one request/response exchange per socket
//! - `send_event`: client side, used by `VerifyingLockFactory`

mod client;
mod connection;
mod server;

pub use client::send_event;
pub use connection::Connection;
pub use server::{LockVerifyServer, ShutdownHandle, VerifierState};
