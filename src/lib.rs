//! # indexstore
//!
//! Storage layer for a disk-backed search index:
//! - A `Directory` abstraction over a flat set of named, write-once files
//! - Buffered binary streams with big-endian and variable-length encodings
//! - Filesystem and in-memory directories
//! - Cross-process index locks, plus a TCP verifier for stress-testing them
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Index layers (callers)                   │
//! └──────────────┬───────────────────────────────┬──────────────┘
//!                │                               │
//! ┌──────────────▼──────────────┐  ┌─────────────▼──────────────┐
//! │          Directory          │  │        LockFactory         │
//! │   FsDirectory / RamDirectory│──►  NoLock / SingleInstance / │
//! └──────────────┬──────────────┘  │  SimpleFs / NativeFs /     │
//!                │                 │  Verifying                 │
//! ┌──────────────▼──────────────┐  └─────────────┬──────────────┘
//! │  IndexOutput / IndexInput   │                │ 2-byte report
//! │  (buffered, chunked reads)  │  ┌─────────────▼──────────────┐
//! └─────────────────────────────┘  │      LockVerifyServer      │
//!                                  └────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod lock;
pub mod network;
pub mod protocol;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use error::{Result, StoreError};
pub use lock::{Lock, LockFactory, LOCK_OBTAIN_WAIT_FOREVER};
pub use store::{DataInput, DataOutput, Directory, FsDirectory, IndexInput, IndexOutput, RamDirectory};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of indexstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
