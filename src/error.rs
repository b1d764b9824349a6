//! Error types for indexstore
//!
//! Provides a unified error type for directory, stream and lock operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for indexstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("IO error on {name}: {source}")]
    FileIo {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Directory does not exist: {}", .0.display())]
    NoSuchDirectory(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Read past EOF: {name}")]
    ReadPastEof { name: String },

    #[error(
        "Read of {name} failed with chunk size {chunk_size}; \
         consider lowering the read chunk size: {source}"
    )]
    ChunkRead {
        name: String,
        chunk_size: usize,
        #[source]
        source: io::Error,
    },

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt data: {0}")]
    Corrupt(String),

    // -------------------------------------------------------------------------
    // Lifecycle / Configuration Errors
    // -------------------------------------------------------------------------
    #[error("{0} is closed")]
    AlreadyClosed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    // -------------------------------------------------------------------------
    // Lock Errors
    // -------------------------------------------------------------------------
    #[error("Lock obtain timed out: {message}{}", cause_suffix(.cause))]
    LockObtainFailed {
        message: String,
        cause: Option<String>,
    },

    #[error("Lock release failed: {0}")]
    LockReleaseFailed(String),

    #[error("Lock verification failed: {0}")]
    Verification(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl StoreError {
    /// Wrap an io::Error with the name of the file it concerns
    pub fn file(name: impl Into<String>, source: io::Error) -> Self {
        let name = name.into();
        if source.kind() == io::ErrorKind::NotFound {
            return StoreError::FileNotFound(name);
        }
        StoreError::FileIo { name, source }
    }

    /// True for the timeout condition a caller may retry
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, StoreError::LockObtainFailed { .. })
    }
}

fn cause_suffix(cause: &Option<String>) -> String {
    match cause {
        Some(c) => format!(" (caused by: {})", c),
        None => String::new(),
    }
}
