//! Store Module
//!
//! Named-file storage for index data.
//!
//! ## Layers
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Directory (FsDirectory / RamDirectory)       │
//! │   list / exists / length / delete / sync ... │
//! └──────────────┬───────────────────────────────┘
//!                │ create_output / open_input
//! ┌──────────────▼───────────────────────────────┐
//! │ BufferedOutput / BufferedInput               │
//! │   DataOutput / DataInput encodings           │
//! └──────────────┬───────────────────────────────┘
//!                │ write_raw / read_raw
//! ┌──────────────▼───────────────────────────────┐
//! │ RawOutput / RawInput (file or Vec<u8>)       │
//! └──────────────────────────────────────────────┘
//! ```

mod buffered;
mod checksum;
mod directory;
mod fs_directory;
mod ram_directory;
mod stream;

pub use buffered::{BufferedInput, BufferedOutput, RawInput, RawOutput};
pub use checksum::{ChecksumInput, ChecksumOutput};
pub use directory::{copy, Directory};
pub use fs_directory::{sync_with_retry, FsDirectory};
pub use ram_directory::RamDirectory;
pub use stream::{DataInput, DataOutput, IndexInput, IndexOutput};

// =============================================================================
// Shared Constants
// =============================================================================

/// Default buffer size of buffered streams (16 KiB).
///
/// Visible to callers: writes up to this size are absorbed by the buffer,
/// larger ones go straight to the raw sink.
pub const BUFFER_SIZE: usize = 16384;

/// Scratch buffer size for `copy_bytes` and directory copies (16 KiB)
pub const COPY_BUFFER_SIZE: usize = 16384;

/// Default cap on a single raw file read.
///
/// 100 MiB on 32-bit targets, where very large single reads have been seen to
/// fail with spurious out-of-memory errors; unbounded on 64-bit.
#[cfg(target_pointer_width = "64")]
pub const DEFAULT_READ_CHUNK_SIZE: usize = usize::MAX;

#[cfg(not(target_pointer_width = "64"))]
pub const DEFAULT_READ_CHUNK_SIZE: usize = 100 * 1024 * 1024;
