//! Directory contract
//!
//! A `Directory` is a flat catalog of named, write-once files plus the lock
//! factory that serializes index mutations on it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, StoreError};
use crate::lock::{obtain_with_poll, Lock, LockFactory, DEFAULT_LOCK_POLL_INTERVAL};

use super::stream::{DataInput, DataOutput, IndexInput, IndexOutput};
use super::{BUFFER_SIZE, COPY_BUFFER_SIZE};

/// Flat catalog of named files
///
/// Every operation fails with `AlreadyClosed` once `close` has been called.
pub trait Directory: Send + Sync {
    // -------------------------------------------------------------------------
    // Catalog
    // -------------------------------------------------------------------------

    /// Names of all files, sorted
    fn list_all(&self) -> Result<Vec<String>>;

    /// Whether a file with this name exists
    fn file_exists(&self, name: &str) -> Result<bool>;

    /// Last modification time, in milliseconds since the Unix epoch
    fn file_modified(&self, name: &str) -> Result<u64>;

    /// Set the modification time of an existing file to now
    fn touch_file(&self, name: &str) -> Result<()>;

    /// Remove a file
    fn delete_file(&self, name: &str) -> Result<()>;

    /// Rename a file, replacing `to` if it exists.
    ///
    /// Kept for older index layouts; not guaranteed atomic on every backend.
    fn rename_file(&self, from: &str, to: &str) -> Result<()>;

    /// Length of a file in bytes
    fn file_length(&self, name: &str) -> Result<u64>;

    // -------------------------------------------------------------------------
    // Streams
    // -------------------------------------------------------------------------

    /// Create a new, empty file and return a stream writing it.
    /// An existing file of the same name is deleted first.
    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>>;

    /// Open a file for reading with the directory's default buffer size
    fn open_input(&self, name: &str) -> Result<Box<dyn IndexInput>> {
        self.open_input_with_buffer(name, BUFFER_SIZE)
    }

    /// Open a file for reading with a specific buffer size
    fn open_input_with_buffer(&self, name: &str, buffer_size: usize)
        -> Result<Box<dyn IndexInput>>;

    /// Make a file durable on stable storage
    fn sync(&self, name: &str) -> Result<()>;

    // -------------------------------------------------------------------------
    // Locking
    // -------------------------------------------------------------------------

    /// The lock factory bound to this directory
    fn lock_factory(&self) -> Arc<dyn LockFactory>;

    /// Identity string used to namespace this directory's locks
    fn lock_id(&self) -> String;

    /// Mint a named lock from the bound lock factory
    fn make_lock(&self, name: &str) -> Result<Box<dyn Lock>> {
        self.ensure_open()?;
        self.lock_factory().make_lock(name)
    }

    /// Sleep between attempts while `obtain_lock` waits on a held lock
    fn lock_poll_interval(&self) -> Duration {
        DEFAULT_LOCK_POLL_INTERVAL
    }

    /// Mint a named lock and obtain it within `timeout_ms`, polling at
    /// `lock_poll_interval`. The returned lock is held.
    fn obtain_lock(&self, name: &str, timeout_ms: i64) -> Result<Box<dyn Lock>> {
        let mut lock = self.make_lock(name)?;
        obtain_with_poll(lock.as_mut(), timeout_ms, self.lock_poll_interval())?;
        Ok(lock)
    }

    /// Forcibly remove a named lock (e.g. a stale one left by a crash)
    fn clear_lock(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.lock_factory().clear_lock(name)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Close the directory. Calling it again is harmless.
    fn close(&self) -> Result<()>;

    /// Whether `close` has not been called yet
    fn is_open(&self) -> bool;

    /// Fail with `AlreadyClosed` if the directory was closed
    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::AlreadyClosed(format!("directory {}", self.lock_id())))
        }
    }
}

/// Bind `factory` to a directory with the given lock id.
///
/// The prefix is set to `lock_id`, except for filesystem factories whose lock
/// directory is unset (it becomes `dir`) or already equal to `dir`: the
/// directory itself disambiguates those locks, so the prefix is cleared.
pub(crate) fn bind_lock_factory(factory: &dyn LockFactory, lock_id: &str, dir: &Path) -> Result<()> {
    factory.set_lock_prefix(Some(lock_id.to_string()));

    if !factory.is_fs_based() {
        return Ok(());
    }

    match factory.lock_dir() {
        None => {
            factory.set_lock_dir(dir.to_path_buf())?;
            factory.set_lock_prefix(None);
        }
        Some(lock_dir) if same_path(&lock_dir, dir) => factory.set_lock_prefix(None),
        Some(_) => {}
    }
    Ok(())
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

// =============================================================================
// Bulk copy
// =============================================================================

/// Copy every file of `src` accepted by `filter` into `dest`.
///
/// Each file is streamed through a fixed scratch buffer. Both streams are
/// closed even when the copy fails (output first, then input). When
/// `close_src` is set the source directory is closed after all files are
/// copied.
pub fn copy<F>(src: &dyn Directory, dest: &dyn Directory, close_src: bool, filter: F) -> Result<()>
where
    F: Fn(&str) -> bool,
{
    let mut scratch = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0usize;

    for name in src.list_all()? {
        if !filter(&name) {
            continue;
        }

        let mut output = dest.create_output(&name)?;
        let mut input = match src.open_input(&name) {
            Ok(input) => input,
            Err(e) => {
                if let Err(close_err) = output.close() {
                    tracing::warn!("Failed to close output {} after error: {}", name, close_err);
                }
                return Err(e);
            }
        };

        let result = copy_stream(input.as_mut(), output.as_mut(), &mut scratch);
        let output_closed = output.close();
        let input_closed = input.close();
        result.and(output_closed).and(input_closed)?;

        copied += 1;
        tracing::trace!(file = %name, "copied file");
    }

    tracing::debug!("Copied {} files from {} to {}", copied, src.lock_id(), dest.lock_id());

    if close_src {
        src.close()?;
    }
    Ok(())
}

/// Stream the whole of `input` into `output`
fn copy_stream(
    input: &mut dyn IndexInput,
    output: &mut dyn IndexOutput,
    scratch: &mut [u8],
) -> Result<()> {
    let len = input.length();
    let mut read_count = 0u64;
    while read_count < len {
        let to_read = (len - read_count).min(scratch.len() as u64) as usize;
        input.read_bytes(&mut scratch[..to_read])?;
        output.write_bytes(&scratch[..to_read])?;
        read_count += to_read as u64;
    }
    Ok(())
}
