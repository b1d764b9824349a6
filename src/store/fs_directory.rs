//! Filesystem Directory
//!
//! Maps the `Directory` contract onto one directory of real files.
//!
//! ## Responsibilities
//! - Create the backing directory lazily, on the first `create_output`
//! - Delete-then-recreate on `create_output` (files are write-once)
//! - Cap single raw reads at `Config::read_chunk_size`
//! - Retry fsync on `sync` before reporting failure

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::lock::{LockFactory, NativeFsLockFactory};

use super::buffered::{BufferedInput, BufferedOutput, RawInput, RawOutput};
use super::directory::{bind_lock_factory, Directory};
use super::stream::{IndexInput, IndexOutput};

/// Directory of index files on the local filesystem
pub struct FsDirectory {
    /// Backing directory
    path: PathBuf,
    /// Buffer, chunk and sync tuning
    config: Config,
    /// Bound at construction, never rebound
    lock_factory: Arc<dyn LockFactory>,
    /// Derived from the canonical path
    lock_id: String,
    /// Set once the backing directory is known to exist
    dir_created: AtomicBool,
    open: AtomicBool,
}

impl FsDirectory {
    /// Open a directory with default config and a `NativeFsLockFactory`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with(path, Config::default(), None)
    }

    /// Open a directory with a specific config
    pub fn open_with_config(path: impl Into<PathBuf>, config: Config) -> Result<Self> {
        Self::open_with(path, config, None)
    }

    /// Open a directory with a specific lock factory
    pub fn with_lock_factory(
        path: impl Into<PathBuf>,
        lock_factory: Arc<dyn LockFactory>,
    ) -> Result<Self> {
        Self::open_with(path, Config::default(), Some(lock_factory))
    }

    /// Open a directory.
    ///
    /// The path does not have to exist yet; it is created by the first
    /// `create_output`. A path that exists but is not a directory is rejected.
    pub fn open_with(
        path: impl Into<PathBuf>,
        config: Config,
        lock_factory: Option<Arc<dyn LockFactory>>,
    ) -> Result<Self> {
        let path = path.into();
        if path.exists() && !path.is_dir() {
            return Err(StoreError::NotADirectory(path));
        }

        let lock_id = fs_lock_id(&path);
        let lock_factory: Arc<dyn LockFactory> =
            lock_factory.unwrap_or_else(|| Arc::new(NativeFsLockFactory::new()));
        bind_lock_factory(lock_factory.as_ref(), &lock_id, &path)?;

        tracing::debug!("Opened FsDirectory {} ({})", path.display(), lock_id);

        Ok(Self {
            dir_created: AtomicBool::new(path.is_dir()),
            path,
            config,
            lock_factory,
            lock_id,
            open: AtomicBool::new(true),
        })
    }

    /// Backing directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tuning in effect
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Path of `name` inside the directory; names must stay in the flat namespace
    fn file_path(&self, name: &str) -> Result<PathBuf> {
        check_file_name(name)?;
        Ok(self.path.join(name))
    }

    /// Create the backing directory once per instance
    fn ensure_dir(&self) -> Result<()> {
        if self.dir_created.load(Ordering::Acquire) {
            return Ok(());
        }
        if self.path.exists() {
            if !self.path.is_dir() {
                return Err(StoreError::NotADirectory(self.path.clone()));
            }
        } else {
            fs::create_dir_all(&self.path)
                .map_err(|e| StoreError::file(self.path.display().to_string(), e))?;
            tracing::debug!("Created directory {}", self.path.display());
        }
        self.dir_created.store(true, Ordering::Release);
        Ok(())
    }
}

impl Directory for FsDirectory {
    fn list_all(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        if !self.path.exists() {
            return Err(StoreError::NoSuchDirectory(self.path.clone()));
        }
        if !self.path.is_dir() {
            return Err(StoreError::NotADirectory(self.path.clone()));
        }

        let entries = fs::read_dir(&self.path)
            .map_err(|e| StoreError::file(self.path.display().to_string(), e))?
            .map(|entry| -> io::Result<(String, bool)> {
                let entry = entry?;
                let is_file = entry.file_type()?.is_file();
                Ok((entry.file_name().to_string_lossy().into_owned(), is_file))
            });
        collect_file_names(&self.path, entries)
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.file_path(name)?.is_file())
    }

    fn file_modified(&self, name: &str) -> Result<u64> {
        self.ensure_open()?;
        let modified = fs::metadata(self.file_path(name)?)
            .and_then(|m| m.modified())
            .map_err(|e| StoreError::file(name, e))?;
        Ok(millis_since_epoch(modified))
    }

    fn touch_file(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let file = OpenOptions::new()
            .write(true)
            .open(self.file_path(name)?)
            .map_err(|e| StoreError::file(name, e))?;
        file.set_modified(SystemTime::now())
            .map_err(|e| StoreError::file(name, e))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        fs::remove_file(self.file_path(name)?).map_err(|e| StoreError::file(name, e))?;
        tracing::trace!(file = %name, "deleted file");
        Ok(())
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        self.ensure_open()?;
        fs::rename(self.file_path(from)?, self.file_path(to)?)
            .map_err(|e| StoreError::file(format!("{} -> {}", from, to), e))
    }

    fn file_length(&self, name: &str) -> Result<u64> {
        self.ensure_open()?;
        let metadata = fs::metadata(self.file_path(name)?).map_err(|e| StoreError::file(name, e))?;
        Ok(metadata.len())
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>> {
        self.ensure_open()?;
        self.ensure_dir()?;

        let path = self.file_path(name)?;
        if path.exists() {
            fs::remove_file(&path).map_err(|e| StoreError::file(name, e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| StoreError::file(name, e))?;

        tracing::trace!(file = %name, "created output");
        let raw = FsRawOutput {
            name: name.to_string(),
            file: Some(file),
        };
        Ok(Box::new(BufferedOutput::new(name, raw, self.config.buffer_size)))
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn IndexInput>> {
        self.open_input_with_buffer(name, self.config.buffer_size)
    }

    fn open_input_with_buffer(
        &self,
        name: &str,
        buffer_size: usize,
    ) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        let file = File::open(self.file_path(name)?).map_err(|e| StoreError::file(name, e))?;
        let length = file.metadata().map_err(|e| StoreError::file(name, e))?.len();

        let raw = FsRawInput {
            name: name.to_string(),
            file: Some(file),
            length,
            chunk_size: self.config.read_chunk_size,
        };
        Ok(Box::new(BufferedInput::new(name, raw, buffer_size)))
    }

    fn sync(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let path = self.file_path(name)?;
        sync_with_retry(self.config.sync_retries, self.config.sync_retry_delay(), || {
            OpenOptions::new().write(true).open(&path)?.sync_all()
        })
        .map_err(|e| StoreError::file(name, e))
    }

    fn lock_factory(&self) -> Arc<dyn LockFactory> {
        Arc::clone(&self.lock_factory)
    }

    fn lock_id(&self) -> String {
        self.lock_id.clone()
    }

    fn lock_poll_interval(&self) -> Duration {
        self.config.lock_poll_interval()
    }

    fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::AcqRel) {
            tracing::debug!("Closed FsDirectory {}", self.path.display());
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

// =============================================================================
// Durability
// =============================================================================

/// Run `op` up to `attempts` times, pausing `delay` between failures.
///
/// Returns on the first success. If every attempt fails, the first error seen
/// is returned.
pub fn sync_with_retry<F>(attempts: u32, delay: Duration, mut op: F) -> io::Result<()>
where
    F: FnMut() -> io::Result<()>,
{
    let attempts = attempts.max(1);
    let mut first_error: Option<io::Error> = None;

    for attempt in 1..=attempts {
        match op() {
            Ok(()) => {
                if attempt > 1 {
                    tracing::debug!("fsync succeeded on attempt {}", attempt);
                }
                return Ok(());
            }
            Err(e) => {
                tracing::debug!("fsync attempt {}/{} failed: {}", attempt, attempts, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
                if attempt < attempts {
                    thread::sleep(delay);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

// =============================================================================
// Raw file handles
// =============================================================================

/// Unbuffered writable file
struct FsRawOutput {
    name: String,
    file: Option<File>,
}

impl FsRawOutput {
    fn handle(&mut self) -> Result<(&mut File, &str)> {
        match self.file.as_mut() {
            Some(file) => Ok((file, &self.name)),
            None => Err(StoreError::AlreadyClosed(format!("output {}", self.name))),
        }
    }
}

impl RawOutput for FsRawOutput {
    fn write_raw(&mut self, buf: &[u8]) -> Result<()> {
        let (file, name) = self.handle()?;
        file.write_all(buf).map_err(|e| StoreError::file(name, e))
    }

    fn seek_raw(&mut self, pos: u64) -> Result<()> {
        let (file, name) = self.handle()?;
        file.seek(SeekFrom::Start(pos))
            .map_err(|e| StoreError::file(name, e))?;
        Ok(())
    }

    fn raw_length(&self) -> Result<u64> {
        let Some(file) = self.file.as_ref() else {
            return Err(StoreError::AlreadyClosed(format!("output {}", self.name)));
        };
        let metadata = file.metadata().map_err(|e| StoreError::file(self.name.as_str(), e))?;
        Ok(metadata.len())
    }

    fn set_raw_length(&mut self, len: u64) -> Result<()> {
        let (file, name) = self.handle()?;
        file.set_len(len).map_err(|e| StoreError::file(name, e))
    }

    fn close_raw(&mut self) -> Result<()> {
        self.file = None;
        Ok(())
    }
}

/// Unbuffered readable file with capped single reads
struct FsRawInput {
    name: String,
    file: Option<File>,
    length: u64,
    chunk_size: usize,
}

impl RawInput for FsRawInput {
    fn read_raw(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(StoreError::AlreadyClosed(format!("input {}", self.name)));
        };
        file.seek(SeekFrom::Start(pos))
            .map_err(|e| StoreError::file(self.name.as_str(), e))?;
        read_chunked(file, &self.name, buf, self.chunk_size)
    }

    fn raw_length(&self) -> u64 {
        self.length
    }

    fn close_raw(&mut self) -> Result<()> {
        self.file = None;
        Ok(())
    }
}

/// Fill `buf` from `reader`, never asking for more than `chunk_size` bytes in
/// one call. A failed chunk is fatal; only `Interrupted` is retried.
fn read_chunked<R: Read>(reader: &mut R, name: &str, buf: &mut [u8], chunk_size: usize) -> Result<()> {
    let chunk_size = chunk_size.max(1);
    let mut total = 0;
    while total < buf.len() {
        let want = (buf.len() - total).min(chunk_size);
        match reader.read(&mut buf[total..total + want]) {
            Ok(0) => {
                return Err(StoreError::ReadPastEof {
                    name: name.to_string(),
                })
            }
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::OutOfMemory => {
                return Err(StoreError::ChunkRead {
                    name: name.to_string(),
                    chunk_size,
                    source: e,
                })
            }
            Err(e) => return Err(StoreError::file(name, e)),
        }
    }
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

/// Reject names that would leave the directory or address a subdirectory
fn check_file_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(StoreError::InvalidArgument(format!("invalid file name {:?}", name)));
    }
    Ok(())
}

/// Sorted names of the regular files among `(name, is_file)` entries.
/// A failed entry is reported against the directory path.
fn collect_file_names<I>(dir: &Path, entries: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = io::Result<(String, bool)>>,
{
    let mut names = Vec::new();
    for entry in entries {
        let (name, is_file) = entry.map_err(|e| StoreError::file(dir.display().to_string(), e))?;
        if is_file {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Lock id for a filesystem directory: prefix + CRC32 of the canonical path
fn fs_lock_id(path: &Path) -> String {
    let canonical = canonical_path(path);
    let crc = crc32fast::hash(canonical.to_string_lossy().as_bytes());
    format!("indexstore-{:08x}", crc)
}

/// Canonical form of `path`, even when it does not exist yet
fn canonical_path(path: &Path) -> PathBuf {
    if let Ok(p) = path.canonicalize() {
        return p;
    }
    if let (Some(parent), Some(file_name)) = (path.parent(), path.file_name()) {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(p) = parent.canonicalize() {
            return p.join(file_name);
        }
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn millis_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
