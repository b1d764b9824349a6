//! In-memory Directory
//!
//! Files live in shared byte vectors. Streams go through the same buffering
//! layer as `FsDirectory`, so the buffer contract is identical.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::lock::{LockFactory, SingleInstanceLockFactory};

use super::buffered::{BufferedInput, BufferedOutput, RawInput, RawOutput};
use super::directory::{copy, Directory};
use super::stream::{IndexInput, IndexOutput};
use super::BUFFER_SIZE;

/// Source of per-instance lock ids
static NEXT_RAM_ID: AtomicU64 = AtomicU64::new(1);

/// One in-memory file
#[derive(Debug)]
struct RamFile {
    data: Vec<u8>,
    modified: u64,
}

impl RamFile {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            modified: now_millis(),
        }
    }
}

type SharedFile = Arc<RwLock<RamFile>>;

/// Directory held entirely in memory
pub struct RamDirectory {
    files: RwLock<HashMap<String, SharedFile>>,
    lock_factory: Arc<dyn LockFactory>,
    lock_id: String,
    open: AtomicBool,
}

impl Default for RamDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl RamDirectory {
    /// Empty directory with a `SingleInstanceLockFactory`
    pub fn new() -> Self {
        Self::with_lock_factory(Arc::new(SingleInstanceLockFactory::new()))
    }

    /// Empty directory with a specific lock factory.
    ///
    /// The factory's lock prefix is set to this directory's lock id.
    pub fn with_lock_factory(lock_factory: Arc<dyn LockFactory>) -> Self {
        let lock_id = format!(
            "indexstore-ram-{:08x}",
            NEXT_RAM_ID.fetch_add(1, Ordering::Relaxed)
        );
        lock_factory.set_lock_prefix(Some(lock_id.clone()));
        Self {
            files: RwLock::new(HashMap::new()),
            lock_factory,
            lock_id,
            open: AtomicBool::new(true),
        }
    }

    /// New in-memory directory holding a copy of every file in `src`
    pub fn copy_of(src: &dyn Directory) -> Result<Self> {
        let dir = Self::new();
        copy(src, &dir, false, |_| true)?;
        Ok(dir)
    }

    /// Total bytes held across all files
    pub fn size_in_bytes(&self) -> u64 {
        self.files
            .read()
            .values()
            .map(|f| f.read().data.len() as u64)
            .sum()
    }

    fn file(&self, name: &str) -> Result<SharedFile> {
        self.files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::FileNotFound(name.to_string()))
    }
}

impl Directory for RamDirectory {
    fn list_all(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let mut names: Vec<String> = self.files.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.files.read().contains_key(name))
    }

    fn file_modified(&self, name: &str) -> Result<u64> {
        self.ensure_open()?;
        let file = self.file(name)?;
        let modified = file.read().modified;
        Ok(modified)
    }

    fn touch_file(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let file = self.file(name)?;
        let mut file = file.write();
        // Keep modification times strictly increasing for same-millisecond touches
        file.modified = now_millis().max(file.modified + 1);
        Ok(())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        match self.files.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(StoreError::FileNotFound(name.to_string())),
        }
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        self.ensure_open()?;
        let mut files = self.files.write();
        let file = files
            .remove(from)
            .ok_or_else(|| StoreError::FileNotFound(from.to_string()))?;
        files.insert(to.to_string(), file);
        Ok(())
    }

    fn file_length(&self, name: &str) -> Result<u64> {
        self.ensure_open()?;
        let file = self.file(name)?;
        let len = file.read().data.len() as u64;
        Ok(len)
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>> {
        self.ensure_open()?;
        let file: SharedFile = Arc::new(RwLock::new(RamFile::new()));
        self.files.write().insert(name.to_string(), Arc::clone(&file));

        let raw = RamRawOutput { file, position: 0 };
        Ok(Box::new(BufferedOutput::new(name, raw, BUFFER_SIZE)))
    }

    fn open_input_with_buffer(
        &self,
        name: &str,
        buffer_size: usize,
    ) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        let file = self.file(name)?;
        let length = file.read().data.len() as u64;

        let raw = RamRawInput {
            name: name.to_string(),
            file,
            length,
        };
        Ok(Box::new(BufferedInput::new(name, raw, buffer_size)))
    }

    fn sync(&self, name: &str) -> Result<()> {
        // Nothing to make durable; only check the file is there
        self.ensure_open()?;
        self.file(name).map(|_| ())
    }

    fn lock_factory(&self) -> Arc<dyn LockFactory> {
        Arc::clone(&self.lock_factory)
    }

    fn lock_id(&self) -> String {
        self.lock_id.clone()
    }

    fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::AcqRel) {
            self.files.write().clear();
            tracing::debug!("Closed RamDirectory {}", self.lock_id);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

// =============================================================================
// Raw in-memory handles
// =============================================================================

struct RamRawOutput {
    file: SharedFile,
    position: u64,
}

impl RawOutput for RamRawOutput {
    fn write_raw(&mut self, buf: &[u8]) -> Result<()> {
        let mut file = self.file.write();
        let start = self.position as usize;
        let end = start + buf.len();
        if file.data.len() < end {
            file.data.resize(end, 0);
        }
        file.data[start..end].copy_from_slice(buf);
        file.modified = now_millis();
        self.position = end as u64;
        Ok(())
    }

    fn seek_raw(&mut self, pos: u64) -> Result<()> {
        self.position = pos;
        Ok(())
    }

    fn raw_length(&self) -> Result<u64> {
        Ok(self.file.read().data.len() as u64)
    }

    fn set_raw_length(&mut self, len: u64) -> Result<()> {
        self.file.write().data.resize(len as usize, 0);
        Ok(())
    }

    fn close_raw(&mut self) -> Result<()> {
        Ok(())
    }
}

struct RamRawInput {
    name: String,
    file: SharedFile,
    length: u64,
}

impl RawInput for RamRawInput {
    fn read_raw(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let file = self.file.read();
        let start = pos as usize;
        let end = start + buf.len();
        if end > file.data.len() {
            return Err(StoreError::ReadPastEof {
                name: self.name.clone(),
            });
        }
        buf.copy_from_slice(&file.data[start..end]);
        Ok(())
    }

    fn raw_length(&self) -> u64 {
        self.length
    }

    fn close_raw(&mut self) -> Result<()> {
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
