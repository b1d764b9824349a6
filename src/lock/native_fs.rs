//! OS advisory locks
//!
//! Uses `flock`/`LockFileEx` through `fs2` on a lock file. The OS drops the
//! lock when the holding process exits, so a crash never leaves a stale lock.
//! The lock file itself is left in place on release: deleting it would let a
//! later opener lock a fresh inode while an earlier one still holds the old.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::PathBuf;

use fs2::FileExt;

use crate::error::{Result, StoreError};

use super::fs::{ensure_parent_dir, file_name_of, FsLockDir};
use super::{Lock, LockFactory};

/// Factory of OS advisory locks
#[derive(Debug, Default)]
pub struct NativeFsLockFactory {
    lock_dir: FsLockDir,
}

impl NativeFsLockFactory {
    /// Lock directory left unset until the factory is bound to a directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep lock files in `dir`
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: FsLockDir::with_dir(dir),
        }
    }
}

impl LockFactory for NativeFsLockFactory {
    fn make_lock(&self, name: &str) -> Result<Box<dyn Lock>> {
        let path = self.lock_dir.lock_path(name)?;
        Ok(Box::new(NativeFsLock {
            name: file_name_of(&path),
            path,
            file: None,
            failure: None,
        }))
    }

    /// Delete the lock file if nobody holds the lock
    fn clear_lock(&self, name: &str) -> Result<()> {
        let path = self.lock_dir.lock_path(name)?;
        let existing = NativeFsLock {
            name: file_name_of(&path),
            path,
            file: None,
            failure: None,
        };
        if existing.is_locked()? {
            return Err(StoreError::LockReleaseFailed(format!(
                "cannot clear {}: held by another process",
                existing.name
            )));
        }
        match fs::remove_file(&existing.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::LockReleaseFailed(format!(
                "cannot delete {}: {}",
                existing.path.display(),
                e
            ))),
        }
    }

    fn lock_prefix(&self) -> Option<String> {
        self.lock_dir.prefix()
    }

    fn set_lock_prefix(&self, prefix: Option<String>) {
        self.lock_dir.set_prefix(prefix);
    }

    fn lock_dir(&self) -> Option<PathBuf> {
        self.lock_dir.dir()
    }

    fn set_lock_dir(&self, dir: PathBuf) -> Result<()> {
        self.lock_dir.set_dir(dir)
    }

    fn is_fs_based(&self) -> bool {
        true
    }
}

struct NativeFsLock {
    name: String,
    path: PathBuf,
    /// Open, locked handle while held
    file: Option<File>,
    /// Why the last obtain failed
    failure: Option<String>,
}

impl NativeFsLock {
    fn open_lock_file(&self) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| StoreError::file(self.path.display().to_string(), e))
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == fs2::lock_contended_error().kind()
}

impl Lock for NativeFsLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn obtain(&mut self) -> Result<bool> {
        if self.file.is_some() {
            return Ok(false);
        }
        ensure_parent_dir(&self.path)?;
        let file = self.open_lock_file()?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                self.failure = None;
                self.file = Some(file);
                tracing::trace!(lock = %self.name, "obtained native lock");
                Ok(true)
            }
            Err(e) if is_contended(&e) => {
                self.failure = Some(format!("{} is locked: {}", self.path.display(), e));
                Ok(false)
            }
            Err(e) => Err(StoreError::file(self.path.display().to_string(), e)),
        }
    }

    fn release(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        file.unlock()
            .map_err(|e| StoreError::LockReleaseFailed(format!("{}: {}", self.name, e)))?;
        tracing::trace!(lock = %self.name, "released native lock");
        Ok(())
    }

    fn is_locked(&self) -> Result<bool> {
        if self.file.is_some() {
            return Ok(true);
        }
        if !self.path.exists() {
            return Ok(false);
        }

        let file = File::open(&self.path)
            .map_err(|e| StoreError::file(self.path.display().to_string(), e))?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                file.unlock()
                    .map_err(|e| StoreError::file(self.path.display().to_string(), e))?;
                Ok(false)
            }
            Err(e) if is_contended(&e) => Ok(true),
            Err(e) => Err(StoreError::file(self.path.display().to_string(), e)),
        }
    }

    fn failure_reason(&self) -> Option<String> {
        self.failure.clone()
    }
}
