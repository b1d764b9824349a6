//! Lock-file existence locks
//!
//! The lock is held while its file exists. `obtain` creates the file with
//! `create_new`, which fails atomically if it is already there. A process that
//! dies while holding the lock leaves the file behind; remove it with
//! `clear_lock`.
//!
//! Each obtain writes a unique token into the file. Release deletes the file
//! only while it still carries that token, so a holder whose lock was cleared
//! cannot free the lock of whoever obtained it next.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Result, StoreError};

use super::fs::{ensure_parent_dir, file_name_of, FsLockDir};
use super::{Lock, LockFactory};

/// Factory of lock-file existence locks
#[derive(Debug, Default)]
pub struct SimpleFsLockFactory {
    lock_dir: FsLockDir,
}

impl SimpleFsLockFactory {
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

impl LockFactory for SimpleFsLockFactory {
    fn make_lock(&self, name: &str) -> Result<Box<dyn Lock>> {
        let path = self.lock_dir.lock_path(name)?;
        Ok(Box::new(SimpleFsLock {
            name: file_name_of(&path),
            path,
            token: None,
        }))
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        let path = self.lock_dir.lock_path(name)?;
        remove_lock_file(&path)
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

/// Distinguishes obtains within one process
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

/// `<pid>-<nanos>-<counter>`, unique across processes sharing a lock dir
fn new_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!(
        "{}-{}-{}",
        process::id(),
        nanos,
        NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
    )
}

struct SimpleFsLock {
    name: String,
    path: PathBuf,
    /// Token written into the lock file by this instance's obtain
    token: Option<String>,
}

impl SimpleFsLock {
    /// Whether the lock file still carries our token
    fn owns_file(&self, token: &str) -> Result<bool> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents == token),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::LockReleaseFailed(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

impl Lock for SimpleFsLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn obtain(&mut self) -> Result<bool> {
        if self.token.is_some() {
            return Ok(false);
        }
        ensure_parent_dir(&self.path)?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(StoreError::file(self.path.display().to_string(), e)),
        };

        let token = new_token();
        if let Err(e) = file.write_all(token.as_bytes()).and_then(|_| file.flush()) {
            drop(file);
            if let Err(remove_err) = remove_lock_file(&self.path) {
                tracing::warn!("Failed to remove half-written lock {}: {}", self.name, remove_err);
            }
            return Err(StoreError::file(self.path.display().to_string(), e));
        }

        self.token = Some(token);
        tracing::trace!(lock = %self.name, "created lock file");
        Ok(true)
    }

    fn release(&mut self) -> Result<()> {
        let Some(token) = self.token.take() else {
            return Ok(());
        };
        if !self.owns_file(&token)? {
            tracing::debug!("Lock file {} was cleared while held; not deleting", self.name);
            return Ok(());
        }
        remove_lock_file(&self.path)
    }

    fn is_locked(&self) -> Result<bool> {
        Ok(self.path.exists())
    }

    fn failure_reason(&self) -> Option<String> {
        if self.token.is_some() {
            None
        } else {
            Some(format!("lock file {} exists", self.path.display()))
        }
    }
}

fn remove_lock_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::LockReleaseFailed(format!(
            "cannot delete {}: {}",
            path.display(),
            e
        ))),
    }
}
