//! Shared state of filesystem lock factories

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{Result, StoreError};

use super::prefixed_name;

/// Lock directory and name prefix of a filesystem lock factory.
///
/// The directory can be set exactly once, either at construction or later
/// (typically when the factory is bound to an `FsDirectory`).
#[derive(Debug, Default)]
pub struct FsLockDir {
    dir: RwLock<Option<PathBuf>>,
    prefix: RwLock<Option<String>>,
}

impl FsLockDir {
    /// No lock directory yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock directory fixed up front
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: RwLock::new(Some(dir.into())),
            prefix: RwLock::new(None),
        }
    }

    pub fn dir(&self) -> Option<PathBuf> {
        self.dir.read().clone()
    }

    /// Set the lock directory; a second call is a configuration error
    pub fn set_dir(&self, dir: PathBuf) -> Result<()> {
        let mut current = self.dir.write();
        if let Some(existing) = current.as_ref() {
            return Err(StoreError::Config(format!(
                "lock directory already set to {}, cannot change it to {}",
                existing.display(),
                dir.display()
            )));
        }
        tracing::debug!("Lock directory set to {}", dir.display());
        *current = Some(dir);
        Ok(())
    }

    pub fn prefix(&self) -> Option<String> {
        self.prefix.read().clone()
    }

    pub fn set_prefix(&self, prefix: Option<String>) {
        *self.prefix.write() = prefix;
    }

    /// Path of the lock file for `name`
    pub fn lock_path(&self, name: &str) -> Result<PathBuf> {
        let dir = self.dir.read();
        let Some(dir) = dir.as_ref() else {
            return Err(StoreError::Config(format!(
                "lock directory not set, cannot make lock {}",
                name
            )));
        };
        let prefix = self.prefix.read();
        Ok(dir.join(prefixed_name(prefix.as_deref(), name)))
    }
}

/// Create the directory holding `lock_path` if it is missing
pub(crate) fn ensure_parent_dir(lock_path: &Path) -> Result<()> {
    let Some(dir) = lock_path.parent() else {
        return Ok(());
    };
    if dir.exists() {
        if !dir.is_dir() {
            return Err(StoreError::NotADirectory(dir.to_path_buf()));
        }
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| StoreError::file(dir.display().to_string(), e))
}

/// Display name of a lock file
pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
