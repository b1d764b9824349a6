//! Locks that never exclude

use parking_lot::RwLock;

use crate::error::Result;

use super::{Lock, LockFactory};

/// Lock that always reports success. Carries no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLock;

impl Lock for NoLock {
    fn name(&self) -> &str {
        "NoLock"
    }

    fn obtain(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_locked(&self) -> Result<bool> {
        Ok(false)
    }
}

/// Factory of `NoLock`s.
///
/// For read-only stores, or when a single writer is guaranteed some other way.
#[derive(Debug, Default)]
pub struct NoLockFactory {
    prefix: RwLock<Option<String>>,
}

impl NoLockFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockFactory for NoLockFactory {
    fn make_lock(&self, _name: &str) -> Result<Box<dyn Lock>> {
        Ok(Box::new(NoLock))
    }

    fn clear_lock(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn lock_prefix(&self) -> Option<String> {
        self.prefix.read().clone()
    }

    fn set_lock_prefix(&self, prefix: Option<String>) {
        *self.prefix.write() = prefix;
    }
}
