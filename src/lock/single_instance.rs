//! In-process locks
//!
//! Exclusion only between locks minted by the same factory. Suitable when a
//! single process owns the directory, as with `RamDirectory`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::Result;

use super::{prefixed_name, Lock, LockFactory};

/// Held names, each mapped to the token of the obtain that took it
#[derive(Debug, Default)]
struct HeldNames {
    owners: HashMap<String, u64>,
    next_token: u64,
}

type HeldSet = Arc<Mutex<HeldNames>>;

/// Factory whose locks share one in-memory table of held names
#[derive(Debug, Default)]
pub struct SingleInstanceLockFactory {
    held: HeldSet,
    prefix: RwLock<Option<String>>,
}

impl SingleInstanceLockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn full_name(&self, name: &str) -> String {
        prefixed_name(self.prefix.read().as_deref(), name)
    }
}

impl LockFactory for SingleInstanceLockFactory {
    fn make_lock(&self, name: &str) -> Result<Box<dyn Lock>> {
        Ok(Box::new(SingleInstanceLock {
            name: self.full_name(name),
            held_set: Arc::clone(&self.held),
            token: None,
        }))
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        let name = self.full_name(name);
        if self.held.lock().owners.remove(&name).is_some() {
            tracing::debug!("Cleared lock {}", name);
        }
        Ok(())
    }

    fn lock_prefix(&self) -> Option<String> {
        self.prefix.read().clone()
    }

    fn set_lock_prefix(&self, prefix: Option<String>) {
        *self.prefix.write() = prefix;
    }
}

struct SingleInstanceLock {
    name: String,
    held_set: HeldSet,
    /// Token of this instance's obtain, while it believes it holds the lock
    token: Option<u64>,
}

impl Lock for SingleInstanceLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn obtain(&mut self) -> Result<bool> {
        if self.token.is_some() {
            return Ok(false);
        }
        let mut held = self.held_set.lock();
        if held.owners.contains_key(&self.name) {
            return Ok(false);
        }
        let token = held.next_token;
        held.next_token += 1;
        held.owners.insert(self.name.clone(), token);
        self.token = Some(token);
        Ok(true)
    }

    /// Frees the name only if it still carries this instance's token; after a
    /// `clear_lock` it may belong to someone else.
    fn release(&mut self) -> Result<()> {
        let Some(token) = self.token.take() else {
            return Ok(());
        };
        let mut held = self.held_set.lock();
        if held.owners.get(&self.name) == Some(&token) {
            held.owners.remove(&self.name);
        } else {
            tracing::debug!("Lock {} was cleared while held; not releasing", self.name);
        }
        Ok(())
    }

    fn is_locked(&self) -> Result<bool> {
        Ok(self.held_set.lock().owners.contains_key(&self.name))
    }
}
