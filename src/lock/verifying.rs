//! Verified locks
//!
//! Wraps another factory and reports every obtain and release to a
//! `LockVerifyServer`, which fails loudly if two clients ever hold the lock
//! at once. Meant for stress tests of lock strategies across processes.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::network::send_event;
use crate::protocol::{LockEvent, VerifyRequest, VerifyStatus};

use super::{Lock, LockFactory};

/// Factory of locks whose transitions are checked by a remote verifier
pub struct VerifyingLockFactory {
    id: u8,
    delegate: Arc<dyn LockFactory>,
    addr: String,
}

impl VerifyingLockFactory {
    /// `id` identifies this process to the verifier at `host:port`
    pub fn new(id: u8, delegate: Arc<dyn LockFactory>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            delegate,
            addr: format!("{}:{}", host.into(), port),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// `host:port` of the verifier
    pub fn verifier_addr(&self) -> &str {
        &self.addr
    }
}

impl LockFactory for VerifyingLockFactory {
    fn make_lock(&self, name: &str) -> Result<Box<dyn Lock>> {
        Ok(Box::new(VerifyingLock {
            inner: self.delegate.make_lock(name)?,
            id: self.id,
            addr: self.addr.clone(),
            held: false,
        }))
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        self.delegate.clear_lock(name)
    }

    fn lock_prefix(&self) -> Option<String> {
        self.delegate.lock_prefix()
    }

    fn set_lock_prefix(&self, prefix: Option<String>) {
        self.delegate.set_lock_prefix(prefix);
    }

    fn lock_dir(&self) -> Option<PathBuf> {
        self.delegate.lock_dir()
    }

    fn set_lock_dir(&self, dir: PathBuf) -> Result<()> {
        self.delegate.set_lock_dir(dir)
    }

    fn is_fs_based(&self) -> bool {
        self.delegate.is_fs_based()
    }
}

struct VerifyingLock {
    inner: Box<dyn Lock>,
    id: u8,
    addr: String,
    /// Set after a verified obtain, cleared on release
    held: bool,
}

impl VerifyingLock {
    fn verify(&self, event: LockEvent) -> Result<()> {
        let request = VerifyRequest {
            client_id: self.id,
            event,
        };
        match send_event(&self.addr, request)? {
            VerifyStatus::Ok => Ok(()),
            VerifyStatus::Violation => Err(StoreError::Verification(format!(
                "client {} {} of {} rejected by verifier {}",
                self.id,
                event,
                self.inner.name(),
                self.addr
            ))),
        }
    }
}

impl Lock for VerifyingLock {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn obtain(&mut self) -> Result<bool> {
        let obtained = self.inner.obtain()?;
        if obtained {
            self.held = true;
            self.verify(LockEvent::Obtained)?;
        }
        Ok(obtained)
    }

    /// Reports the release only when this instance was seen holding the lock
    fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        if !self.inner.is_locked()? {
            self.held = false;
            return Ok(());
        }

        let verified = self.verify(LockEvent::Released);
        let released = self.inner.release();
        self.held = false;
        verified.and(released)
    }

    fn is_locked(&self) -> Result<bool> {
        self.inner.is_locked()
    }

    fn failure_reason(&self) -> Option<String> {
        self.inner.failure_reason()
    }
}
