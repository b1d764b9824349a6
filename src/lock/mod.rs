//! Lock Module
//!
//! Named locks that serialize index mutation across processes.
//!
//! ## Lock lifecycle
//! ```text
//!            obtain() == true
//!  Unlocked ────────────────────► Locked
//!     ▲                             │
//!     └──────────── release() ──────┘
//! ```
//!
//! ## Strategies
//! - `NoLockFactory`: never excludes; for read-only or externally guarded stores
//! - `SingleInstanceLockFactory`: in-process name set
//! - `SimpleFsLockFactory`: lock file created atomically, deleted on release
//! - `NativeFsLockFactory`: OS advisory lock on a lock file
//! - `VerifyingLockFactory`: reports every transition to a `LockVerifyServer`
//!
//! `release` on a lock this instance does not hold is a no-op for every
//! strategy. It never touches a lock held by someone else.

mod fs;
mod native_fs;
mod no_lock;
mod simple_fs;
mod single_instance;
mod verifying;

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::error::{Result, StoreError};

pub use fs::FsLockDir;
pub use native_fs::NativeFsLockFactory;
pub use no_lock::{NoLock, NoLockFactory};
pub use simple_fs::SimpleFsLockFactory;
pub use single_instance::SingleInstanceLockFactory;
pub use verifying::VerifyingLockFactory;

// =============================================================================
// Constants
// =============================================================================

/// Sleep between attempts in `obtain_timeout`
pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Timeout value meaning "retry until the lock is obtained"
pub const LOCK_OBTAIN_WAIT_FOREVER: i64 = -1;

// =============================================================================
// Lock
// =============================================================================

/// A named lock.
///
/// One instance is not meant to be shared between threads; each thread or
/// process mints its own from a `LockFactory`.
pub trait Lock: Send {
    /// Name of the lock, including any factory prefix
    fn name(&self) -> &str;

    /// Try once to obtain the lock without blocking.
    ///
    /// `Ok(true)` guarantees no other cooperating instance holds it.
    fn obtain(&mut self) -> Result<bool>;

    /// Release the lock if this instance holds it
    fn release(&mut self) -> Result<()>;

    /// Best-effort check whether anyone holds the lock
    fn is_locked(&self) -> Result<bool>;

    /// Why the last failed `obtain` failed, when the strategy knows
    fn failure_reason(&self) -> Option<String> {
        None
    }

    /// Poll `obtain` every `DEFAULT_LOCK_POLL_INTERVAL` until it succeeds or
    /// `timeout_ms` runs out. See [`obtain_with_poll`].
    fn obtain_timeout(&mut self, timeout_ms: i64) -> Result<()> {
        obtain_with_poll(self, timeout_ms, DEFAULT_LOCK_POLL_INTERVAL)
    }
}

impl std::fmt::Debug for dyn Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock").field("name", &self.name()).finish()
    }
}

impl<L: Lock + ?Sized> Lock for Box<L> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn obtain(&mut self) -> Result<bool> {
        (**self).obtain()
    }

    fn release(&mut self) -> Result<()> {
        (**self).release()
    }

    fn is_locked(&self) -> Result<bool> {
        (**self).is_locked()
    }

    fn failure_reason(&self) -> Option<String> {
        (**self).failure_reason()
    }
}

/// Poll `lock.obtain()` until it succeeds or the timeout budget is spent.
///
/// The budget is `ceil(timeout_ms / poll)` sleeps, so a timeout is never
/// reported before `timeout_ms` has elapsed and at most one poll interval
/// after it. `LOCK_OBTAIN_WAIT_FOREVER` retries without bound; any other
/// negative timeout is rejected before the first attempt.
pub fn obtain_with_poll<L: Lock + ?Sized>(
    lock: &mut L,
    timeout_ms: i64,
    poll: Duration,
) -> Result<()> {
    if timeout_ms < 0 && timeout_ms != LOCK_OBTAIN_WAIT_FOREVER {
        return Err(StoreError::InvalidArgument(format!(
            "lock timeout must be >= 0 or LOCK_OBTAIN_WAIT_FOREVER, got {}",
            timeout_ms
        )));
    }

    let poll_ms = (poll.as_millis() as u64).max(1);
    let max_sleeps = sleep_budget(timeout_ms, poll_ms);
    let mut sleeps = 0u64;

    loop {
        if lock.obtain()? {
            if sleeps > 0 {
                tracing::debug!("Obtained lock {} after {} polls", lock.name(), sleeps);
            }
            return Ok(());
        }

        if let Some(max) = max_sleeps {
            if sleeps >= max {
                return Err(StoreError::LockObtainFailed {
                    message: format!("Lock@{}", lock.name()),
                    cause: lock.failure_reason(),
                });
            }
        }

        tracing::trace!(lock = %lock.name(), "lock busy, polling");
        thread::sleep(Duration::from_millis(poll_ms));
        sleeps += 1;
    }
}

/// Number of sleeps allowed for a timeout; `None` means no limit
fn sleep_budget(timeout_ms: i64, poll_ms: u64) -> Option<u64> {
    if timeout_ms == LOCK_OBTAIN_WAIT_FOREVER {
        return None;
    }
    Some((timeout_ms as u64).div_ceil(poll_ms))
}

// =============================================================================
// Scoped acquisition
// =============================================================================

/// Holds an obtained lock and releases it when dropped
pub struct LockGuard<'a, L: Lock + ?Sized> {
    lock: Option<&'a mut L>,
}

impl<'a, L: Lock + ?Sized> LockGuard<'a, L> {
    /// Obtain `lock` within `timeout_ms` and guard it
    pub fn acquire(lock: &'a mut L, timeout_ms: i64) -> Result<Self> {
        lock.obtain_timeout(timeout_ms)?;
        Ok(Self { lock: Some(lock) })
    }

    /// Obtain `lock` polling every `poll`, and guard it
    pub fn acquire_with_poll(lock: &'a mut L, timeout_ms: i64, poll: Duration) -> Result<Self> {
        obtain_with_poll(lock, timeout_ms, poll)?;
        Ok(Self { lock: Some(lock) })
    }

    /// Release now and report the outcome
    pub fn release(mut self) -> Result<()> {
        match self.lock.take() {
            Some(lock) => lock.release(),
            None => Ok(()),
        }
    }
}

impl<L: Lock + ?Sized> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            if let Err(e) = lock.release() {
                tracing::warn!("Failed to release lock {}: {}", lock.name(), e);
            }
        }
    }
}

/// Run `work` while holding `lock`.
///
/// The lock is obtained within `timeout_ms` and released on every exit path,
/// panics included. An error from `work` wins over a release error.
pub fn with_lock<L, T, F>(lock: &mut L, timeout_ms: i64, work: F) -> Result<T>
where
    L: Lock + ?Sized,
    F: FnOnce() -> Result<T>,
{
    let guard = LockGuard::acquire(lock, timeout_ms)?;
    finish(guard, work)
}

/// `with_lock` with an explicit poll interval
pub fn with_lock_polling<L, T, F>(lock: &mut L, timeout_ms: i64, poll: Duration, work: F) -> Result<T>
where
    L: Lock + ?Sized,
    F: FnOnce() -> Result<T>,
{
    let guard = LockGuard::acquire_with_poll(lock, timeout_ms, poll)?;
    finish(guard, work)
}

fn finish<L, T, F>(guard: LockGuard<'_, L>, work: F) -> Result<T>
where
    L: Lock + ?Sized,
    F: FnOnce() -> Result<T>,
{
    let result = work();
    let released = guard.release();
    match result {
        Ok(value) => released.map(|_| value),
        Err(e) => {
            if let Err(release_err) = released {
                tracing::warn!("Lock release failed after error: {}", release_err);
            }
            Err(e)
        }
    }
}

// =============================================================================
// LockFactory
// =============================================================================

/// Mints named locks for a directory.
///
/// Factories are shared behind an `Arc`, so configuration uses `&self`.
pub trait LockFactory: Send + Sync {
    /// New, unobtained lock instance for `name`
    fn make_lock(&self, name: &str) -> Result<Box<dyn Lock>>;

    /// Forcibly remove the named lock
    fn clear_lock(&self, name: &str) -> Result<()>;

    /// Prefix namespacing lock names, if any
    fn lock_prefix(&self) -> Option<String>;

    fn set_lock_prefix(&self, prefix: Option<String>);

    /// Directory holding lock files, for filesystem strategies
    fn lock_dir(&self) -> Option<PathBuf> {
        None
    }

    /// Set the lock directory. Filesystem strategies accept this once.
    fn set_lock_dir(&self, dir: PathBuf) -> Result<()> {
        Err(StoreError::Config(format!(
            "lock factory is not filesystem based, cannot use lock dir {}",
            dir.display()
        )))
    }

    /// Whether locks live as files in `lock_dir`
    fn is_fs_based(&self) -> bool {
        false
    }
}

/// `<prefix>-<name>`, or just `name` without a prefix
pub(crate) fn prefixed_name(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{}-{}", prefix, name),
        _ => name.to_string(),
    }
}
