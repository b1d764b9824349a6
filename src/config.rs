//! Configuration for indexstore
//!
//! Centralized tuning knobs with sensible defaults.

use std::time::Duration;

use crate::lock::DEFAULT_LOCK_POLL_INTERVAL;
use crate::store::{BUFFER_SIZE, DEFAULT_READ_CHUNK_SIZE};

/// Tuning for directories, streams and lock polling
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Stream Configuration
    // -------------------------------------------------------------------------
    /// Buffer size of buffered inputs and outputs (in bytes)
    pub buffer_size: usize,

    /// Upper bound on a single raw read issued by `FsDirectory` inputs.
    ///
    /// Very large single reads have historically triggered spurious
    /// out-of-memory failures in some runtimes; this caps them. It is a
    /// tunable, not platform detection.
    pub read_chunk_size: usize,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// How many times `sync` attempts the fsync before giving up
    pub sync_retries: u32,

    /// Pause between fsync attempts (milliseconds)
    pub sync_retry_delay_ms: u64,

    // -------------------------------------------------------------------------
    // Lock Configuration
    // -------------------------------------------------------------------------
    /// Sleep between obtain attempts while waiting on a held lock (milliseconds).
    ///
    /// Used by `Directory::obtain_lock` on an `FsDirectory` and by the
    /// stress-test binary. `Lock::obtain_timeout` keeps the default interval.
    pub lock_poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_size: BUFFER_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            sync_retries: 5,
            sync_retry_delay_ms: 5,
            lock_poll_interval_ms: DEFAULT_LOCK_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Pause between fsync attempts
    pub fn sync_retry_delay(&self) -> Duration {
        Duration::from_millis(self.sync_retry_delay_ms)
    }

    /// Lock poll interval as a Duration
    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the stream buffer size (in bytes, minimum 1)
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size.max(1);
        self
    }

    /// Set the raw read chunk cap (in bytes, minimum 1)
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size.max(1);
        self
    }

    /// Set the number of fsync attempts (minimum 1)
    pub fn sync_retries(mut self, retries: u32) -> Self {
        self.config.sync_retries = retries.max(1);
        self
    }

    /// Set the pause between fsync attempts (in milliseconds)
    pub fn sync_retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.sync_retry_delay_ms = ms;
        self
    }

    /// Set the lock poll interval (in milliseconds, minimum 1)
    pub fn lock_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.lock_poll_interval_ms = ms.max(1);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
