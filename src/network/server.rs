//! Lock Verify Server
//!
//! Single-threaded accept loop that checks lock transitions reported by
//! `VerifyingLockFactory` clients for overlapping holds. Connections are
//! handled in arrival order, one at a time, so the holder state sees a total
//! order of events.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::protocol::{LockEvent, VerifyRequest, VerifyStatus};

use super::connection::Connection;

/// Sleep between accept attempts while idle
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Per-connection socket timeout
const CONNECTION_TIMEOUT_MS: u64 = 5000;

/// Events between progress log lines
const PROGRESS_EVERY: u64 = 1000;

// =============================================================================
// Verifier State
// =============================================================================

/// Who holds the lock, plus running totals
#[derive(Debug, Default)]
pub struct VerifierState {
    /// Current holder; any `u8` is a valid client id
    holder: Option<u8>,
    events: u64,
    violations: u64,
}

impl VerifierState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one transition and judge it.
    ///
    /// An obtain while someone holds the lock, or a release by anyone but the
    /// holder, is a violation and leaves the holder unchanged.
    pub fn apply(&mut self, request: VerifyRequest) -> VerifyStatus {
        self.events += 1;
        let id = request.client_id;

        let status = match (request.event, self.holder) {
            (LockEvent::Obtained, None) => {
                self.holder = Some(id);
                VerifyStatus::Ok
            }
            (LockEvent::Obtained, Some(holder)) => {
                tracing::error!("Client {} obtained the lock but {} already holds it", id, holder);
                VerifyStatus::Violation
            }
            (LockEvent::Released, Some(holder)) if holder == id => {
                self.holder = None;
                VerifyStatus::Ok
            }
            (LockEvent::Released, holder) => {
                tracing::error!("Client {} released the lock but the holder is {:?}", id, holder);
                VerifyStatus::Violation
            }
        };

        if status == VerifyStatus::Violation {
            self.violations += 1;
        }
        if self.events % PROGRESS_EVERY == 0 {
            tracing::info!("{} lock events verified, {} violations", self.events, self.violations);
        }
        status
    }

    pub fn holder(&self) -> Option<u8> {
        self.holder
    }

    pub fn events(&self) -> u64 {
        self.events
    }

    pub fn violations(&self) -> u64 {
        self.violations
    }
}

// =============================================================================
// Server
// =============================================================================

/// Cloneable handle that stops a running server
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// TCP verifier for `VerifyingLockFactory` clients
pub struct LockVerifyServer {
    listener: TcpListener,
    state: Arc<Mutex<VerifierState>>,
    shutdown: ShutdownHandle,
    /// Stop on its own after this many events
    max_events: Option<u64>,
}

impl LockVerifyServer {
    /// Bind the listening socket
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| StoreError::Network(format!("bind failed: {}", e)))?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            listener,
            state: Arc::new(Mutex::new(VerifierState::new())),
            shutdown: ShutdownHandle {
                flag: Arc::new(AtomicBool::new(false)),
            },
            max_events: None,
        })
    }

    /// Stop `run` once `max` events have been verified
    pub fn with_max_events(mut self, max: u64) -> Self {
        self.max_events = Some(max);
        self
    }

    fn event_budget_spent(&self) -> bool {
        match self.max_events {
            Some(max) => self.state.lock().events() >= max,
            None => false,
        }
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Events seen so far
    pub fn events(&self) -> u64 {
        self.state.lock().events()
    }

    /// Violations detected so far
    pub fn violations(&self) -> u64 {
        self.state.lock().violations()
    }

    /// Serve until the shutdown handle fires or the event budget is spent
    pub fn run(&self) -> Result<()> {
        tracing::info!("Lock verify server listening on {}", self.local_addr()?);

        while !self.shutdown.is_shutdown() && !self.event_budget_spent() {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    let result = Connection::new(stream, Arc::clone(&self.state)).and_then(|mut conn| {
                        conn.set_timeouts(CONNECTION_TIMEOUT_MS, CONNECTION_TIMEOUT_MS)?;
                        conn.handle()
                    });
                    // A misbehaving client must not stop the verifier
                    if let Err(e) = result {
                        tracing::warn!("Connection error: {}", e);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(StoreError::Network(format!("accept failed: {}", e))),
            }
        }

        let state = self.state.lock();
        tracing::info!(
            "Lock verify server stopped after {} events, {} violations",
            state.events(),
            state.violations()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obtain_release_cycle() {
        let mut state = VerifierState::new();
        assert_eq!(state.apply(VerifyRequest::obtained(1)), VerifyStatus::Ok);
        assert_eq!(state.holder(), Some(1));
        assert_eq!(state.apply(VerifyRequest::released(1)), VerifyStatus::Ok);
        assert_eq!(state.holder(), None);
        assert_eq!(state.violations(), 0);
    }

    #[test]
    fn test_overlapping_obtain_is_violation() {
        let mut state = VerifierState::new();
        state.apply(VerifyRequest::obtained(1));
        assert_eq!(state.apply(VerifyRequest::obtained(2)), VerifyStatus::Violation);
        assert_eq!(state.holder(), Some(1));
        assert_eq!(state.violations(), 1);
    }

    #[test]
    fn test_release_by_non_holder_is_violation() {
        let mut state = VerifierState::new();
        assert_eq!(state.apply(VerifyRequest::released(3)), VerifyStatus::Violation);
        state.apply(VerifyRequest::obtained(4));
        assert_eq!(state.apply(VerifyRequest::released(3)), VerifyStatus::Violation);
        assert_eq!(state.holder(), Some(4));
    }

    #[test]
    fn test_client_id_zero_is_valid() {
        let mut state = VerifierState::new();
        assert_eq!(state.apply(VerifyRequest::obtained(0)), VerifyStatus::Ok);
        assert_eq!(state.apply(VerifyRequest::obtained(1)), VerifyStatus::Violation);
        assert_eq!(state.apply(VerifyRequest::released(0)), VerifyStatus::Ok);
        assert_eq!(state.events(), 3);
    }
}
