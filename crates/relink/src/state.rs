//! Shared, lock-free view of a controller's state.

use crate::retry::RetryPhase;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Connection state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live connection
    Disconnected,

    /// The transport is opening a connection
    Connecting,

    /// Connected and healthy
    Connected,
}

impl ConnectionState {
    /// Returns a stable lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

/// Shared reconnection state tracking.
///
/// Written only by the controller's worker; any clone can read it from any
/// thread.
#[derive(Clone)]
pub struct ReconnectState {
    connection: Arc<AtomicU8>,
    phase: Arc<AtomicU8>,
    retries: Arc<AtomicU32>,
    reconnections: Arc<AtomicU64>,
    terminated: Arc<AtomicBool>,
}

impl ReconnectState {
    /// Create a new reconnect state
    pub fn new() -> Self {
        Self {
            connection: Arc::new(AtomicU8::new(Self::encode_connection(
                ConnectionState::Disconnected,
            ))),
            phase: Arc::new(AtomicU8::new(Self::encode_phase(RetryPhase::Idle))),
            retries: Arc::new(AtomicU32::new(0)),
            reconnections: Arc::new(AtomicU64::new(0)),
            terminated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get the current connection state
    pub fn connection(&self) -> ConnectionState {
        Self::decode_connection(self.connection.load(Ordering::Acquire))
    }

    pub(crate) fn set_connection(&self, state: ConnectionState) {
        self.connection
            .store(Self::encode_connection(state), Ordering::Release);
    }

    /// Get the current retry phase
    pub fn phase(&self) -> RetryPhase {
        Self::decode_phase(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: RetryPhase) {
        self.phase.store(Self::encode_phase(phase), Ordering::Release);
    }

    /// Consecutive failed attempts since the last success
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Acquire)
    }

    pub(crate) fn set_retries(&self, retries: u32) {
        self.retries.store(retries, Ordering::Release);
    }

    /// Number of reconnections reported so far
    pub fn reconnections(&self) -> u64 {
        self.reconnections.load(Ordering::Acquire)
    }

    pub(crate) fn increment_reconnections(&self) -> u64 {
        self.reconnections.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns true once the worker has stopped for any reason
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn mark_terminated(&self) {
        self.terminated.store(true, Ordering::Release);
        self.set_phase(RetryPhase::Idle);
    }

    fn encode_connection(state: ConnectionState) -> u8 {
        match state {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }

    fn decode_connection(encoded: u8) -> ConnectionState {
        match encoded {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    fn encode_phase(phase: RetryPhase) -> u8 {
        match phase {
            RetryPhase::Idle => 0,
            RetryPhase::Waiting => 1,
            RetryPhase::Attempting => 2,
        }
    }

    fn decode_phase(encoded: u8) -> RetryPhase {
        match encoded {
            1 => RetryPhase::Waiting,
            2 => RetryPhase::Attempting,
            _ => RetryPhase::Idle,
        }
    }
}

impl Default for ReconnectState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReconnectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectState")
            .field("connection", &self.connection())
            .field("phase", &self.phase())
            .field("retries", &self.retries())
            .field("reconnections", &self.reconnections())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}
