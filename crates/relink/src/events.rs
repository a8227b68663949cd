use crate::classify::CloseKind;
use relink_core::events::ResilienceEvent;
use std::time::{Duration, Instant};

/// Events emitted by a reconnect controller.
#[derive(Debug, Clone)]
pub enum ReconnectEvent {
    /// The transport started opening a connection.
    Connecting {
        pattern_name: String,
        timestamp: Instant,
    },
    /// The transport reported a live connection.
    Connected {
        pattern_name: String,
        timestamp: Instant,
    },
    /// A connection was re-established after an abrupt close.
    Reconnected {
        pattern_name: String,
        timestamp: Instant,
        reconnections: u64,
    },
    /// The transport reported a close.
    Closed {
        pattern_name: String,
        timestamp: Instant,
        code: Option<u16>,
        reason: String,
        kind: CloseKind,
    },
    /// The transport reported an error.
    TransportError {
        pattern_name: String,
        timestamp: Instant,
        message: String,
    },
    /// A connection attempt failed.
    AttemptFailed {
        pattern_name: String,
        timestamp: Instant,
        attempt: u32,
    },
    /// A backoff wait is about to start.
    RetryScheduled {
        pattern_name: String,
        timestamp: Instant,
        attempt: u32,
        delay: Duration,
        interruptible: bool,
    },
    /// A backoff wait was ended early by a retry-now trigger.
    RetryShortCircuited {
        pattern_name: String,
        timestamp: Instant,
        attempt: u32,
    },
    /// The controller gave up after too many consecutive failures.
    AttemptsExhausted {
        pattern_name: String,
        timestamp: Instant,
        attempts: u32,
    },
}

impl ResilienceEvent for ReconnectEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReconnectEvent::Connecting { .. } => "Connecting",
            ReconnectEvent::Connected { .. } => "Connected",
            ReconnectEvent::Reconnected { .. } => "Reconnected",
            ReconnectEvent::Closed { .. } => "Closed",
            ReconnectEvent::TransportError { .. } => "TransportError",
            ReconnectEvent::AttemptFailed { .. } => "AttemptFailed",
            ReconnectEvent::RetryScheduled { .. } => "RetryScheduled",
            ReconnectEvent::RetryShortCircuited { .. } => "RetryShortCircuited",
            ReconnectEvent::AttemptsExhausted { .. } => "AttemptsExhausted",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ReconnectEvent::Connecting { timestamp, .. }
            | ReconnectEvent::Connected { timestamp, .. }
            | ReconnectEvent::Reconnected { timestamp, .. }
            | ReconnectEvent::Closed { timestamp, .. }
            | ReconnectEvent::TransportError { timestamp, .. }
            | ReconnectEvent::AttemptFailed { timestamp, .. }
            | ReconnectEvent::RetryScheduled { timestamp, .. }
            | ReconnectEvent::RetryShortCircuited { timestamp, .. }
            | ReconnectEvent::AttemptsExhausted { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            ReconnectEvent::Connecting { pattern_name, .. }
            | ReconnectEvent::Connected { pattern_name, .. }
            | ReconnectEvent::Reconnected { pattern_name, .. }
            | ReconnectEvent::Closed { pattern_name, .. }
            | ReconnectEvent::TransportError { pattern_name, .. }
            | ReconnectEvent::AttemptFailed { pattern_name, .. }
            | ReconnectEvent::RetryScheduled { pattern_name, .. }
            | ReconnectEvent::RetryShortCircuited { pattern_name, .. }
            | ReconnectEvent::AttemptsExhausted { pattern_name, .. } => pattern_name,
        }
    }
}
