//! Reconnect detection.

use crate::classify::CloseKind;

/// Remembers whether the last close was abrupt, so the next successful
/// connection can be reported as a reconnect rather than a first connect.
///
/// Only one pending abrupt close is remembered: several abrupt closes in a
/// row still produce a single reconnect.
#[derive(Debug, Clone, Default)]
pub struct ReconnectDetector {
    abruptly_closed: bool,
}

impl ReconnectDetector {
    /// Creates a detector with no pending abrupt close.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a classified close.
    pub fn on_closed(&mut self, kind: CloseKind) {
        self.abruptly_closed = kind.is_abrupt();
    }

    /// Records a successful connection.
    ///
    /// Returns `true` when this connection follows an abrupt close, i.e. a
    /// `Reconnected` event must be emitted.
    pub fn on_connected(&mut self) -> bool {
        std::mem::take(&mut self.abruptly_closed)
    }

    /// Returns true if an abrupt close is pending.
    pub fn is_pending(&self) -> bool {
        self.abruptly_closed
    }
}
