//! Transport-facing signal channel.

use crate::classify::CloseEvent;
use tokio::sync::mpsc;

/// A lifecycle signal reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// The transport started opening a connection.
    Connecting,
    /// The transport has a live connection.
    Connected,
    /// The connection closed.
    Closed(CloseEvent),
    /// The transport hit an error. Informational; a close follows if the
    /// connection is lost.
    Error(String),
}

/// Cloneable sender the transport uses to report lifecycle signals.
///
/// Signals are delivered to the controller in the order they are sent.
/// Sending after the controller has stopped is a silent no-op.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<TransportSignal>,
}

impl SignalSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<TransportSignal>) -> Self {
        Self { tx }
    }

    /// Sends a raw signal. Returns `false` if the controller is gone.
    pub fn send(&self, signal: TransportSignal) -> bool {
        self.tx.send(signal).is_ok()
    }

    /// Reports a close with an optional close code and a reason.
    pub fn on_close(&self, code: Option<u16>, reason: impl Into<String>) -> bool {
        self.send(TransportSignal::Closed(CloseEvent::new(code, reason)))
    }

    /// Reports a live connection.
    pub fn on_connected(&self) -> bool {
        self.send(TransportSignal::Connected)
    }

    /// Reports that a connection is being opened.
    pub fn on_connecting(&self) -> bool {
        self.send(TransportSignal::Connecting)
    }

    /// Reports a transport error.
    pub fn on_error(&self, message: impl Into<String>) -> bool {
        self.send(TransportSignal::Error(message.into()))
    }

    /// Returns true once the controller has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
