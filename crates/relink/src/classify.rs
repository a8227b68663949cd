//! Close classification.
//!
//! A close carrying the normal-closure code is graceful; anything else,
//! including a close with no code at all, is abrupt. Unknown codes fall on
//! the abrupt side so a reconnect is never missed.

use std::fmt;

/// Well-known WebSocket close codes (RFC 6455 section 7.4.1).
pub mod close_code {
    /// Normal closure; the purpose of the connection was fulfilled.
    pub const NORMAL_CLOSURE: u16 = 1000;
    /// The endpoint is going away (server shutdown, page navigation).
    pub const GOING_AWAY: u16 = 1001;
    /// The endpoint terminated the connection due to a protocol error.
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Reserved: the connection dropped without a close frame.
    pub const ABNORMAL_CLOSURE: u16 = 1006;
    /// The server hit an unexpected condition.
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// A connection-closed signal reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloseEvent {
    /// The close code, if the transport received one.
    pub code: Option<u16>,
    /// The close reason sent by the peer, possibly empty.
    pub reason: String,
}

impl CloseEvent {
    /// Creates a close event with the given code and reason.
    pub fn new(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// A normal (code 1000) close.
    pub fn normal() -> Self {
        Self::new(Some(close_code::NORMAL_CLOSURE), "")
    }

    /// A close without any code, as seen when the socket just drops.
    pub fn without_code() -> Self {
        Self::new(None, "")
    }

    /// Classifies this close.
    pub fn kind(&self) -> CloseKind {
        classify(self)
    }
}

/// Outcome of classifying a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseKind {
    /// Intentional, non-error shutdown.
    Graceful,
    /// Any other closure; a subsequent connect counts as a reconnect.
    Abrupt,
}

impl CloseKind {
    /// Returns a stable lowercase label, used for metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            CloseKind::Graceful => "graceful",
            CloseKind::Abrupt => "abrupt",
        }
    }

    /// Returns true for [`CloseKind::Abrupt`].
    pub fn is_abrupt(self) -> bool {
        matches!(self, CloseKind::Abrupt)
    }
}

impl fmt::Display for CloseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a close event as graceful or abrupt.
pub fn classify(event: &CloseEvent) -> CloseKind {
    match event.code {
        Some(close_code::NORMAL_CLOSURE) => CloseKind::Graceful,
        _ => CloseKind::Abrupt,
    }
}
