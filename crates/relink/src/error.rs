//! Error types for the reconnect controller.

use std::time::Duration;

/// Why a single connection attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError<E> {
    /// The connector returned an error.
    #[error("connection attempt failed: {0}")]
    Transport(#[source] E),
    /// The attempt did not complete within the configured timeout.
    #[error("connection attempt timed out after {0:?}")]
    TimedOut(Duration),
}

impl<E> AttemptError<E> {
    /// Returns the connector error, if this was not a timeout.
    pub fn transport(&self) -> Option<&E> {
        match self {
            AttemptError::Transport(e) => Some(e),
            AttemptError::TimedOut(_) => None,
        }
    }

    /// Returns true for [`AttemptError::TimedOut`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, AttemptError::TimedOut(_))
    }
}

/// Errors that end a reconnect controller.
#[derive(Debug, thiserror::Error)]
pub enum ReconnectError<E> {
    /// Too many consecutive connection attempts failed.
    #[error("gave up reconnecting after {attempts} failed attempts")]
    AttemptsExhausted {
        /// Number of consecutive failed attempts.
        attempts: u32,
        /// The failure of the last attempt.
        #[source]
        source: AttemptError<E>,
    },
    /// The controller was shut down before it finished.
    #[error("reconnect controller was shut down")]
    Shutdown,
    /// The worker task panicked.
    #[error("reconnect worker aborted: {0}")]
    Aborted(String),
}

impl<E> ReconnectError<E> {
    /// Returns true for [`ReconnectError::AttemptsExhausted`].
    pub fn is_exhausted(&self) -> bool {
        matches!(self, ReconnectError::AttemptsExhausted { .. })
    }

    /// Returns true for [`ReconnectError::Shutdown`].
    pub fn is_shutdown(&self) -> bool {
        matches!(self, ReconnectError::Shutdown)
    }
}
