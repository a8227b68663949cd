//! Retry state machine.
//!
//! ```text
//! Idle --begin_attempt--> Attempting --on_success--> Idle
//!                         Attempting --on_failure--> Waiting (retries += 1)
//! Waiting --begin_attempt--> Attempting
//! Idle --on_session_closed--> Waiting
//! ```

use std::fmt;

/// Phase of the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryPhase {
    /// No attempt in flight and no wait pending (connected, or not started).
    Idle,
    /// Backing off before the next attempt.
    Waiting,
    /// A connection attempt is in flight.
    Attempting,
}

impl RetryPhase {
    /// Returns a stable lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            RetryPhase::Idle => "idle",
            RetryPhase::Waiting => "waiting",
            RetryPhase::Attempting => "attempting",
        }
    }
}

impl fmt::Display for RetryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back off using the given retry count, then try again.
    Backoff {
        /// Retry count to feed into the delay scheduler.
        retries: u32,
    },
    /// The configured maximum was exceeded; stop retrying.
    Exhausted {
        /// Number of consecutive failed attempts.
        attempts: u32,
    },
}

/// Tracks the retry phase and the consecutive failure count.
#[derive(Debug, Clone)]
pub struct RetryController {
    phase: RetryPhase,
    retries: u32,
    max_attempts: Option<u32>,
}

impl RetryController {
    /// Creates a controller. `None` allows unlimited retries.
    pub fn new(max_attempts: Option<u32>) -> Self {
        Self {
            phase: RetryPhase::Idle,
            retries: 0,
            max_attempts,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    /// Consecutive failed attempts since the last success.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Marks the start of a connection attempt.
    pub fn begin_attempt(&mut self) {
        self.phase = RetryPhase::Attempting;
    }

    /// Records a successful attempt and resets the retry count.
    pub fn on_success(&mut self) {
        self.retries = 0;
        self.phase = RetryPhase::Idle;
    }

    /// Records a failed attempt.
    pub fn on_failure(&mut self) -> RetryDecision {
        self.retries = self.retries.saturating_add(1);

        if let Some(max) = self.max_attempts {
            if self.retries > max {
                self.phase = RetryPhase::Idle;
                return RetryDecision::Exhausted {
                    attempts: self.retries,
                };
            }
        }

        self.phase = RetryPhase::Waiting;
        RetryDecision::Backoff {
            retries: self.retries,
        }
    }

    /// Records that an established session dropped and a reconnect wait
    /// begins. Returns the retry count to back off with.
    pub fn on_session_closed(&mut self) -> u32 {
        self.phase = RetryPhase::Waiting;
        self.retries
    }
}
