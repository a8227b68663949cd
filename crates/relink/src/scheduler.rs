//! Backoff waits with an optional "retry now" short-circuit.
//!
//! Short delays are plain sleeps. Delays at or above the floor arm a
//! single-use [`RetryNowSlot`] and then always sleep for the floor before
//! racing the remainder against the trigger, so retries can never be forced
//! faster than once per floor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// Minimum time a long backoff wait runs before it can be short-circuited.
pub const MIN_DELAY_BEFORE_RETRY_NOW: Duration = Duration::from_secs(10);

/// How a backoff wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full delay elapsed.
    Elapsed,
    /// A retry-now trigger ended the wait early.
    ShortCircuited,
}

#[derive(Debug, Default)]
struct SlotInner {
    armed: Option<(u64, oneshot::Sender<()>)>,
    revoked: bool,
}

/// Holds the trigger for the wait currently in flight, if any.
///
/// Every armed wait gets a fresh generation, so a [`RetryNowTrigger`] taken
/// during an earlier wait can never end a later one.
#[derive(Debug, Clone, Default)]
pub struct RetryNowSlot {
    inner: Arc<Mutex<SlotInner>>,
    generations: Arc<AtomicU64>,
}

impl RetryNowSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms the slot for a new wait, replacing whatever was armed before.
    ///
    /// Returns `None` once the slot has been revoked.
    fn arm(&self) -> Option<(u64, oneshot::Receiver<()>)> {
        let mut inner = self.lock();
        if inner.revoked {
            return None;
        }
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        inner.armed = Some((generation, tx));
        Some((generation, rx))
    }

    fn disarm(&self, generation: u64) {
        let mut inner = self.lock();
        if matches!(inner.armed, Some((current, _)) if current == generation) {
            inner.armed = None;
        }
    }

    fn fire_generation(&self, generation: Option<u64>) -> bool {
        let sender = {
            let mut inner = self.lock();
            let matches = match (&inner.armed, generation) {
                (Some(_), None) => true,
                (Some((current, _)), Some(wanted)) => *current == wanted,
                (None, _) => false,
            };
            if matches { inner.armed.take() } else { None }
        };
        match sender {
            Some((_, tx)) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Ends the armed wait early. A no-op when nothing is armed.
    ///
    /// Returns `true` if a pending wait was signalled.
    pub fn fire(&self) -> bool {
        self.fire_generation(None)
    }

    /// Returns a trigger bound to the currently armed wait.
    pub fn trigger(&self) -> Option<RetryNowTrigger> {
        let generation = self
            .lock()
            .armed
            .as_ref()
            .map(|(generation, _)| *generation)?;
        Some(RetryNowTrigger {
            slot: self.clone(),
            generation,
        })
    }

    /// Returns true while an interruptible wait is in flight.
    pub fn is_armed(&self) -> bool {
        self.lock().armed.is_some()
    }

    /// Disarms the slot permanently. Later waits are not interruptible and
    /// every outstanding trigger becomes a no-op.
    pub fn revoke(&self) {
        let mut inner = self.lock();
        inner.revoked = true;
        inner.armed = None;
    }

    /// Returns true once [`revoke`](Self::revoke) has been called.
    pub fn is_revoked(&self) -> bool {
        self.lock().revoked
    }
}

/// Single-use handle that ends one specific backoff wait early.
#[derive(Debug, Clone)]
pub struct RetryNowTrigger {
    slot: RetryNowSlot,
    generation: u64,
}

impl RetryNowTrigger {
    /// Fires the trigger.
    ///
    /// Returns `false` if the wait it was taken for has already ended, was
    /// already short-circuited, or the controller was torn down.
    pub fn fire(&self) -> bool {
        self.slot.fire_generation(Some(self.generation))
    }

    /// The wait generation this trigger belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Disarms its generation when the wait finishes or is dropped mid-way.
struct ArmedWait<'a> {
    slot: &'a RetryNowSlot,
    generation: u64,
}

impl Drop for ArmedWait<'_> {
    fn drop(&mut self) {
        self.slot.disarm(self.generation);
    }
}

/// Performs backoff waits.
#[derive(Debug, Clone)]
pub struct DelayScheduler {
    floor: Duration,
    slot: RetryNowSlot,
}

impl Default for DelayScheduler {
    fn default() -> Self {
        Self::new(MIN_DELAY_BEFORE_RETRY_NOW)
    }
}

impl DelayScheduler {
    /// Creates a scheduler with its own slot.
    pub fn new(floor: Duration) -> Self {
        Self::with_slot(floor, RetryNowSlot::new())
    }

    /// Creates a scheduler sharing an existing slot.
    pub fn with_slot(floor: Duration, slot: RetryNowSlot) -> Self {
        Self { floor, slot }
    }

    /// The minimum wait before a short-circuit can take effect.
    pub fn floor(&self) -> Duration {
        self.floor
    }

    /// The slot armed by long waits.
    pub fn slot(&self) -> &RetryNowSlot {
        &self.slot
    }

    /// Returns true if a wait of `delay` can be short-circuited.
    pub fn is_interruptible(&self, delay: Duration) -> bool {
        delay >= self.floor
    }

    /// Waits for `delay`.
    ///
    /// A trigger fired during the floor is remembered and ends the wait as
    /// soon as the floor has passed.
    pub async fn wait(&self, delay: Duration) -> WaitOutcome {
        if !self.is_interruptible(delay) {
            tokio::time::sleep(delay).await;
            return WaitOutcome::Elapsed;
        }

        let (generation, mut retry_now) = match self.slot.arm() {
            Some(armed) => armed,
            None => {
                tokio::time::sleep(delay).await;
                return WaitOutcome::Elapsed;
            }
        };
        let _armed = ArmedWait {
            slot: &self.slot,
            generation,
        };

        tokio::time::sleep(self.floor).await;

        tokio::select! {
            biased;
            Ok(()) = &mut retry_now => WaitOutcome::ShortCircuited,
            _ = tokio::time::sleep(delay - self.floor) => WaitOutcome::Elapsed,
        }
    }
}
