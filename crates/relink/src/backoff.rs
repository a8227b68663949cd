//! Backoff interval functions.
//!
//! The default is the randomized exponential schedule used by subscription
//! clients: `min(base * 2^n, max) + jitter`, with jitter drawn uniformly
//! from `[300ms, 3000ms)`.

use rand::Rng;
use std::time::Duration;

/// Default base delay for the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default cap on the exponential term, applied before jitter.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);

/// Default lower bound of the jitter range (inclusive).
pub const DEFAULT_JITTER_MIN: Duration = Duration::from_millis(300);

/// Default upper bound of the jitter range (exclusive).
pub const DEFAULT_JITTER_MAX: Duration = Duration::from_millis(3000);

/// Abstraction for computing backoff intervals.
///
/// This trait allows plugging in fixed delays or custom schedules in place of
/// the default [`ExponentialJitterBackoff`].
pub trait IntervalFunction: Send + Sync {
    /// Computes the delay before the next connection attempt.
    ///
    /// # Arguments
    /// * `retries` - The current retry count (0 after a successful connection)
    fn next_interval(&self, retries: u32) -> Duration;
}

/// Fixed interval backoff - returns the same duration for every retry.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    duration: Duration,
}

impl FixedInterval {
    /// Creates a new fixed interval backoff.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl IntervalFunction for FixedInterval {
    fn next_interval(&self, _retries: u32) -> Duration {
        self.duration
    }
}

/// Exponential backoff with an additive random jitter.
#[derive(Debug, Clone)]
pub struct ExponentialJitterBackoff {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
    jitter_min: Duration,
    jitter_max: Duration,
}

impl Default for ExponentialJitterBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY)
    }
}

impl ExponentialJitterBackoff {
    /// Creates a new backoff with a multiplier of 2.0, a 300s cap and
    /// jitter in `[300ms, 3000ms)`.
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            initial_interval,
            multiplier: 2.0,
            max_interval: DEFAULT_MAX_DELAY,
            jitter_min: DEFAULT_JITTER_MIN,
            jitter_max: DEFAULT_JITTER_MAX,
        }
    }

    /// Sets the multiplier for exponential growth. Values below 1.0 are
    /// raised to 1.0.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Sets the cap applied to the exponential term before jitter is added.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Sets the jitter range `[min, max)`.
    ///
    /// When `max <= min` the jitter is exactly `min`.
    pub fn jitter(mut self, min: Duration, max: Duration) -> Self {
        self.jitter_min = min;
        self.jitter_max = max;
        self
    }

    /// Disables jitter.
    pub fn without_jitter(self) -> Self {
        self.jitter(Duration::ZERO, Duration::ZERO)
    }

    /// Returns the jitter range.
    pub fn jitter_range(&self) -> (Duration, Duration) {
        (self.jitter_min, self.jitter_max)
    }

    /// Returns the exponential term for `retries`, capped at the max interval.
    ///
    /// Saturates to the cap instead of overflowing for large retry counts.
    pub fn base_interval(&self, retries: u32) -> Duration {
        let exponent = retries.min(i32::MAX as u32) as i32;
        let factor = self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(self.initial_interval.as_secs_f64() * factor)
            .map(|interval| interval.min(self.max_interval))
            .unwrap_or(self.max_interval)
    }

    fn sample_jitter(&self) -> Duration {
        if self.jitter_max <= self.jitter_min {
            return self.jitter_min;
        }
        let min = u64::try_from(self.jitter_min.as_nanos())
            .unwrap_or(u64::MAX);
        let max = u64::try_from(self.jitter_max.as_nanos())
            .unwrap_or(u64::MAX);
        if max <= min {
            return self.jitter_min;
        }
        Duration::from_nanos(rand::rng().random_range(min..max))
    }
}

impl IntervalFunction for ExponentialJitterBackoff {
    fn next_interval(&self, retries: u32) -> Duration {
        self.base_interval(retries)
            .saturating_add(self.sample_jitter())
    }
}

/// Function-based interval implementation.
pub struct FnInterval<F> {
    f: F,
}

impl<F> FnInterval<F>
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    /// Creates a new function-based interval.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> IntervalFunction for FnInterval<F>
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn next_interval(&self, retries: u32) -> Duration {
        (self.f)(retries)
    }
}
