use crate::backoff::{
    ExponentialJitterBackoff, IntervalFunction, DEFAULT_BASE_DELAY, DEFAULT_JITTER_MAX,
    DEFAULT_JITTER_MIN, DEFAULT_MAX_DELAY,
};
use crate::classify::CloseKind;
use crate::events::ReconnectEvent;
use crate::scheduler::MIN_DELAY_BEFORE_RETRY_NOW;
use relink_core::events::{EventListeners, FnListener};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_gauge, describe_histogram};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Configuration for a reconnect controller.
pub struct ReconnectConfig {
    pub(crate) name: String,
    pub(crate) interval: Arc<dyn IntervalFunction>,
    pub(crate) min_delay_before_retry_now: Duration,
    pub(crate) max_attempts: Option<u32>,
    pub(crate) reconnect_on_graceful_close: bool,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) event_listeners: EventListeners<ReconnectEvent>,
}

impl Clone for ReconnectConfig {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            interval: Arc::clone(&self.interval),
            min_delay_before_retry_now: self.min_delay_before_retry_now,
            max_attempts: self.max_attempts,
            reconnect_on_graceful_close: self.reconnect_on_graceful_close,
            connect_timeout: self.connect_timeout,
            event_listeners: self.event_listeners.clone(),
        }
    }
}

impl std::fmt::Debug for ReconnectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectConfig")
            .field("name", &self.name)
            .field("min_delay_before_retry_now", &self.min_delay_before_retry_now)
            .field("max_attempts", &self.max_attempts)
            .field(
                "reconnect_on_graceful_close",
                &self.reconnect_on_graceful_close,
            )
            .field("connect_timeout", &self.connect_timeout)
            .field("event_listeners", &self.event_listeners.len())
            .finish()
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfigBuilder::new().build()
    }
}

impl ReconnectConfig {
    /// Creates a new builder for configuring a reconnect controller.
    ///
    /// # Examples
    ///
    /// ```
    /// use relink::ReconnectConfig;
    /// use std::time::Duration;
    ///
    /// let config = ReconnectConfig::builder()
    ///     .name("subscriptions")
    ///     .base_delay(Duration::from_millis(500))
    ///     .max_attempts(20)
    ///     .build();
    /// assert_eq!(config.max_attempts(), Some(20));
    /// ```
    pub fn builder() -> ReconnectConfigBuilder {
        #[cfg(feature = "metrics")]
        {
            METRICS_INIT.call_once(|| {
                describe_counter!(
                    "relink_connect_attempts_total",
                    "Total number of connection attempts by outcome"
                );
                describe_counter!(
                    "relink_reconnections_total",
                    "Total number of reconnections after an abrupt close"
                );
                describe_counter!(
                    "relink_closes_total",
                    "Total number of connection closes by kind"
                );
                describe_counter!(
                    "relink_retry_short_circuits_total",
                    "Total number of backoff waits ended by a retry-now trigger"
                );
                describe_counter!(
                    "relink_attempts_exhausted_total",
                    "Total number of times a controller gave up retrying"
                );
                describe_gauge!(
                    "relink_retry_count",
                    "Consecutive failed connection attempts"
                );
                describe_histogram!(
                    "relink_backoff_delay_seconds",
                    "Scheduled backoff delay before the next attempt"
                );
            });
        }
        ReconnectConfigBuilder::new()
    }

    /// Returns the controller name used in events, logs and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the backoff delay for the given retry count.
    pub fn delay_for(&self, retries: u32) -> Duration {
        self.interval.next_interval(retries)
    }

    /// Returns the minimum wait before a retry-now trigger takes effect.
    pub fn min_delay_before_retry_now(&self) -> Duration {
        self.min_delay_before_retry_now
    }

    /// Returns the maximum number of consecutive failed attempts.
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Returns whether a graceful close is followed by a reconnect.
    pub fn reconnect_on_graceful_close(&self) -> bool {
        self.reconnect_on_graceful_close
    }

    /// Returns the per-attempt timeout.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }
}

/// Builder for [`ReconnectConfig`].
pub struct ReconnectConfigBuilder {
    name: String,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter: (Duration, Duration),
    interval_fn: Option<Arc<dyn IntervalFunction>>,
    min_delay_before_retry_now: Duration,
    max_attempts: Option<u32>,
    reconnect_on_graceful_close: bool,
    connect_timeout: Option<Duration>,
    event_listeners: EventListeners<ReconnectEvent>,
}

impl Default for ReconnectConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReconnectConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectConfigBuilder")
            .field("name", &self.name)
            .field("base_delay", &self.base_delay)
            .field("multiplier", &self.multiplier)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .field("interval_fn", &self.interval_fn.is_some())
            .field("min_delay_before_retry_now", &self.min_delay_before_retry_now)
            .field("max_attempts", &self.max_attempts)
            .field(
                "reconnect_on_graceful_close",
                &self.reconnect_on_graceful_close,
            )
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ReconnectConfigBuilder {
    /// Creates a new builder with default settings.
    ///
    /// Defaults:
    /// - base delay: 1s, multiplier 2.0, capped at 300s
    /// - jitter: uniform in `[300ms, 3000ms)`
    /// - retry-now floor: 10s
    /// - unlimited attempts
    /// - reconnect after graceful closes
    /// - no attempt timeout
    pub fn new() -> Self {
        Self {
            name: "<unnamed>".to_string(),
            base_delay: DEFAULT_BASE_DELAY,
            multiplier: 2.0,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: (DEFAULT_JITTER_MIN, DEFAULT_JITTER_MAX),
            interval_fn: None,
            min_delay_before_retry_now: MIN_DELAY_BEFORE_RETRY_NOW,
            max_attempts: None,
            reconnect_on_graceful_close: true,
            connect_timeout: None,
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the name of this controller instance for observability.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Uses a custom interval function instead of exponential backoff.
    ///
    /// Overrides `base_delay`, `multiplier`, `max_delay` and `jitter`.
    pub fn backoff<I>(mut self, interval: I) -> Self
    where
        I: IntervalFunction + 'static,
    {
        self.interval_fn = Some(Arc::new(interval));
        self
    }

    /// Sets the delay for retry count 0.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the exponential growth factor.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the cap on the exponential term. Jitter is added on top.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the jitter range `[min, max)` added to every delay.
    pub fn jitter(mut self, min: Duration, max: Duration) -> Self {
        self.jitter = (min, max);
        self
    }

    /// Sets how long a long wait runs before a retry-now trigger can end it.
    ///
    /// Delays shorter than this are never interruptible.
    pub fn min_delay_before_retry_now(mut self, delay: Duration) -> Self {
        self.min_delay_before_retry_now = delay;
        self
    }

    /// Sets the number of consecutive failed attempts tolerated.
    ///
    /// The failure after the `max`-th one exhausts the controller.
    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Retries forever. This is the default.
    pub fn unlimited_attempts(mut self) -> Self {
        self.max_attempts = None;
        self
    }

    /// Sets whether a graceful close of a live session is followed by a
    /// reconnect. When `false` the controller stops instead.
    ///
    /// Default is `true`.
    pub fn reconnect_on_graceful_close(mut self, reconnect: bool) -> Self {
        self.reconnect_on_graceful_close = reconnect;
        self
    }

    /// Fails any connection attempt that takes longer than `timeout`.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Registers a callback for every reconnection.
    ///
    /// The callback receives the running total of reconnections.
    pub fn on_reconnected<F>(mut self, f: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let ReconnectEvent::Reconnected { reconnections, .. } = event {
                f(*reconnections);
            }
        }));
        self
    }

    /// Registers a callback when a backoff wait is scheduled.
    ///
    /// # Examples
    ///
    /// ```
    /// use relink::ReconnectConfig;
    ///
    /// let config = ReconnectConfig::builder()
    ///     .on_retry(|attempt, delay| {
    ///         println!("retry #{attempt} in {delay:?}");
    ///     })
    ///     .build();
    /// ```
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let ReconnectEvent::RetryScheduled { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Registers a callback when the controller gives up.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let ReconnectEvent::AttemptsExhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback for every close reported by the transport.
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<u16>, CloseKind) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let ReconnectEvent::Closed { code, kind, .. } = event {
                f(*code, *kind);
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ReconnectConfig {
        let interval = self.interval_fn.unwrap_or_else(|| {
            Arc::new(
                ExponentialJitterBackoff::new(self.base_delay)
                    .multiplier(self.multiplier)
                    .max_interval(self.max_delay)
                    .jitter(self.jitter.0, self.jitter.1),
            )
        });

        ReconnectConfig {
            name: self.name,
            interval,
            min_delay_before_retry_now: self.min_delay_before_retry_now,
            max_attempts: self.max_attempts,
            reconnect_on_graceful_close: self.reconnect_on_graceful_close,
            connect_timeout: self.connect_timeout,
            event_listeners: self.event_listeners,
        }
    }
}
