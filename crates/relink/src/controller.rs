//! The reconnect worker and its handle.
//!
//! One worker task per controller owns the detector and the retry state
//! machine. It attempts connections through a tower [`Service`], backs off
//! between failures, and processes transport signals whenever it is
//! suspended, so signals are always handled in the order they were sent.

use crate::classify::{CloseEvent, CloseKind};
use crate::config::ReconnectConfig;
use crate::detector::ReconnectDetector;
use crate::error::{AttemptError, ReconnectError};
use crate::events::ReconnectEvent;
use crate::notifier::{ReconnectNotifier, Registration};
use crate::retry::{RetryController, RetryDecision, RetryPhase};
use crate::scheduler::{DelayScheduler, RetryNowSlot, RetryNowTrigger, WaitOutcome};
use crate::signal::{SignalSender, TransportSignal};
use crate::state::{ConnectionState, ReconnectState};
use relink_core::events::EventListener;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tower::{Service, ServiceExt};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge, histogram};

/// Request passed to the connector for every connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectAttempt {
    /// 1-based number of this attempt over the controller's lifetime.
    pub attempt: u64,
    /// Consecutive failed attempts before this one.
    pub retries: u32,
}

/// How a controller stopped when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A live session closed gracefully and reconnecting after graceful
    /// closes is disabled.
    ClosedGracefully,
    /// Every [`SignalSender`] was dropped while a session was live, so its
    /// end can never be observed.
    TransportDropped,
}

/// A reconnect controller that has not been started yet.
///
/// Take a [`SignalSender`] for the transport and register observers, then
/// start the worker with [`spawn`](Self::spawn).
///
/// # Examples
///
/// ```no_run
/// use relink::{ConnectAttempt, ReconnectConfig, ReconnectController};
/// use std::convert::Infallible;
/// use tower::service_fn;
///
/// # async fn example() {
/// let controller = ReconnectController::new(ReconnectConfig::default());
/// let signals = controller.signals();
///
/// let handle = controller.spawn(service_fn(move |_: ConnectAttempt| {
///     let signals = signals.clone();
///     async move {
///         signals.on_connected();
///         Ok::<_, Infallible>(())
///     }
/// }));
///
/// let _registration = handle.on_reconnected(|| println!("reconnected"));
/// # }
/// ```
pub struct ReconnectController {
    config: ReconnectConfig,
    state: ReconnectState,
    notifier: ReconnectNotifier,
    slot: RetryNowSlot,
    signal_tx: mpsc::UnboundedSender<TransportSignal>,
    signal_rx: mpsc::UnboundedReceiver<TransportSignal>,
}

impl std::fmt::Debug for ReconnectController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectController")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

impl ReconnectController {
    /// Creates a controller. Listeners registered on the config are
    /// installed into its notifier.
    pub fn new(config: ReconnectConfig) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let notifier = ReconnectNotifier::with_listeners(&config.event_listeners);
        Self {
            config,
            state: ReconnectState::new(),
            notifier,
            slot: RetryNowSlot::new(),
            signal_tx,
            signal_rx,
        }
    }

    /// Returns a sender for the transport's lifecycle signals.
    pub fn signals(&self) -> SignalSender {
        SignalSender::new(self.signal_tx.clone())
    }

    /// Returns the shared state.
    pub fn state(&self) -> &ReconnectState {
        &self.state
    }

    /// Returns the notifier, for registering observers before starting.
    pub fn notifier(&self) -> &ReconnectNotifier {
        &self.notifier
    }

    /// Returns the retry-now slot. Callers driving [`run`](Self::run)
    /// themselves fire it in place of [`ReconnectHandle::force_retry_now`].
    pub fn retry_now_slot(&self) -> &RetryNowSlot {
        &self.slot
    }

    /// Runs the worker on a new task.
    pub fn spawn<S>(self, connector: S) -> ReconnectHandle<S::Error>
    where
        S: Service<ConnectAttempt, Response = ()> + Send + 'static,
        S::Future: Send,
        S::Error: Send + 'static,
    {
        let state = self.state.clone();
        let notifier = self.notifier.clone();
        let slot = self.slot.clone();
        let task = tokio::spawn(self.run(connector));

        ReconnectHandle {
            state,
            notifier,
            slot,
            task: Some(task),
        }
    }

    /// Runs the worker on the current task until it stops.
    pub async fn run<S>(self, connector: S) -> Result<RunOutcome, ReconnectError<S::Error>>
    where
        S: Service<ConnectAttempt, Response = ()>,
    {
        let Self {
            config,
            state,
            notifier,
            slot,
            signal_tx,
            signal_rx,
        } = self;
        // Only external senders keep the channel open.
        drop(signal_tx);

        let scheduler = DelayScheduler::with_slot(config.min_delay_before_retry_now, slot);
        let mut worker = Worker {
            connector,
            signals: Signals {
                rx: signal_rx,
                open: true,
            },
            scheduler,
            core: Core {
                detector: ReconnectDetector::new(),
                retry: RetryController::new(config.max_attempts),
                notifier,
                state,
                config,
                attempts: 0,
                connects: 0,
                closes: 0,
                last_close: None,
            },
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(controller = %worker.core.config.name, "reconnect worker started");

        worker.run().await
    }
}

struct Signals {
    rx: mpsc::UnboundedReceiver<TransportSignal>,
    open: bool,
}

/// Everything the worker mutates apart from the connector and the channel.
struct Core {
    detector: ReconnectDetector,
    retry: RetryController,
    notifier: ReconnectNotifier,
    state: ReconnectState,
    config: ReconnectConfig,
    attempts: u64,
    connects: u64,
    closes: u64,
    last_close: Option<CloseKind>,
}

enum SessionEnd {
    Closed(CloseKind),
    Dropped,
}

struct Worker<S> {
    connector: S,
    signals: Signals,
    scheduler: DelayScheduler,
    core: Core,
}

impl<S> Worker<S>
where
    S: Service<ConnectAttempt, Response = ()>,
{
    async fn run(&mut self) -> Result<RunOutcome, ReconnectError<S::Error>> {
        loop {
            let connects_before = self.core.connects;
            let retries = match self.attempt().await {
                Ok(()) => {
                    self.core.on_attempt_succeeded();
                    match self.await_session_end(connects_before).await {
                        SessionEnd::Dropped => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(
                                controller = %self.core.config.name,
                                "all signal senders dropped; stopping"
                            );
                            return Ok(RunOutcome::TransportDropped);
                        }
                        SessionEnd::Closed(CloseKind::Graceful)
                            if !self.core.config.reconnect_on_graceful_close =>
                        {
                            #[cfg(feature = "tracing")]
                            tracing::info!(
                                controller = %self.core.config.name,
                                "session closed gracefully; not reconnecting"
                            );
                            return Ok(RunOutcome::ClosedGracefully);
                        }
                        SessionEnd::Closed(_) => self.core.retry.on_session_closed(),
                    }
                }
                Err(error) => match self.core.on_attempt_failed(&error) {
                    RetryDecision::Backoff { retries } => retries,
                    RetryDecision::Exhausted { attempts } => {
                        self.core.on_exhausted(attempts);
                        return Err(ReconnectError::AttemptsExhausted {
                            attempts,
                            source: error,
                        });
                    }
                },
            };
            self.backoff(retries).await;
        }
    }

    /// Makes one connection attempt while still processing signals.
    async fn attempt(&mut self) -> Result<(), AttemptError<S::Error>> {
        let Self {
            connector,
            signals,
            core,
            ..
        } = self;

        let request = core.begin_attempt();
        let timeout = core.config.connect_timeout;

        let call = async move {
            let connect = async {
                match connector.ready().await {
                    Ok(connector) => connector
                        .call(request)
                        .await
                        .map_err(AttemptError::Transport),
                    Err(e) => Err(AttemptError::Transport(e)),
                }
            };
            match timeout {
                Some(limit) => tokio::time::timeout(limit, connect)
                    .await
                    .unwrap_or(Err(AttemptError::TimedOut(limit))),
                None => connect.await,
            }
        };
        tokio::pin!(call);

        loop {
            tokio::select! {
                biased;
                signal = signals.rx.recv(), if signals.open => match signal {
                    Some(signal) => core.handle_signal(signal),
                    None => signals.open = false,
                },
                result = &mut call => return result,
            }
        }
    }

    /// Backs off before the next attempt. Returns once the delay elapsed or
    /// a retry-now trigger ended it.
    async fn backoff(&mut self, retries: u32) {
        let Self {
            signals,
            scheduler,
            core,
            ..
        } = self;

        let delay = core.config.delay_for(retries);
        let interruptible = scheduler.is_interruptible(delay);
        core.on_retry_scheduled(retries, delay, interruptible);

        let wait = scheduler.wait(delay);
        tokio::pin!(wait);

        let outcome = loop {
            tokio::select! {
                biased;
                signal = signals.rx.recv(), if signals.open => match signal {
                    Some(signal) => core.handle_signal(signal),
                    None => signals.open = false,
                },
                outcome = &mut wait => break outcome,
            }
        };

        if outcome == WaitOutcome::ShortCircuited {
            core.on_short_circuited(retries);
        }
    }

    /// Processes signals until the session opened by the last attempt
    /// closes.
    ///
    /// Only a close that follows the most recent `Connected` ends the
    /// session. If the transport connected and then closed again before the
    /// attempt returned, the session has already ended.
    async fn await_session_end(&mut self, connects_before: u64) -> SessionEnd {
        // Signals sent by the connector before it returned.
        while self.signals.open {
            match self.signals.rx.try_recv() {
                Ok(signal) => self.core.handle_signal(signal),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.signals.open = false,
            }
        }

        let closes_before = match self.core.state.connection() {
            ConnectionState::Disconnected if self.core.connects > connects_before => {
                self.core.closes.saturating_sub(1)
            }
            _ => self.core.closes,
        };
        loop {
            if self.core.closes > closes_before {
                return match self.core.last_close {
                    Some(kind) => SessionEnd::Closed(kind),
                    None => SessionEnd::Dropped,
                };
            }
            if !self.signals.open {
                return SessionEnd::Dropped;
            }
            match self.signals.rx.recv().await {
                Some(signal) => self.core.handle_signal(signal),
                None => self.signals.open = false,
            }
        }
    }
}

impl<S> Drop for Worker<S> {
    fn drop(&mut self) {
        self.scheduler.slot().revoke();
        self.core.state.mark_terminated();
    }
}

impl Core {
    fn name(&self) -> String {
        self.config.name.clone()
    }

    fn fire(&self, event: ReconnectEvent) {
        self.notifier.fire(&event);
    }

    fn begin_attempt(&mut self) -> ConnectAttempt {
        self.attempts += 1;
        self.retry.begin_attempt();
        self.state.set_phase(RetryPhase::Attempting);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            controller = %self.config.name,
            attempt = self.attempts,
            retries = self.retry.retries(),
            "attempting connection"
        );

        ConnectAttempt {
            attempt: self.attempts,
            retries: self.retry.retries(),
        }
    }

    fn on_attempt_succeeded(&mut self) {
        self.retry.on_success();
        self.state.set_retries(0);
        self.state.set_phase(RetryPhase::Idle);

        #[cfg(feature = "tracing")]
        tracing::debug!(controller = %self.config.name, "connection attempt succeeded");

        #[cfg(feature = "metrics")]
        {
            counter!(
                "relink_connect_attempts_total",
                "controller" => self.name(),
                "outcome" => "success"
            )
            .increment(1);
            gauge!("relink_retry_count", "controller" => self.name()).set(0.0);
        }
    }

    fn on_attempt_failed<E>(&mut self, _error: &AttemptError<E>) -> RetryDecision {
        let decision = self.retry.on_failure();
        let retries = self.retry.retries();
        self.state.set_retries(retries);
        self.state.set_phase(self.retry.phase());

        #[cfg(feature = "tracing")]
        tracing::warn!(
            controller = %self.config.name,
            retries,
            timed_out = _error.is_timeout(),
            "connection attempt failed"
        );

        #[cfg(feature = "metrics")]
        {
            let outcome = if _error.is_timeout() { "timeout" } else { "failure" };
            counter!(
                "relink_connect_attempts_total",
                "controller" => self.name(),
                "outcome" => outcome
            )
            .increment(1);
            gauge!("relink_retry_count", "controller" => self.name()).set(f64::from(retries));
        }

        self.fire(ReconnectEvent::AttemptFailed {
            pattern_name: self.name(),
            timestamp: Instant::now(),
            attempt: retries,
        });
        decision
    }

    fn on_exhausted(&mut self, attempts: u32) {
        #[cfg(feature = "tracing")]
        tracing::error!(
            controller = %self.config.name,
            attempts,
            "giving up after too many failed connection attempts"
        );

        #[cfg(feature = "metrics")]
        counter!("relink_attempts_exhausted_total", "controller" => self.name()).increment(1);

        self.fire(ReconnectEvent::AttemptsExhausted {
            pattern_name: self.name(),
            timestamp: Instant::now(),
            attempts,
        });
    }

    fn on_retry_scheduled(
        &mut self,
        retries: u32,
        delay: std::time::Duration,
        interruptible: bool,
    ) {
        self.state.set_phase(RetryPhase::Waiting);

        #[cfg(feature = "tracing")]
        tracing::info!(
            controller = %self.config.name,
            retries,
            delay_ms = delay.as_millis() as u64,
            interruptible,
            "scheduling reconnect"
        );

        #[cfg(feature = "metrics")]
        histogram!("relink_backoff_delay_seconds", "controller" => self.name())
            .record(delay.as_secs_f64());

        self.fire(ReconnectEvent::RetryScheduled {
            pattern_name: self.name(),
            timestamp: Instant::now(),
            attempt: retries,
            delay,
            interruptible,
        });
    }

    fn on_short_circuited(&mut self, retries: u32) {
        #[cfg(feature = "tracing")]
        tracing::info!(controller = %self.config.name, retries, "backoff wait short-circuited");

        #[cfg(feature = "metrics")]
        counter!("relink_retry_short_circuits_total", "controller" => self.name()).increment(1);

        self.fire(ReconnectEvent::RetryShortCircuited {
            pattern_name: self.name(),
            timestamp: Instant::now(),
            attempt: retries,
        });
    }

    fn handle_signal(&mut self, signal: TransportSignal) {
        match signal {
            TransportSignal::Connecting => {
                self.state.set_connection(ConnectionState::Connecting);
                self.fire(ReconnectEvent::Connecting {
                    pattern_name: self.name(),
                    timestamp: Instant::now(),
                });
            }
            TransportSignal::Connected => self.on_connected(),
            TransportSignal::Closed(close) => self.on_closed(close),
            TransportSignal::Error(message) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(controller = %self.config.name, error = %message, "transport error");

                self.fire(ReconnectEvent::TransportError {
                    pattern_name: self.name(),
                    timestamp: Instant::now(),
                    message,
                });
            }
        }
    }

    fn on_connected(&mut self) {
        self.connects += 1;
        self.state.set_connection(ConnectionState::Connected);
        self.fire(ReconnectEvent::Connected {
            pattern_name: self.name(),
            timestamp: Instant::now(),
        });

        if self.detector.on_connected() {
            let reconnections = self.state.increment_reconnections();

            #[cfg(feature = "tracing")]
            tracing::info!(controller = %self.config.name, reconnections, "reconnected");

            #[cfg(feature = "metrics")]
            counter!("relink_reconnections_total", "controller" => self.name()).increment(1);

            self.fire(ReconnectEvent::Reconnected {
                pattern_name: self.name(),
                timestamp: Instant::now(),
                reconnections,
            });
        }
    }

    fn on_closed(&mut self, close: CloseEvent) {
        let kind = close.kind();
        self.detector.on_closed(kind);
        self.state.set_connection(ConnectionState::Disconnected);
        self.closes += 1;
        self.last_close = Some(kind);

        #[cfg(feature = "tracing")]
        tracing::info!(
            controller = %self.config.name,
            code = ?close.code,
            reason = %close.reason,
            kind = kind.as_str(),
            "connection closed"
        );

        #[cfg(feature = "metrics")]
        counter!("relink_closes_total", "controller" => self.name(), "kind" => kind.as_str())
            .increment(1);

        self.fire(ReconnectEvent::Closed {
            pattern_name: self.name(),
            timestamp: Instant::now(),
            code: close.code,
            reason: close.reason,
            kind,
        });
    }
}

/// Handle to a running reconnect controller.
///
/// Dropping the handle aborts the worker: a pending backoff wait is
/// cancelled, no further attempt is made, and every outstanding retry-now
/// trigger becomes a no-op.
pub struct ReconnectHandle<E> {
    state: ReconnectState,
    notifier: ReconnectNotifier,
    slot: RetryNowSlot,
    task: Option<JoinHandle<Result<RunOutcome, ReconnectError<E>>>>,
}

impl<E> std::fmt::Debug for ReconnectHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectHandle")
            .field("state", &self.state)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl<E> ReconnectHandle<E> {
    /// Registers a callback fired once per genuine reconnection.
    pub fn on_reconnected<F>(&self, f: F) -> Registration
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.notifier.on_reconnected(f)
    }

    /// Registers a callback for every event the controller emits.
    pub fn on_event<F>(&self, f: F) -> Registration
    where
        F: Fn(&ReconnectEvent) + Send + Sync + 'static,
    {
        self.notifier.on_event(f)
    }

    /// Registers a listener for every event the controller emits.
    pub fn register<L>(&self, listener: L) -> Registration
    where
        L: EventListener<ReconnectEvent> + 'static,
    {
        self.notifier.register(listener)
    }

    /// Ends the current backoff wait early, if it is interruptible.
    ///
    /// A trigger fired before the wait's floor has passed takes effect when
    /// it does. Returns `false` when no interruptible wait is pending.
    pub fn force_retry_now(&self) -> bool {
        self.slot.fire()
    }

    /// Returns a trigger bound to the current interruptible wait.
    pub fn retry_now_trigger(&self) -> Option<RetryNowTrigger> {
        self.slot.trigger()
    }

    /// Returns the shared state.
    pub fn state(&self) -> &ReconnectState {
        &self.state
    }

    /// Returns true once the worker has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the worker to stop and returns how it ended.
    pub async fn join(mut self) -> Result<RunOutcome, ReconnectError<E>> {
        let Some(task) = self.task.take() else {
            return Err(ReconnectError::Shutdown);
        };
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ReconnectError::Shutdown),
            Err(e) => Err(ReconnectError::Aborted(e.to_string())),
        }
    }

    /// Stops the worker and waits for it to be torn down.
    pub async fn shutdown(mut self) {
        self.slot.revoke();
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl<E> Drop for ReconnectHandle<E> {
    fn drop(&mut self) {
        self.slot.revoke();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
