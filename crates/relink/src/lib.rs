//! Reconnection controller for persistent subscription transports.
//!
//! `relink` sits next to a message-oriented connection (a GraphQL-over-
//! WebSocket client, for example) and keeps it alive across transient
//! network failures.
//!
//! # Features
//!
//! - **Close classification**: code 1000 is graceful, everything else abrupt
//! - **Jittered exponential backoff**: `min(1s * 2^n, 300s) + [300ms, 3s)`
//! - **Retry now**: short-circuit a long backoff wait, never before its 10s floor
//! - **Reconnect notifications**: fired once per genuine reconnection, not per
//!   raw connect
//! - **Event system**: every signal, attempt and wait is observable
//!
//! # Examples
//!
//! The transport reports its lifecycle through a [`SignalSender`]; the
//! controller asks it to connect through any tower [`Service`](tower::Service)
//! taking a [`ConnectAttempt`].
//!
//! ```rust
//! use relink::{ConnectAttempt, ReconnectConfig, ReconnectController};
//! use std::convert::Infallible;
//! use tower::service_fn;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = ReconnectConfig::builder()
//!     .name("graphql-ws")
//!     .max_attempts(20)
//!     .on_reconnected(|total| println!("reconnected ({total} so far)"))
//!     .build();
//!
//! let controller = ReconnectController::new(config);
//! let signals = controller.signals();
//!
//! let transport = signals.clone();
//! let handle = controller.spawn(service_fn(move |_attempt: ConnectAttempt| {
//!     let transport = transport.clone();
//!     async move {
//!         transport.on_connecting();
//!         transport.on_connected();
//!         Ok::<_, Infallible>(())
//!     }
//! }));
//!
//! let registration = handle.on_reconnected(|| println!("resubscribe"));
//!
//! // Later, when the user hits "retry" in the UI:
//! handle.force_retry_now();
//!
//! registration.unregister();
//! handle.shutdown().await;
//! # }
//! ```

pub mod backoff;
pub mod classify;
mod config;
mod controller;
pub mod detector;
mod error;
mod events;
pub mod notifier;
pub mod retry;
pub mod scheduler;
mod signal;
mod state;

pub use backoff::{ExponentialJitterBackoff, FixedInterval, FnInterval, IntervalFunction};
pub use classify::{classify, close_code, CloseEvent, CloseKind};
pub use config::{ReconnectConfig, ReconnectConfigBuilder};
pub use controller::{ConnectAttempt, ReconnectController, ReconnectHandle, RunOutcome};
pub use detector::ReconnectDetector;
pub use error::{AttemptError, ReconnectError};
pub use events::ReconnectEvent;
pub use notifier::{ReconnectNotifier, Registration};
pub use retry::{RetryController, RetryDecision, RetryPhase};
pub use scheduler::{
    DelayScheduler, RetryNowSlot, RetryNowTrigger, WaitOutcome, MIN_DELAY_BEFORE_RETRY_NOW,
};
pub use signal::{SignalSender, TransportSignal};
pub use state::{ConnectionState, ReconnectState};

pub use relink_core::events::{EventListener, EventListeners, FnListener, ListenerId};
