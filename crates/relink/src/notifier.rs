//! Observer registry for reconnect events.
//!
//! Delivery happens on a snapshot taken under the lock and emitted after it
//! is released, so a listener may register or unregister (itself included)
//! from inside its own callback.

use crate::events::ReconnectEvent;
use relink_core::events::{EventListener, EventListeners, FnListener, ListenerId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Listeners = Mutex<EventListeners<ReconnectEvent>>;

/// Fans reconnect events out to registered observers.
#[derive(Debug, Clone, Default)]
pub struct ReconnectNotifier {
    listeners: Arc<Listeners>,
}

impl ReconnectNotifier {
    /// Creates a notifier with no observers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a notifier pre-populated with `listeners`.
    pub fn with_listeners(listeners: &EventListeners<ReconnectEvent>) -> Self {
        let notifier = Self::new();
        notifier.lock().extend(listeners);
        notifier
    }

    fn lock(&self) -> MutexGuard<'_, EventListeners<ReconnectEvent>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a listener for every event.
    pub fn register<L>(&self, listener: L) -> Registration
    where
        L: EventListener<ReconnectEvent> + 'static,
    {
        let id = self.lock().add(listener);
        Registration {
            listeners: Arc::downgrade(&self.listeners),
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Registers a closure for every event.
    pub fn on_event<F>(&self, f: F) -> Registration
    where
        F: Fn(&ReconnectEvent) + Send + Sync + 'static,
    {
        self.register(FnListener::new(f))
    }

    /// Registers a closure called once per genuine reconnection.
    pub fn on_reconnected<F>(&self, f: F) -> Registration
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if matches!(event, ReconnectEvent::Reconnected { .. }) {
                f();
            }
        })
    }

    /// Delivers `event` to every currently registered observer.
    ///
    /// Returns the number of observers that panicked.
    pub fn fire(&self, event: &ReconnectEvent) -> usize {
        let snapshot = self.lock().clone();
        snapshot.emit(event)
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Handle returned by [`ReconnectNotifier::register`].
///
/// Dropping a registration leaves the observer in place; call
/// [`unregister`](Self::unregister) to stop delivery.
#[derive(Debug)]
pub struct Registration {
    listeners: Weak<Listeners>,
    id: ListenerId,
    active: AtomicBool,
}

impl Registration {
    /// The id of the registered observer.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Returns true until this registration has been removed.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Removes the observer. Later events are not delivered to it.
    ///
    /// Returns `true` only for the call that actually removed it; repeated
    /// calls, or calls after the controller is gone, are no-ops.
    pub fn unregister(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        match self.listeners.upgrade() {
            Some(listeners) => listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(self.id),
            None => false,
        }
    }
}
