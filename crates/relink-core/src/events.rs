//! Event system for the reconnect controller.
//!
//! Listeners are registered under a [`ListenerId`] so they can be removed
//! again. Emission walks the listeners in registration order and isolates
//! each one: a panicking listener never stops delivery to the rest.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait for events emitted by the controller.
pub trait ResilienceEvent: Send + Sync + fmt::Debug {
    /// Returns the type of event (e.g., "reconnected", "closed").
    fn event_type(&self) -> &'static str;

    /// Returns when this event occurred.
    fn timestamp(&self) -> Instant;

    /// Returns the name of the controller instance that emitted this event.
    fn pattern_name(&self) -> &str;
}

/// Trait for listening to events.
pub trait EventListener<E: ResilienceEvent>: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &E);
}

/// Type alias for boxed event listeners.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// Identifies a registered listener within one [`EventListeners`] collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Returns the raw numeric value of this id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// A collection of event listeners.
///
/// Cloning is cheap: listeners are shared behind `Arc`, so a clone is a
/// snapshot that can be emitted to without holding any lock.
pub struct EventListeners<E: ResilienceEvent> {
    listeners: Vec<(ListenerId, BoxedEventListener<E>)>,
    next_id: u64,
}

impl<E: ResilienceEvent> Clone for EventListeners<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
            next_id: self.next_id,
        }
    }
}

impl<E: ResilienceEvent> EventListeners<E> {
    /// Creates a new empty event listener collection.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    /// Adds a listener to the collection and returns its id.
    pub fn add<L>(&mut self, listener: L) -> ListenerId
    where
        L: EventListener<E> + 'static,
    {
        self.add_shared(Arc::new(listener))
    }

    /// Adds an already shared listener to the collection.
    pub fn add_shared(&mut self, listener: BoxedEventListener<E>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, listener));
        id
    }

    /// Adds every listener of `other`, assigning fresh ids.
    pub fn extend(&mut self, other: &EventListeners<E>) {
        for (_, listener) in &other.listeners {
            self.add_shared(Arc::clone(listener));
        }
    }

    /// Removes the listener registered under `id`.
    ///
    /// Returns `false` if no such listener is registered, so removing twice
    /// is harmless.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    /// Returns true if a listener is registered under `id`.
    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|(existing, _)| *existing == id)
    }

    /// Emits an event to all registered listeners.
    ///
    /// If a listener panics, the panic is caught and the remaining listeners
    /// will still be called. Returns the number of listeners that panicked.
    pub fn emit(&self, event: &E) -> usize {
        let mut panicked = 0;
        for (_id, listener) in &self.listeners {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
            if result.is_err() {
                panicked += 1;

                #[cfg(feature = "tracing")]
                tracing::warn!(
                    pattern = event.pattern_name(),
                    event_type = event.event_type(),
                    listener = _id.get(),
                    "event listener panicked; continuing delivery"
                );
            }
        }
        panicked
    }

    /// Returns true if there are no listeners.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Returns the number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: ResilienceEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ResilienceEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("len", &self.listeners.len())
            .finish()
    }
}

/// A simple function-based event listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Creates a new function-based listener.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: ResilienceEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
