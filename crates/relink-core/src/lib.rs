//! Core infrastructure for relink.
//!
//! This crate provides the pieces shared by the reconnect controller:
//! - Event trait implemented by every controller event
//! - Listener registry with removable registrations
//! - Panic isolation between listeners

pub mod events;

pub use events::{EventListener, EventListeners, FnListener, ListenerId, ResilienceEvent};
