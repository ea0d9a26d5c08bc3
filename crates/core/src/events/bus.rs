//! Event bus with atomic replace-all observer semantics
//!
//! The bus holds exactly one [`ObserverSet`] at a time. `publish` takes a
//! snapshot of the current set under a read lock and dispatches outside of
//! it, so a concurrent `replace` never causes the same event to reach both
//! the old and the new set.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::types::{EventType, SessionEvent};

/// Observer callback
pub type Observer = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// An immutable set of observers, installed on the bus as a unit
#[derive(Default, Clone)]
pub struct ObserverSet {
    observers: Vec<(Option<EventType>, Observer)>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one event type
    pub fn on<F>(mut self, event_type: EventType, observer: F) -> Self
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.observers.push((Some(event_type), Arc::new(observer)));
        self
    }

    /// Observe every event
    pub fn on_any<F>(mut self, observer: F) -> Self
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.observers.push((None, Arc::new(observer)));
        self
    }

    /// Set forwarding every event into an unbounded channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let set = Self::new().on_any(move |event| {
            let _ = tx.send(event.clone());
        });
        (set, rx)
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver to every matching observer; returns how many were called
    fn dispatch(&self, event: &SessionEvent) -> usize {
        let event_type = event.event_type();
        let mut delivered = 0;
        for (filter, observer) in &self.observers {
            if filter.map_or(true, |t| t == event_type) {
                observer(event);
                delivered += 1;
            }
        }
        delivered
    }
}

impl fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Typed publish/subscribe hub for one session
#[derive(Debug, Default)]
pub struct EventBus {
    current: RwLock<Arc<ObserverSet>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically swap in a new observer set, detaching the previous one
    pub fn replace(&self, observers: ObserverSet) {
        *self.current.write() = Arc::new(observers);
    }

    /// Detach all observers
    pub fn clear(&self) {
        self.replace(ObserverSet::new());
    }

    pub fn observer_count(&self) -> usize {
        self.current.read().len()
    }

    /// Publish to the currently installed set
    pub fn publish(&self, event: &SessionEvent) -> usize {
        let observers = Arc::clone(&self.current.read());
        observers.dispatch(event)
    }
}
