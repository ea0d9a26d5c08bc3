//! Bounded event history

use parking_lot::Mutex;
use std::collections::VecDeque;

use super::types::SessionEvent;

/// Newest-first record of published events
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    entries: Mutex<VecDeque<SessionEvent>>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Record an event, evicting the oldest one when full
    pub fn record(&self, event: SessionEvent) {
        let mut entries = self.entries.lock();
        entries.push_front(event);
        entries.truncate(self.capacity);
    }

    /// All retained events, newest first
    pub fn snapshot(&self) -> Vec<SessionEvent> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
