//! Replay ring
//!
//! Fixed-capacity buffer holding the most recent events so a mining run
//! can replay them without a round trip to the original event source.
//! Oldest events fall off the front once capacity is reached.

use std::collections::VecDeque;

use super::Event;

/// Bounded buffer of the most recent events, oldest first.
#[derive(Debug)]
pub struct ReplayRing {
    buf: VecDeque<Event>,
    capacity: usize,
    /// Total events ever pushed, including evicted ones
    total_seen: u64,
}

impl ReplayRing {
    /// Create a ring holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            total_seen: 0,
        }
    }

    /// Append an event, evicting the oldest when full.
    pub fn push(&mut self, event: Event) {
        if self.capacity == 0 {
            return;
        }
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(event);
        self.total_seen += 1;
    }

    /// Clone out the retained events in arrival order.
    pub fn snapshot(&self) -> Vec<Event> {
        self.buf.iter().cloned().collect()
    }

    /// Events currently retained.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the ring holds no events.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total events pushed over the ring's lifetime.
    pub fn total_seen(&self) -> u64 {
        self.total_seen
    }

    /// Drop all retained events.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
