//! Dispatcher - in-process pub/sub
//!
//! Channels-and-workers: every subscriber owns one bounded queue. Publish
//! appends synchronously in subscriber registration order, so events from
//! one source arrive at each subscriber in production order (FIFO per
//! source); nothing is guaranteed across sources. Telemetry events drop
//! the oldest queued entry on overflow; lifecycle events (candidate
//! decisions) block the publisher until space frees up, because losing
//! them would desynchronize stores.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::miner::Rule;
use crate::neurons::Suggestion;

/// How long a blocking lifecycle publish waits between capacity checks.
const BLOCK_POLL: Duration = Duration::from_millis(5);

// ============================================================================
// EVENTS
// ============================================================================

/// Every event the core publishes between its components and to
/// external sinks.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CoreEvent {
    /// An entity changed state
    StateChanged {
        /// The normalized event
        event: crate::event::Event,
    },
    /// The dominant mood flipped
    MoodChanged {
        /// New dominant mood
        mood: String,
        /// Smoothed value at the new mood
        confidence: f64,
        /// When the tick ran
        timestamp: DateTime<Utc>,
    },
    /// The miner emitted a rule
    RuleDiscovered {
        /// The rule
        rule: Rule,
    },
    /// A suggestion was produced
    SuggestionCreated {
        /// The suggestion
        suggestion: Suggestion,
    },
    /// A candidate entered the store
    CandidateCreated {
        /// Candidate id
        candidate_id: String,
        /// Stable pattern id
        pattern_id: String,
    },
    /// A candidate was accepted
    CandidateAccepted {
        /// Candidate id
        candidate_id: String,
        /// Stable pattern id
        pattern_id: String,
    },
    /// A candidate was dismissed
    CandidateDismissed {
        /// Candidate id
        candidate_id: String,
        /// Stable pattern id
        pattern_id: String,
    },
    /// A person entered a zone
    ZoneEntered {
        /// Person entity id
        person_id: String,
        /// Zone node id
        zone_id: String,
    },
    /// A person left a zone
    ZoneLeft {
        /// Person entity id
        person_id: String,
        /// Zone node id
        zone_id: String,
    },
    /// Household presence changed
    PresenceChanged {
        /// People home
        total_home: u32,
    },
    /// A zone's Comfort/Joy/Frugality moved
    ZoneMoodUpdated {
        /// Zone node id
        zone_id: String,
        /// Environmental comfort, 0..1
        comfort: f64,
        /// Liveliness, 0..1
        joy: f64,
        /// Energy thrift, 0..1
        frugality: f64,
    },
}

impl CoreEvent {
    /// Lifecycle events must not be dropped; telemetry may be.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            CoreEvent::CandidateCreated { .. }
                | CoreEvent::CandidateAccepted { .. }
                | CoreEvent::CandidateDismissed { .. }
        )
    }

    /// Short tag for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            CoreEvent::StateChanged { .. } => "state_changed",
            CoreEvent::MoodChanged { .. } => "mood_changed",
            CoreEvent::RuleDiscovered { .. } => "rule_discovered",
            CoreEvent::SuggestionCreated { .. } => "suggestion_created",
            CoreEvent::CandidateCreated { .. } => "candidate_created",
            CoreEvent::CandidateAccepted { .. } => "candidate_accepted",
            CoreEvent::CandidateDismissed { .. } => "candidate_dismissed",
            CoreEvent::ZoneEntered { .. } => "zone_entered",
            CoreEvent::ZoneLeft { .. } => "zone_left",
            CoreEvent::PresenceChanged { .. } => "presence_changed",
            CoreEvent::ZoneMoodUpdated { .. } => "zone_mood_updated",
        }
    }
}

// ============================================================================
// SUBSCRIPTION
// ============================================================================

#[derive(Debug)]
struct SubscriberQueue {
    name: String,
    buf: Mutex<VecDeque<CoreEvent>>,
    capacity: usize,
    dropped: Mutex<u64>,
}

/// Receiving half of a subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    /// Pop the next queued event, if any. Non-blocking.
    pub fn try_recv(&self) -> Option<CoreEvent> {
        self.queue
            .buf
            .lock()
            .ok()
            .and_then(|mut buf| buf.pop_front())
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<CoreEvent> {
        match self.queue.buf.lock() {
            Ok(mut buf) => buf.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Events currently queued.
    pub fn len(&self) -> usize {
        self.queue.buf.lock().map(|buf| buf.len()).unwrap_or(0)
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Telemetry events dropped on overflow so far.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.lock().map(|d| *d).unwrap_or(0)
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// The in-process event bus.
pub struct Dispatcher {
    subscribers: Mutex<Vec<Arc<SubscriberQueue>>>,
    default_capacity: usize,
}

impl Dispatcher {
    /// Dispatcher with the given default queue capacity.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            default_capacity: default_capacity.max(1),
        }
    }

    /// Register a subscriber with the default queue capacity.
    pub fn subscribe(&self, name: impl Into<String>) -> Subscription {
        self.subscribe_with_capacity(name, self.default_capacity)
    }

    /// Register a subscriber with an explicit queue capacity.
    pub fn subscribe_with_capacity(&self, name: impl Into<String>, capacity: usize) -> Subscription {
        let queue = Arc::new(SubscriberQueue {
            name: name.into(),
            buf: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            dropped: Mutex::new(0),
        });
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(Arc::clone(&queue));
        }
        Subscription { queue }
    }

    /// Registered subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Publish one event to every subscriber.
    ///
    /// Synchronous fan-out in registration order. A subscriber whose
    /// queue is wedged cannot prevent delivery to the others: telemetry
    /// overflow drops that subscriber's oldest entry, and even a
    /// lifecycle publish gives up on one subscriber after a bounded wait
    /// rather than stalling the bus forever.
    pub fn publish(&self, event: CoreEvent) {
        let subscribers: Vec<Arc<SubscriberQueue>> = match self.subscribers.lock() {
            Ok(subs) => subs.clone(),
            Err(_) => return,
        };

        for queue in subscribers {
            if event.is_lifecycle() {
                Self::publish_blocking(&queue, event.clone());
            } else {
                Self::publish_drop_oldest(&queue, event.clone());
            }
        }
        debug!(event = event.tag(), "published");
    }

    fn publish_drop_oldest(queue: &SubscriberQueue, event: CoreEvent) {
        let overflowed = {
            let Ok(mut buf) = queue.buf.lock() else { return };
            let overflowed = buf.len() >= queue.capacity;
            if overflowed {
                buf.pop_front();
            }
            buf.push_back(event);
            overflowed
        };
        if overflowed {
            if let Ok(mut dropped) = queue.dropped.lock() {
                *dropped += 1;
            }
            warn!(subscriber = %queue.name, "telemetry queue overflow, dropped oldest");
        }
    }

    fn publish_blocking(queue: &SubscriberQueue, event: CoreEvent) {
        // Bounded patience: ~500ms, then the subscriber forfeits its
        // oldest entry so the rest of the bus keeps moving.
        for _ in 0..100 {
            {
                let Ok(mut buf) = queue.buf.lock() else { return };
                if buf.len() < queue.capacity {
                    buf.push_back(event);
                    return;
                }
            }
            std::thread::sleep(BLOCK_POLL);
        }
        warn!(
            subscriber = %queue.name,
            "lifecycle publish timed out, evicting oldest entry"
        );
        let Ok(mut buf) = queue.buf.lock() else { return };
        buf.pop_front();
        buf.push_back(event);
    }
}

// ============================================================================
// TESTS
// ============================================================================
