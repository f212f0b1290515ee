//! Event ingress
//!
//! Validates already-normalized events before they reach the graph,
//! neurons, and miner: entity id must be present, and timestamps may not
//! run backwards beyond a five-minute tolerance. Exact duplicate
//! deliveries (same key, same timestamp) are absorbed silently through a
//! bounded LRU guard, since upstream buses deliver at-least-once.

use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::debug;

use crate::error::{CoreError, ErrorKind};

use super::{Event, ReplayRing};

/// Ingress error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Event arrived without an entity id
    #[error("invalid event: missing entity_id")]
    MissingEntityId,
    /// Timestamp ran backwards beyond tolerance
    #[error("invalid event: ts {ts_ms} precedes watermark {watermark_ms} beyond tolerance")]
    NonMonotonic {
        /// Offending timestamp
        ts_ms: i64,
        /// Highest accepted timestamp so far
        watermark_ms: i64,
    },
    /// Timestamp is not a valid epoch-milliseconds value
    #[error("invalid event: bad timestamp {0}")]
    BadTimestamp(i64),
}

impl CoreError for EventError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidInput
    }
}

/// What happened to an accepted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressOutcome {
    /// Event accepted and buffered for replay
    Accepted,
    /// Exact duplicate of an already-accepted event, dropped
    Duplicate,
}

/// Validating front door for normalized events.
pub struct EventIngress {
    ring: ReplayRing,
    seen: LruCache<String, i64>,
    watermark_ms: Option<i64>,
    tolerance_ms: i64,
    accepted: u64,
    rejected: u64,
}

impl EventIngress {
    /// Create an ingress with the given replay capacity, duplicate-guard
    /// size, and backwards-timestamp tolerance.
    pub fn new(replay_capacity: usize, guard_keys: usize, tolerance_ms: i64) -> Self {
        let guard = NonZeroUsize::new(guard_keys.max(1)).expect("max(1) is non-zero");
        Self {
            ring: ReplayRing::new(replay_capacity),
            seen: LruCache::new(guard),
            watermark_ms: None,
            tolerance_ms,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Validate and buffer one event.
    pub fn ingest(&mut self, event: Event) -> Result<IngressOutcome, EventError> {
        if event.entity_id.is_empty() {
            self.rejected += 1;
            return Err(EventError::MissingEntityId);
        }
        if event.ts_ms <= 0 {
            self.rejected += 1;
            return Err(EventError::BadTimestamp(event.ts_ms));
        }
        if let Some(watermark) = self.watermark_ms {
            if event.ts_ms < watermark - self.tolerance_ms {
                self.rejected += 1;
                return Err(EventError::NonMonotonic {
                    ts_ms: event.ts_ms,
                    watermark_ms: watermark,
                });
            }
        }

        let key = event.key();
        if self.seen.put(key.clone(), event.ts_ms) == Some(event.ts_ms) {
            debug!(key = %key, ts_ms = event.ts_ms, "dropping duplicate delivery");
            return Ok(IngressOutcome::Duplicate);
        }

        self.watermark_ms = Some(self.watermark_ms.map_or(event.ts_ms, |w| w.max(event.ts_ms)));
        self.ring.push(event);
        self.accepted += 1;
        Ok(IngressOutcome::Accepted)
    }

    /// Snapshot the replay buffer for a mining run.
    pub fn replay(&self) -> Vec<Event> {
        self.ring.snapshot()
    }

    /// Events currently held in the replay buffer.
    pub fn buffered(&self) -> usize {
        self.ring.len()
    }

    /// Accepted / rejected counters since construction.
    pub fn counters(&self) -> (u64, u64) {
        (self.accepted, self.rejected)
    }

    /// Highest accepted timestamp, if any event was accepted.
    pub fn watermark_ms(&self) -> Option<i64> {
        self.watermark_ms
    }
}
