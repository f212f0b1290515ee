//! Event Model
//!
//! A normalized state-change is the single unit of input to the core.
//! Events are produced once, never updated, and consumed by the neuron
//! manager and the habitus miner. The **key** of an event is the string
//! `"<entity_id>:<transition>"` (e.g. `light.kitchen:on`).

mod ingress;
mod normalize;
mod ring;

pub use ingress::{EventError, EventIngress, IngressOutcome};
pub use normalize::{RawStateChange, normalize_state_change};
pub use ring::ReplayRing;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// String key identifying an event shape: `entity_id:transition`.
pub type EventKey = String;

/// A normalized state-change event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Timestamp in milliseconds since the Unix epoch
    pub ts_ms: i64,
    /// Home-automation entity id, e.g. `light.kitchen`
    pub entity_id: String,
    /// Domain derived from the entity id prefix, e.g. `light`
    pub domain: String,
    /// The transition the entity made, e.g. `on`
    pub transition: String,
    /// Optional privacy-filtered context (time buckets, source)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, String>>,
}

impl Event {
    /// Create an event, deriving `domain` from the entity id prefix.
    pub fn new(ts_ms: i64, entity_id: impl Into<String>, transition: impl Into<String>) -> Self {
        let entity_id = entity_id.into();
        let domain = domain_of(&entity_id).to_string();
        Self {
            ts_ms,
            entity_id,
            domain,
            transition: transition.into(),
            context: None,
        }
    }

    /// Attach a context map.
    pub fn with_context(mut self, context: BTreeMap<String, String>) -> Self {
        self.context = Some(context);
        self
    }

    /// The event key `entity_id:transition`.
    pub fn key(&self) -> EventKey {
        format!("{}:{}", self.entity_id, self.transition)
    }
}

/// Extract the domain prefix of an entity id (`light.kitchen` → `light`).
pub fn domain_of(entity_id: &str) -> &str {
    entity_id.split_once('.').map(|(d, _)| d).unwrap_or("")
}

/// Split an event key back into `(entity_id, transition)`.
///
/// Keys without a separator come back with an empty transition.
pub fn split_key(key: &str) -> (&str, &str) {
    key.rsplit_once(':').unwrap_or((key, ""))
}
