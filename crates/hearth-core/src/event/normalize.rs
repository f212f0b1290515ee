//! Raw state-change normalization
//!
//! Converts transport-level state-change payloads into [`Event`]s. Only
//! genuine transitions survive: unchanged states, empty states, and
//! unavailable/unknown markers are dropped. The derived context carries
//! coarse time buckets only, never raw attribute payloads.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::{Event, domain_of};

/// States that never form a transition.
const DEAD_STATES: [&str; 3] = ["unavailable", "unknown", ""];

/// A raw state-change as delivered by a transport collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStateChange {
    /// Entity that changed
    pub entity_id: String,
    /// Previous state, when known
    #[serde(default)]
    pub old_state: Option<String>,
    /// New state
    #[serde(default)]
    pub new_state: Option<String>,
    /// When the change fired; ingestion time is used when absent
    #[serde(default)]
    pub fired_at: Option<DateTime<Utc>>,
    /// Transport context; only the `source` key is carried over
    #[serde(default)]
    pub context: Option<BTreeMap<String, String>>,
}

/// Normalize a raw state-change into an [`Event`].
///
/// Returns `None` for non-transitions (old == new), dead states, and
/// payloads without an entity id. `now` supplies the timestamp when the
/// payload carries none. The `hour`/`weekday`/`time_of_day` context tags
/// are bucketed in household local time via `utc_offset_hours` - the
/// same offset the time-of-day neuron applies - so context-stratified
/// mining and the pipeline agree on what "evening" means. With
/// `anonymize` set, the entity id is replaced by a stable per-domain
/// bucket (`light.421`).
pub fn normalize_state_change(
    raw: &RawStateChange,
    now: DateTime<Utc>,
    utc_offset_hours: f64,
    anonymize: bool,
) -> Option<Event> {
    if raw.entity_id.is_empty() {
        return None;
    }

    let new_state = raw.new_state.as_deref()?;
    if DEAD_STATES.contains(&new_state) {
        return None;
    }
    if raw.old_state.as_deref() == Some(new_state) {
        return None;
    }

    let fired_at = raw.fired_at.unwrap_or(now);
    let ts_ms = fired_at.timestamp_millis();
    let local = fired_at + chrono::Duration::milliseconds((utc_offset_hours * 3_600_000.0) as i64);

    let domain = domain_of(&raw.entity_id).to_string();
    let entity_id = if anonymize {
        anonymize_entity(&raw.entity_id, &domain)
    } else {
        raw.entity_id.clone()
    };

    let mut context = BTreeMap::new();
    if let Some(source) = raw.context.as_ref().and_then(|c| c.get("source")) {
        context.insert("source".to_string(), source.clone());
    }
    context.insert("hour".to_string(), local.hour().to_string());
    context.insert(
        "weekday".to_string(),
        local.weekday().num_days_from_monday().to_string(),
    );
    context.insert(
        "time_of_day".to_string(),
        time_of_day_bucket(local.hour()).to_string(),
    );

    Some(Event {
        ts_ms,
        entity_id,
        domain,
        transition: new_state.to_string(),
        context: Some(context),
    })
}

/// Coarse time-of-day bucket used for context stratification.
pub fn time_of_day_bucket(hour: u32) -> &'static str {
    match hour {
        6..=11 => "morning",
        12..=17 => "day",
        18..=22 => "evening",
        _ => "night",
    }
}

/// Replace an entity id with a stable per-domain bucket label.
fn anonymize_entity(entity_id: &str, domain: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    entity_id.hash(&mut hasher);
    format!("{}.{}", domain, hasher.finish() % 1000)
}
