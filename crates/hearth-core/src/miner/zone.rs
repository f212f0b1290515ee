//! Zone-scoped A→B rule mining
//!
//! Restricts mining to entities that belong to one zone (membership read
//! from the graph's `in_zone` edges by the caller) and layers zone
//! governance on top: per-zone confidence/lift thresholds, and a
//! safety-critical entity set whose rules are shunted to a separate
//! blocked list instead of ever becoming suggestions.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::event::Event;

use super::Result;
use super::mining::mine_rules;
use super::model::{MiningConfig, Rule};

// ============================================================================
// GOVERNANCE
// ============================================================================

/// Per-zone mining governance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneGovernance {
    /// Minimum events in the zone for a run to proceed
    pub min_events: usize,
    /// Zone-level confidence floor, applied after base mining
    pub confidence_threshold: f64,
    /// Zone-level lift floor
    pub lift_threshold: f64,
    /// Whether adopted rules need explicit user confirmation
    pub requires_confirmation: bool,
    /// Entities whose rules are blocked rather than suggested
    pub safety_critical_entities: HashSet<String>,
}

impl Default for ZoneGovernance {
    fn default() -> Self {
        Self {
            min_events: 10,
            confidence_threshold: 0.7,
            lift_threshold: 1.5,
            requires_confirmation: true,
            safety_critical_entities: HashSet::new(),
        }
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// A governance-passing rule exported for suggestion surfaces, tagged
/// with whether its zone requires explicit confirmation before adoption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopSuggestion {
    /// The zone-scoped rule
    pub rule: Rule,
    /// Whether the zone's governance demands user confirmation
    pub requires_confirmation: bool,
}

/// A rule withheld by safety governance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyBlocked {
    /// Human-readable rule description
    pub rule: String,
    /// Confidence of the blocked rule
    pub confidence: f64,
    /// Lift of the blocked rule
    pub lift: f64,
    /// Safety-critical entities involved
    pub entities: Vec<String>,
}

/// Counters for one zone run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneMiningStats {
    /// Events that belonged to the zone
    pub events: usize,
    /// Rules out of the base miner
    pub raw_rules: usize,
    /// Rules surviving governance
    pub filtered_rules: usize,
    /// Rules withheld by the safety set
    pub safety_blocked: usize,
    /// Run skipped, with the reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

/// Result of mining one zone.
#[derive(Debug, Clone, Default)]
pub struct ZoneMiningResult {
    /// Zone node id
    pub zone_id: String,
    /// All rules out of the base miner
    pub rules: Vec<Rule>,
    /// Rules that passed zone governance
    pub filtered_rules: Vec<Rule>,
    /// Rules withheld by the safety-critical set
    pub safety_blocked: Vec<SafetyBlocked>,
    /// Run counters
    pub stats: ZoneMiningStats,
}

// ============================================================================
// MINER
// ============================================================================

/// Zone-aware pattern miner.
pub struct ZoneMiner {
    base_config: MiningConfig,
    zone_configs: HashMap<String, ZoneGovernance>,
}

impl ZoneMiner {
    /// Create a zone miner over the base mining configuration.
    pub fn new(base_config: MiningConfig) -> Self {
        Self {
            base_config,
            zone_configs: HashMap::new(),
        }
    }

    /// Install governance for a zone.
    pub fn set_zone_governance(&mut self, zone_id: impl Into<String>, governance: ZoneGovernance) {
        self.zone_configs.insert(zone_id.into(), governance);
    }

    /// Governance for a zone, defaults when none was installed.
    pub fn zone_governance(&self, zone_id: &str) -> ZoneGovernance {
        self.zone_configs.get(zone_id).cloned().unwrap_or_default()
    }

    /// Mine rules for one zone.
    ///
    /// `zone_entities` is the zone membership resolved from `in_zone`
    /// edges. An unknown zone arrives as an empty set and yields zero
    /// rules.
    pub fn mine_zone(
        &self,
        events: &[Event],
        zone_id: &str,
        zone_entities: &HashSet<String>,
        now_ms: i64,
        cancel: &CancelToken,
    ) -> Result<ZoneMiningResult> {
        let governance = self.zone_governance(zone_id);
        let mut result = ZoneMiningResult {
            zone_id: zone_id.to_string(),
            ..Default::default()
        };

        if zone_entities.is_empty() {
            result.stats.skipped = Some("no_zone_members".to_string());
            return Ok(result);
        }

        let zone_events: Vec<Event> = events
            .iter()
            .filter(|e| zone_entities.contains(&e.entity_id))
            .cloned()
            .collect();
        result.stats.events = zone_events.len();

        if zone_events.len() < governance.min_events {
            debug!(
                zone = zone_id,
                events = zone_events.len(),
                min = governance.min_events,
                "zone below event minimum, skipping"
            );
            result.stats.skipped = Some("insufficient_events".to_string());
            return Ok(result);
        }

        let outcome = mine_rules(&zone_events, &self.base_config, now_ms, cancel)?;
        result.rules = outcome.rules;
        result.stats.raw_rules = result.rules.len();

        for rule in &result.rules {
            if rule.confidence < governance.confidence_threshold
                || rule.lift < governance.lift_threshold
            {
                continue;
            }

            let a_entity = rule.a_entity();
            let b_entity = rule.b_entity();
            let critical: Vec<String> = [a_entity, b_entity]
                .iter()
                .filter(|e| governance.safety_critical_entities.contains(**e))
                .map(|e| e.to_string())
                .collect();

            if !critical.is_empty() {
                result.safety_blocked.push(SafetyBlocked {
                    rule: format!("{} → {}", rule.a, rule.b),
                    confidence: rule.confidence,
                    lift: rule.lift,
                    entities: critical,
                });
                continue;
            }

            let mut kept = rule.clone();
            kept.zone = Some(zone_id.to_string());
            result.filtered_rules.push(kept);
        }

        result.stats.filtered_rules = result.filtered_rules.len();
        result.stats.safety_blocked = result.safety_blocked.len();

        info!(
            zone = zone_id,
            raw = result.stats.raw_rules,
            filtered = result.stats.filtered_rules,
            blocked = result.stats.safety_blocked,
            "zone mining complete"
        );
        Ok(result)
    }

    /// Mine every zone in `memberships` (zone id → entity set).
    pub fn mine_all_zones(
        &self,
        events: &[Event],
        memberships: &HashMap<String, HashSet<String>>,
        now_ms: i64,
        cancel: &CancelToken,
    ) -> Result<HashMap<String, ZoneMiningResult>> {
        let mut results = HashMap::new();
        for (zone_id, entities) in memberships {
            results.insert(
                zone_id.clone(),
                self.mine_zone(events, zone_id, entities, now_ms, cancel)?,
            );
        }
        Ok(results)
    }

    /// Top governance-passing rules across zones, best score first, each
    /// tagged with its zone's confirmation requirement.
    pub fn top_suggestions(
        &self,
        results: &HashMap<String, ZoneMiningResult>,
        limit: usize,
    ) -> Vec<TopSuggestion> {
        let mut suggestions: Vec<TopSuggestion> = results
            .iter()
            .flat_map(|(zone_id, result)| {
                let requires_confirmation = self.zone_governance(zone_id).requires_confirmation;
                result.filtered_rules.iter().map(move |rule| TopSuggestion {
                    rule: rule.clone(),
                    requires_confirmation,
                })
            })
            .collect();
        suggestions.sort_by(|x, y| {
            y.rule
                .score()
                .partial_cmp(&x.rule.score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        suggestions.truncate(limit);
        suggestions
    }
}
