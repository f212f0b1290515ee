//! Habitus miner service
//!
//! Orchestrates mining runs: throttling, the context-stratified pass,
//! rule persistence, and the read side (filtered rule queries, rule
//! explanations, summary export). A failed run never overwrites the
//! previous rule set.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::event::{Event, split_key};

use super::mining::{MiningStats, mine_with_context};
use super::model::{MiningConfig, Rule};
use super::store::MinerFileStore;
use super::{MinerError, Result};

// ============================================================================
// REPORTS
// ============================================================================

/// Outcome status of a requested run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiningStatus {
    /// The run executed
    Completed,
    /// The run was inside the throttle window and did nothing
    Skipped,
}

/// Report of one requested run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningReport {
    /// Whether the run executed or was skipped
    pub status: MiningStatus,
    /// Rules now persisted
    pub rules: usize,
    /// Pass counters when the run executed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<MiningStats>,
    /// Seconds until the next run is allowed, when skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_sec: Option<u64>,
}

/// Query filter for persisted rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesFilter {
    /// Maximum rules returned
    pub limit: Option<usize>,
    /// Minimum combined score
    pub min_score: Option<f64>,
    /// Substring match on the antecedent key
    pub a_contains: Option<String>,
    /// Substring match on the consequent key
    pub b_contains: Option<String>,
    /// Domain match on either side
    pub domain: Option<String>,
}

/// Human-readable explanation of one rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleExplanation {
    /// One-line rule summary
    pub summary: String,
    /// Confidence as a percentage string
    pub confidence_pct: String,
    /// "In n of m cases" phrasing
    pub confidence_detail: String,
    /// Wilson lower bound phrasing
    pub stability: String,
    /// Lift phrasing
    pub lift: String,
    /// Median and range of the hit latency, when recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<RuleTiming>,
    /// Up to three example hits
    pub examples: Vec<RuleExample>,
}

/// Latency block of an explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTiming {
    /// Median latency in seconds
    pub typical_delay_sec: f64,
    /// `[fastest, slowest]` of the recorded quantiles, in seconds
    pub delay_range_sec: (f64, f64),
}

/// One recorded hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleExample {
    /// When A fired
    pub t_a_ms: i64,
    /// How long B took to follow, in seconds
    pub latency_sec: f64,
}

/// Aggregated export of the current rule set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesSummary {
    /// Total persisted rules
    pub total_rules: usize,
    /// Mean confidence across rules
    pub avg_confidence: f64,
    /// Mean lift across rules
    pub avg_lift: f64,
    /// Top rules by score
    pub top_rules: Vec<Rule>,
    /// `"<a_domain> → <b_domain>"` aggregation
    pub domain_patterns: std::collections::BTreeMap<String, DomainPattern>,
    /// Last successful run, if any
    pub last_run_ms: Option<i64>,
    /// Events processed by the last run
    pub total_events_processed: u64,
}

/// Per domain-pair aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainPattern {
    /// Rules in this domain pair
    pub count: usize,
    /// Mean confidence
    pub avg_confidence: f64,
    /// Up to five example rule keys
    pub examples: Vec<String>,
}

// ============================================================================
// SERVICE
// ============================================================================

/// Main service for discovering behavioral patterns in household events.
pub struct HabitusMiner {
    config: MiningConfig,
    store: MinerFileStore,
}

impl HabitusMiner {
    /// Open the miner with its persistence directory.
    pub fn open(dir: &Path, config: MiningConfig) -> Result<Self> {
        Ok(Self {
            config,
            store: MinerFileStore::open(dir)?,
        })
    }

    /// The active mining configuration.
    pub fn config(&self) -> &MiningConfig {
        &self.config
    }

    /// Mutable access for runtime reconfiguration.
    pub fn config_mut(&mut self) -> &mut MiningConfig {
        &mut self.config
    }

    /// Seconds left in the throttle window, `None` when a run is allowed.
    pub fn throttle_remaining(&self, now_ms: i64) -> Option<u64> {
        let last = self.store.state().last_run_ms?;
        let elapsed_sec = (now_ms - last).max(0) as u64 / 1000;
        if elapsed_sec < self.config.throttle_sec {
            Some(self.config.throttle_sec - elapsed_sec)
        } else {
            None
        }
    }

    /// Run a full mining pass over `events`.
    ///
    /// Runs inside the throttle window return `Skipped` without touching
    /// the persisted rules; `force` overrides the throttle. On failure
    /// the previous rules stay in place.
    pub fn mine(
        &mut self,
        events: &[Event],
        now_ms: i64,
        force: bool,
        cancel: &CancelToken,
    ) -> Result<MiningReport> {
        if !force {
            if let Some(retry_in_sec) = self.throttle_remaining(now_ms) {
                info!(retry_in_sec, "mining skipped: inside throttle window");
                return Ok(MiningReport {
                    status: MiningStatus::Skipped,
                    rules: self.store.rules().len(),
                    stats: None,
                    retry_in_sec: Some(retry_in_sec),
                });
            }
        }

        let outcome = mine_with_context(events, &self.config, now_ms, cancel)?;

        if let Err(e) = self.store.cache_events(events) {
            // Replay cache is best-effort; the rules themselves matter
            warn!(error = %e, "failed to cache events");
        }
        self.store.save_rules(outcome.rules, now_ms)?;
        self.store.mark_run(now_ms)?;

        Ok(MiningReport {
            status: MiningStatus::Completed,
            rules: self.store.rules().len(),
            stats: Some(outcome.stats),
            retry_in_sec: None,
        })
    }

    /// Record a completed run that happened outside [`Self::mine`]
    /// (zone-scoped runs share the same throttle window).
    pub fn mark_run(&mut self, now_ms: i64) -> Result<()> {
        self.store.mark_run(now_ms)
    }

    /// Like [`Self::mine`] but an in-window call is a hard error.
    pub fn mine_strict(
        &mut self,
        events: &[Event],
        now_ms: i64,
        cancel: &CancelToken,
    ) -> Result<MiningReport> {
        if let Some(retry_in_sec) = self.throttle_remaining(now_ms) {
            return Err(MinerError::Throttled { retry_in_sec });
        }
        self.mine(events, now_ms, true, cancel)
    }

    /// Persisted rules with optional filtering, best score first.
    pub fn rules(&self, filter: &RulesFilter) -> Vec<Rule> {
        let mut rules = self.store.rules();

        if let Some(min_score) = filter.min_score {
            rules.retain(|r| r.score() >= min_score);
        }
        if let Some(a) = &filter.a_contains {
            let needle = a.to_lowercase();
            rules.retain(|r| r.a.to_lowercase().contains(&needle));
        }
        if let Some(b) = &filter.b_contains {
            let needle = b.to_lowercase();
            rules.retain(|r| r.b.to_lowercase().contains(&needle));
        }
        if let Some(domain) = &filter.domain {
            rules.retain(|r| {
                let a_domain = crate::event::domain_of(split_key(&r.a).0);
                let b_domain = crate::event::domain_of(split_key(&r.b).0);
                a_domain == domain || b_domain == domain
            });
        }
        if let Some(limit) = filter.limit {
            rules.truncate(limit);
        }
        rules
    }

    /// Cached events from the last run.
    pub fn cached_events(&self) -> Result<Vec<Event>> {
        self.store.load_cached_events()
    }

    /// Persist events into the replay cache without mining, so a later
    /// process can mine what this one observed.
    pub fn cache_events(&mut self, events: &[Event]) -> Result<()> {
        self.store.cache_events(events)
    }

    /// Persistent miner state.
    pub fn state(&self) -> &super::store::MinerState {
        self.store.state()
    }

    /// Build a human-readable explanation for a rule.
    pub fn explain(rule: &Rule) -> RuleExplanation {
        let (a_entity, a_transition) = split_key(&rule.a);
        let (b_entity, b_transition) = split_key(&rule.b);

        let timing = rule.evidence.as_ref().and_then(|ev| {
            let q = &ev.latency_quantiles;
            if q.len() >= 3 {
                Some(RuleTiming {
                    typical_delay_sec: q[1],
                    delay_range_sec: (q[0], q[q.len() - 1]),
                })
            } else {
                None
            }
        });

        let examples = rule
            .evidence
            .as_ref()
            .map(|ev| {
                ev.hits
                    .iter()
                    .take(3)
                    .map(|(t_a, _, latency_ms)| RuleExample {
                        t_a_ms: *t_a,
                        latency_sec: *latency_ms as f64 / 1000.0,
                    })
                    .collect()
            })
            .unwrap_or_default();

        RuleExplanation {
            summary: format!(
                "When {a_entity} → {a_transition}, then {b_entity} → {b_transition} (within {}s)",
                rule.dt_sec
            ),
            confidence_pct: format!("{:.1}%", rule.confidence * 100.0),
            confidence_detail: format!("In {} out of {} cases", rule.n_ab, rule.n_a),
            stability: format!("Lower bound: {:.1}%", rule.confidence_lb * 100.0),
            lift: if rule.lift > 1.0 {
                format!("{:.2}× more likely than baseline", rule.lift)
            } else {
                format!("{:.2}× baseline", rule.lift)
            },
            timing,
            examples,
        }
    }

    /// Aggregate the current rule set for UI/API consumption.
    pub fn summary(&self) -> RulesSummary {
        let rules = self.store.rules();
        let total = rules.len();

        let mut domain_patterns: std::collections::BTreeMap<String, DomainPattern> =
            Default::default();
        for rule in &rules {
            let a_domain = crate::event::domain_of(split_key(&rule.a).0);
            let b_domain = crate::event::domain_of(split_key(&rule.b).0);
            let key = format!("{a_domain} → {b_domain}");
            let entry = domain_patterns.entry(key).or_default();
            entry.count += 1;
            entry.avg_confidence += rule.confidence;
            if entry.examples.len() < 5 {
                entry.examples.push(format!("{} → {}", rule.a, rule.b));
            }
        }
        for pattern in domain_patterns.values_mut() {
            pattern.avg_confidence /= pattern.count.max(1) as f64;
        }

        RulesSummary {
            total_rules: total,
            avg_confidence: if total > 0 {
                rules.iter().map(|r| r.confidence).sum::<f64>() / total as f64
            } else {
                0.0
            },
            avg_lift: if total > 0 {
                rules.iter().map(|r| r.lift).sum::<f64>() / total as f64
            } else {
                0.0
            },
            top_rules: rules.into_iter().take(10).collect(),
            domain_patterns,
            last_run_ms: self.store.state().last_run_ms,
            total_events_processed: self.store.state().total_events_processed,
        }
    }

    /// Drop all persisted miner data.
    pub fn reset(&mut self) -> Result<()> {
        self.store.clear()
    }
}

// ============================================================================
// TESTS
// ============================================================================
