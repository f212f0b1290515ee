//! Data models for the habitus miner

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

// ============================================================================
// CONFIG
// ============================================================================

/// Configuration for the mining process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Time windows to try, in seconds
    pub windows_sec: Vec<u32>,

    /// Minimum A occurrences for a key to become an antecedent candidate
    pub min_support_a: usize,
    /// Minimum B occurrences for a key to become a consequent candidate
    pub min_support_b: usize,
    /// Minimum A→B hits for a rule to survive
    pub min_hits: u64,

    /// Quality filters
    pub min_confidence: f64,
    /// Wilson lower bound threshold
    pub min_confidence_lb: f64,
    /// Lift threshold
    pub min_lift: f64,
    /// Leverage threshold
    pub min_leverage: f64,

    /// Output limits
    pub max_rules: usize,
    /// Evidence examples kept per rule
    pub max_evidence_examples: usize,

    /// Per-entity debounce overrides, in seconds
    pub entity_cooldown_sec: HashMap<String, u32>,
    /// Default per-entity debounce against state flapping, in seconds
    pub cooldown_sec: u32,
    /// Session gap: a larger silence starts a new session, in seconds
    pub debounce_sec: u32,

    /// Context features for stratified mining, e.g. `time_of_day`
    pub context_features: Vec<String>,

    /// Domain/entity filters; `None` means no restriction
    pub include_domains: Option<Vec<String>>,
    /// Domains dropped from the stream
    pub exclude_domains: Option<Vec<String>>,
    /// Entities the stream is restricted to
    pub include_entities: Option<Vec<String>>,
    /// Entities dropped from the stream
    pub exclude_entities: Option<Vec<String>>,

    /// Exclude rules where A == B
    pub exclude_self_rules: bool,
    /// Exclude rules where both keys share an entity
    pub exclude_same_entity: bool,
    /// Replace entity ids with per-domain buckets during normalization
    pub anonymize_entity_ids: bool,

    /// Minimum interval between full runs, in seconds
    pub throttle_sec: u64,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            windows_sec: vec![30, 120, 600, 3600],
            min_support_a: 20,
            min_support_b: 20,
            min_hits: 10,
            min_confidence: 0.5,
            min_confidence_lb: 0.3,
            min_lift: 1.2,
            min_leverage: 0.05,
            max_rules: 200,
            max_evidence_examples: 5,
            entity_cooldown_sec: HashMap::new(),
            cooldown_sec: 2,
            debounce_sec: 120,
            context_features: Vec::new(),
            include_domains: None,
            exclude_domains: None,
            include_entities: None,
            exclude_entities: None,
            exclude_self_rules: true,
            exclude_same_entity: false,
            anonymize_entity_ids: false,
            throttle_sec: 1800,
        }
    }
}

impl MiningConfig {
    /// Debounce cooldown for an entity, in milliseconds.
    pub fn cooldown_ms(&self, entity_id: &str) -> i64 {
        let sec = self
            .entity_cooldown_sec
            .get(entity_id)
            .copied()
            .unwrap_or(self.cooldown_sec);
        i64::from(sec) * 1000
    }

    /// Session gap in milliseconds.
    pub fn session_gap_ms(&self) -> i64 {
        i64::from(self.debounce_sec) * 1000
    }
}

// ============================================================================
// EVIDENCE
// ============================================================================

/// Evidence and explainability data for a rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleEvidence {
    /// `(tA, tB, latency_ms)` for recorded hits
    pub hits: Vec<(i64, i64, i64)>,
    /// `tA` timestamps where A occurred but no B followed
    pub misses: Vec<i64>,
    /// `[p25, p50, p75, p90, p99]` hit latencies in seconds
    pub latency_quantiles: Vec<f64>,
    /// Unknown fields from older/newer writers, preserved on rewrite
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// RULE
// ============================================================================

/// A discovered A→B rule with quality metrics and explainability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Antecedent event key
    #[serde(rename = "A")]
    pub a: String,
    /// Consequent event key
    #[serde(rename = "B")]
    pub b: String,
    /// Time window in seconds
    pub dt_sec: u32,

    /// Total A events (trials)
    #[serde(rename = "nA")]
    pub n_a: u64,
    /// Total B events (for the baseline)
    #[serde(rename = "nB")]
    pub n_b: u64,
    /// A events followed by B within the window (hits)
    #[serde(rename = "nAB")]
    pub n_ab: u64,

    /// P(B|A) = nAB / nA
    pub confidence: f64,
    /// Wilson 95% lower bound on the confidence
    pub confidence_lb: f64,
    /// confidence / baseline P(B)
    pub lift: f64,
    /// confidence − baseline P(B)
    pub leverage: f64,
    /// (1 − P(B)) / (1 − confidence), when both are below 1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conviction: Option<f64>,

    /// Baseline probability of B in a random window
    pub baseline_p_b: f64,
    /// Days spanned by the observed stream
    pub observation_period_days: u32,
    /// When the rule was produced
    pub created_at_ms: i64,

    /// Explainability payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<RuleEvidence>,

    /// Zone scope, when mined for one zone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Context bucket, when mined under stratification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Unknown fields from older/newer writers, preserved on rewrite
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Rule {
    /// Combined ranking score.
    ///
    /// `0.5·confidence_lb + 0.3·ln(max(1.01, lift)) + 0.2·ln(1 + nAB)` —
    /// stable confidence dominates, lift and evidence count contribute
    /// with diminishing returns.
    pub fn score(&self) -> f64 {
        let conf_score = self.confidence_lb;
        let lift_score = self.lift.max(1.01).ln();
        let evidence_score = (1.0 + self.n_ab as f64).ln();
        0.5 * conf_score + 0.3 * lift_score + 0.2 * evidence_score
    }

    /// Stable identifier of the rule shape `A→B@Δt` plus optional
    /// zone/context scope.
    pub fn pattern_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.a.as_bytes());
        hasher.update(b"|");
        hasher.update(self.b.as_bytes());
        hasher.update(b"|");
        hasher.update(self.dt_sec.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(self.zone.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"|");
        hasher.update(self.context.as_deref().unwrap_or("").as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        format!("p:{}", &hex[..16])
    }

    /// Antecedent entity id (the part of the key before the transition).
    pub fn a_entity(&self) -> &str {
        crate::event::split_key(&self.a).0
    }

    /// Consequent entity id.
    pub fn b_entity(&self) -> &str {
        crate::event::split_key(&self.b).0
    }
}
