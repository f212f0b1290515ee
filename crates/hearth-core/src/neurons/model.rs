//! Neuron model types
//!
//! Neurons are small stateless evaluators behind one narrow trait; the
//! manager owns their runtime values and history. Values live in [0, 1]
//! always - `clamp01` is applied at the layer boundary.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Capacity of the per-neuron value history ring.
pub const NEURON_HISTORY_CAP: usize = 16;

/// Clamp a value into [0, 1]; NaN collapses to 0.
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Neuron error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum NeuronError {
    /// A required input entity or value is missing
    #[error("missing input: {0}")]
    MissingInput(String),
    /// An entity state could not be interpreted
    #[error("bad state for {entity}: {state}")]
    BadState {
        /// The offending entity
        entity: String,
        /// Its uninterpretable state
        state: String,
    },
}

/// The three neuron layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeuronKind {
    /// Reads raw entity state
    Context,
    /// Derives indices from context values
    State,
    /// Aggregates context and state into a mood activation
    Mood,
}

impl NeuronKind {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            NeuronKind::Context => "context",
            NeuronKind::State => "state",
            NeuronKind::Mood => "mood",
        }
    }

    /// The neutral value substituted when a neuron of this layer fails.
    pub fn neutral_value(&self) -> f64 {
        match self {
            NeuronKind::Context | NeuronKind::State => 0.5,
            NeuronKind::Mood => 0.0,
        }
    }
}

impl std::fmt::Display for NeuronKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// ENTITY STATE
// ============================================================================

/// A snapshot of one entity's state as seen by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// The state string, e.g. `on`, `home`, `21.5`
    pub state: String,
    /// Selected attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl EntityState {
    /// Build from a bare state string.
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Numeric interpretation of the state, when possible.
    pub fn numeric(&self) -> Option<f64> {
        self.state.trim().parse::<f64>().ok()
    }

    /// Whether the state equals `expected`.
    pub fn is(&self, expected: &str) -> bool {
        self.state == expected
    }
}

// ============================================================================
// EVALUATION CONTEXT
// ============================================================================

/// Everything a neuron may read during one tick.
///
/// `context_values` is frozen before the state layer runs and
/// `state_values` before the mood layer runs, so each layer sees only the
/// outputs of the layers before it.
#[derive(Debug, Clone)]
pub struct EvalContext {
    /// Current entity states
    pub states: HashMap<String, EntityState>,
    /// Frozen context-layer outputs
    pub context_values: HashMap<String, f64>,
    /// Frozen state-layer outputs
    pub state_values: HashMap<String, f64>,
    /// Tick time
    pub now: DateTime<Utc>,
    /// Sun elevation in degrees, when a collaborator supplies it
    pub sun_elevation: Option<f64>,
    /// Presence score per zone
    pub presence_zones: HashMap<String, f64>,
    /// Local-time offset from UTC, in hours
    pub utc_offset_hours: f64,
}

impl EvalContext {
    /// Fresh context for a tick at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            states: HashMap::new(),
            context_values: HashMap::new(),
            state_values: HashMap::new(),
            now,
            sun_elevation: None,
            presence_zones: HashMap::new(),
            utc_offset_hours: 0.0,
        }
    }

    /// Entity state lookup.
    pub fn state_of(&self, entity_id: &str) -> Option<&EntityState> {
        self.states.get(entity_id)
    }

    /// Entity ids with the given domain prefix.
    pub fn entities_in_domain(&self, domain: &str) -> Vec<&str> {
        let prefix = format!("{domain}.");
        self.states
            .keys()
            .filter(|id| id.starts_with(&prefix))
            .map(String::as_str)
            .collect()
    }

    /// Resolve a feature reference for fan-in weights.
    ///
    /// Accepts `context.<name>`, `state.<name>`, a bare name searched in
    /// both layers, and derived time-band features `time.night`,
    /// `time.morning`, `time.day`, `time.evening` computed from the
    /// `time_of_day` context value.
    pub fn feature(&self, key: &str) -> Option<f64> {
        if let Some(name) = key.strip_prefix("context.") {
            return self.context_values.get(name).copied();
        }
        if let Some(name) = key.strip_prefix("state.") {
            return self.state_values.get(name).copied();
        }
        if let Some(band) = key.strip_prefix("time.") {
            let t = self.context_values.get("time_of_day").copied()?;
            return Some(time_band(t, band));
        }
        self.context_values
            .get(key)
            .or_else(|| self.state_values.get(key))
            .copied()
    }
}

/// Membership of the time-of-day value in a named band.
///
/// The time value encodes night 0.0-0.2, morning 0.2-0.4, day 0.4-0.6,
/// evening 0.6-0.8 (see [`super::TimeOfDayNeuron`]); membership is 1.0
/// inside the band with a 0.05-wide linear falloff at each border.
pub fn time_band(t: f64, band: &str) -> f64 {
    let (lo, hi) = match band {
        "night" => (0.0, 0.2),
        "morning" => (0.2, 0.4),
        "day" => (0.4, 0.6),
        "evening" => (0.6, 0.8),
        _ => return 0.0,
    };
    const EDGE: f64 = 0.05;
    if t >= lo && t < hi {
        1.0
    } else if t >= lo - EDGE && t < lo {
        (t - (lo - EDGE)) / EDGE
    } else if t >= hi && t < hi + EDGE && hi < 0.8 {
        1.0 - (t - hi) / EDGE
    } else if band == "night" && t >= 0.75 {
        // The band wraps: late evening shades back into night
        ((t - 0.75) / EDGE).min(1.0)
    } else {
        0.0
    }
}

// ============================================================================
// EVALUATE TRAIT
// ============================================================================

/// A neuron: a named, layered, deterministic evaluator.
pub trait Evaluate: Send + Sync {
    /// Unique name within the layer
    fn name(&self) -> &str;
    /// Which layer this neuron runs in
    fn kind(&self) -> NeuronKind;
    /// Entities this neuron reads, for introspection
    fn entity_ids(&self) -> &[String] {
        &[]
    }
    /// Fan-in weights, for introspection; empty for neurons whose
    /// mapping is not weight-based
    fn weights(&self) -> HashMap<String, f64> {
        HashMap::new()
    }
    /// Produce a raw value for this tick; clamped by the manager.
    fn evaluate(&self, ctx: &EvalContext) -> Result<f64, NeuronError>;
}

// ============================================================================
// RUNTIME SNAPSHOT
// ============================================================================

/// Runtime record the manager keeps per neuron.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuronSnapshot {
    /// Neuron name
    pub name: String,
    /// Layer
    pub kind: NeuronKind,
    /// Last clamped value
    pub value: f64,
    /// Confidence in the value (1.0 for a clean evaluation, 0.0 for a
    /// substituted neutral)
    pub confidence: f64,
    /// Last update time in epoch milliseconds
    pub last_updated_ms: i64,
    /// Entities the neuron reads
    pub entity_ids: Vec<String>,
    /// Fan-in weights, when the neuron is weight-based
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub weights: HashMap<String, f64>,
    /// Recent values, oldest first, capacity 16
    pub history: VecDeque<f64>,
}

impl NeuronSnapshot {
    /// Fresh snapshot for a neuron.
    pub fn new(
        name: impl Into<String>,
        kind: NeuronKind,
        entity_ids: Vec<String>,
        weights: HashMap<String, f64>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            value: kind.neutral_value(),
            confidence: 0.0,
            last_updated_ms: 0,
            entity_ids,
            weights,
            history: VecDeque::with_capacity(NEURON_HISTORY_CAP),
        }
    }

    /// Record a tick's value.
    pub fn record(&mut self, value: f64, confidence: f64, now_ms: i64) {
        self.value = value;
        self.confidence = confidence;
        self.last_updated_ms = now_ms;
        if self.history.len() == NEURON_HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(value);
    }
}
