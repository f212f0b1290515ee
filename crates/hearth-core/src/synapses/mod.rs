//! Synapse network
//!
//! Weighted directed connections between neuron ids and suggestion
//! outputs, modulating what the candidate layer surfaces. Connections
//! learn Hebbian-style from user feedback (`w ← clamp(w + η·reward)`),
//! decay when inactive, and are pruned once their weight becomes
//! negligible. Persisted as a JSON list.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::SynapseSettings;
use crate::error::{CoreError, ErrorKind};

/// Synapse error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SynapseError {
    /// Persistence failure
    #[error("synapse store IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed persisted file
    #[error("synapse store parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl CoreError for SynapseError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::StorageFailure
    }
}

/// Synapse result type
pub type Result<T> = std::result::Result<T, SynapseError>;

// ============================================================================
// MODEL
// ============================================================================

/// How a synapse transmits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynapseType {
    /// Increases the target value
    #[default]
    Excitatory,
    /// Decreases the target value
    Inhibitory,
    /// Adjusts the gain of other synapses
    Modulatory,
}

/// Lifecycle state of a synapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynapseState {
    /// Recently fired
    Active,
    /// Not recently active
    #[default]
    Dormant,
    /// Weight being adjusted
    Learning,
    /// Removed due to negligible weight
    Pruned,
}

/// A connection between a neuron and a neuron/suggestion output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synapse {
    /// `"<source>-><target>"`
    pub id: String,
    /// Source neuron id, e.g. `mood.relax`
    pub source: String,
    /// Target id, e.g. `suggestion.relax`
    pub target: String,
    /// Connection strength in [-1, 1]
    pub weight: f64,
    /// Minimum input for the synapse to fire
    pub threshold: f64,
    /// Transmission behavior
    #[serde(rename = "type")]
    pub synapse_type: SynapseType,
    /// Lifecycle state
    pub state: SynapseState,
    /// Creation time, epoch milliseconds
    pub created_at_ms: i64,
    /// Last firing time, epoch milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fired_ms: Option<i64>,
    /// Lifetime firing count
    pub fire_count: u64,
    /// Unknown fields, preserved
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Synapse {
    /// Create a dormant synapse.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        weight: f64,
        threshold: f64,
        synapse_type: SynapseType,
        now_ms: i64,
    ) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{source}->{target}"),
            source,
            target,
            weight: weight.clamp(-1.0, 1.0),
            threshold: threshold.clamp(0.0, 1.0),
            synapse_type,
            state: SynapseState::Dormant,
            created_at_ms: now_ms,
            last_fired_ms: None,
            fire_count: 0,
            extra: Map::new(),
        }
    }

    /// Whether the input clears the firing threshold.
    pub fn can_fire(&self, input: f64) -> bool {
        self.state != SynapseState::Pruned && input >= self.threshold
    }

    /// Transmitted signal for an input, without state updates.
    ///
    /// Excitatory transmits `input · weight`; inhibitory flips the sign;
    /// modulatory returns the bare weight as a gain.
    pub fn transmit(&self, input: f64) -> f64 {
        if !self.can_fire(input) {
            return 0.0;
        }
        match self.synapse_type {
            SynapseType::Excitatory => input * self.weight,
            SynapseType::Inhibitory => -(input * self.weight).abs(),
            SynapseType::Modulatory => self.weight,
        }
    }

    /// Fire: transmit and update activity bookkeeping.
    pub fn fire(&mut self, input: f64, now_ms: i64) -> f64 {
        let signal = self.transmit(input);
        if signal != 0.0 {
            self.last_fired_ms = Some(now_ms);
            self.fire_count += 1;
            self.state = SynapseState::Active;
        }
        signal
    }

    /// Hebbian weight update from a reward signal.
    pub fn learn(&mut self, reward: f64, learning_rate: f64, prune_threshold: f64) {
        if self.state == SynapseState::Pruned {
            return;
        }
        self.weight = (self.weight + learning_rate * reward).clamp(-1.0, 1.0);
        self.state = SynapseState::Learning;
        if self.weight.abs() < prune_threshold {
            self.state = SynapseState::Pruned;
            debug!(id = %self.id, "synapse pruned: weight negligible");
        }
    }

    /// Apply inactivity decay: `w ← w·(1−δ)` per elapsed day past the
    /// inactivity horizon.
    pub fn decay(&mut self, now_ms: i64, decay_rate: f64, inactivity_hours: f64) {
        if self.state == SynapseState::Pruned {
            return;
        }
        let reference = self.last_fired_ms.unwrap_or(self.created_at_ms);
        let idle_hours = (now_ms - reference) as f64 / 3_600_000.0;
        if idle_hours > inactivity_hours {
            let idle_days = (idle_hours / 24.0).floor().max(1.0);
            self.weight *= (1.0 - decay_rate).powf(idle_days);
            if self.weight.abs() < 0.1 {
                self.state = SynapseState::Dormant;
            }
        }
    }
}

// ============================================================================
// MANAGER
// ============================================================================

/// Network statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynapseStats {
    /// All synapses, pruned included
    pub total: usize,
    /// Recently fired
    pub active: usize,
    /// Idle
    pub dormant: usize,
    /// Mid-adjustment
    pub learning: usize,
    /// Dead weight
    pub pruned: usize,
    /// Mean weight over non-pruned synapses
    pub avg_weight: f64,
}

/// Owns the synapse network, its indexes, and its persistence.
pub struct SynapseManager {
    path: PathBuf,
    synapses: HashMap<String, Synapse>,
    outgoing: HashMap<String, HashSet<String>>,
    incoming: HashMap<String, HashSet<String>>,
    settings: SynapseSettings,
}

impl SynapseManager {
    /// Open the network from its JSON file, empty when absent.
    pub fn open(path: &Path, settings: SynapseSettings) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut manager = Self {
            path: path.to_path_buf(),
            synapses: HashMap::new(),
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
            settings,
        };
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(raw) => match serde_json::from_str::<Vec<Synapse>>(&raw) {
                    Ok(list) => {
                        for synapse in list {
                            manager.index(&synapse);
                            manager.synapses.insert(synapse.id.clone(), synapse);
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to parse synapse file, starting empty"),
                },
                Err(e) => warn!(error = %e, "failed to read synapse file, starting empty"),
            }
        }
        Ok(manager)
    }

    fn index(&mut self, synapse: &Synapse) {
        self.outgoing
            .entry(synapse.source.clone())
            .or_default()
            .insert(synapse.id.clone());
        self.incoming
            .entry(synapse.target.clone())
            .or_default()
            .insert(synapse.id.clone());
    }

    /// Persist the network as a JSON list.
    pub fn save(&self) -> Result<()> {
        let mut list: Vec<&Synapse> = self.synapses.values().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        let serialized = serde_json::to_string_pretty(&list)?;
        std::fs::write(&self.path, serialized)?;
        Ok(())
    }

    /// Create (or re-weight) a connection.
    pub fn connect(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        weight: f64,
        threshold: f64,
        synapse_type: SynapseType,
        now_ms: i64,
    ) -> &Synapse {
        let synapse = Synapse::new(source, target, weight, threshold, synapse_type, now_ms);
        let id = synapse.id.clone();
        if let Some(existing) = self.synapses.get_mut(&id) {
            existing.weight = synapse.weight;
            existing.threshold = synapse.threshold;
        } else {
            self.index(&synapse);
            self.synapses.insert(id.clone(), synapse);
        }
        &self.synapses[&id]
    }

    /// Make sure every mood has a default excitatory link to its
    /// suggestion output.
    pub fn ensure_default_wiring(&mut self, moods: &[&str], now_ms: i64) {
        for mood in moods {
            let source = format!("mood.{mood}");
            let target = format!("suggestion.{mood}");
            let id = format!("{source}->{target}");
            if !self.synapses.contains_key(&id) {
                self.connect(source, target, 1.0, 0.3, SynapseType::Excitatory, now_ms);
            }
        }
    }

    /// Propagate a firing source's value to its targets.
    ///
    /// Returns target id → summed transmitted signal.
    pub fn propagate(&mut self, source: &str, input: f64, now_ms: i64) -> HashMap<String, f64> {
        let ids: Vec<String> = self
            .outgoing
            .get(source)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let mut outputs: HashMap<String, f64> = HashMap::new();
        for id in ids {
            if let Some(synapse) = self.synapses.get_mut(&id) {
                let signal = synapse.fire(input, now_ms);
                if signal != 0.0 {
                    *outputs.entry(synapse.target.clone()).or_insert(0.0) += signal;
                }
            }
        }
        outputs
    }

    /// Aggregate all inbound signals for a target given current neuron
    /// values. Returns the clamped sum and the sources that fired.
    pub fn aggregate_inputs(
        &mut self,
        target: &str,
        neuron_values: &HashMap<String, f64>,
        now_ms: i64,
    ) -> (f64, Vec<String>) {
        let ids: Vec<String> = self
            .incoming
            .get(target)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let mut total = 0.0;
        let mut firing = Vec::new();
        for id in ids {
            if let Some(synapse) = self.synapses.get_mut(&id) {
                let input = neuron_values.get(&synapse.source).copied().unwrap_or(0.0);
                let signal = synapse.fire(input, now_ms);
                if signal != 0.0 {
                    total += signal;
                    firing.push(synapse.source.clone());
                }
            }
        }
        (total.clamp(0.0, 1.0), firing)
    }

    /// Apply user feedback for a suggestion sourced from `mood`.
    ///
    /// Strengthens (acceptance) or weakens (dismissal) every synapse
    /// into that mood's nodes, then persists.
    pub fn apply_feedback(&mut self, mood: &str, accepted: bool) -> Result<usize> {
        let reward = if accepted {
            self.settings.reward_magnitude
        } else {
            -self.settings.reward_magnitude
        };

        let mood_node = format!("mood.{mood}");
        let suggestion_node = format!("suggestion.{mood}");
        let mut adjusted = 0;
        for synapse in self.synapses.values_mut() {
            if synapse.target == mood_node || synapse.target == suggestion_node {
                synapse.learn(
                    reward,
                    self.settings.learning_rate,
                    self.settings.prune_threshold,
                );
                adjusted += 1;
            }
        }
        info!(mood, accepted, adjusted, "applied suggestion feedback");
        self.save()?;
        Ok(adjusted)
    }

    /// Apply inactivity decay across the network; returns how many
    /// synapses are pruned in total afterwards.
    pub fn apply_decay(&mut self, now_ms: i64) -> usize {
        for synapse in self.synapses.values_mut() {
            synapse.decay(
                now_ms,
                self.settings.decay_rate,
                self.settings.inactivity_hours,
            );
        }
        self.synapses
            .values()
            .filter(|s| s.state == SynapseState::Pruned)
            .count()
    }

    /// Remove pruned synapses from the network entirely.
    pub fn sweep_pruned(&mut self) -> usize {
        let dead: Vec<String> = self
            .synapses
            .values()
            .filter(|s| s.state == SynapseState::Pruned)
            .map(|s| s.id.clone())
            .collect();
        for id in &dead {
            if let Some(synapse) = self.synapses.remove(id) {
                if let Some(set) = self.outgoing.get_mut(&synapse.source) {
                    set.remove(id);
                }
                if let Some(set) = self.incoming.get_mut(&synapse.target) {
                    set.remove(id);
                }
            }
        }
        dead.len()
    }

    /// Fetch a synapse by id.
    pub fn get(&self, id: &str) -> Option<&Synapse> {
        self.synapses.get(id)
    }

    /// Network statistics.
    pub fn stats(&self) -> SynapseStats {
        let mut stats = SynapseStats {
            total: self.synapses.len(),
            ..Default::default()
        };
        let mut weight_sum = 0.0;
        let mut weight_count = 0usize;
        for synapse in self.synapses.values() {
            match synapse.state {
                SynapseState::Active => stats.active += 1,
                SynapseState::Dormant => stats.dormant += 1,
                SynapseState::Learning => stats.learning += 1,
                SynapseState::Pruned => stats.pruned += 1,
            }
            if synapse.state != SynapseState::Pruned {
                weight_sum += synapse.weight;
                weight_count += 1;
            }
        }
        if weight_count > 0 {
            stats.avg_weight = weight_sum / weight_count as f64;
        }
        stats
    }
}

// ============================================================================
// TESTS
// ============================================================================
