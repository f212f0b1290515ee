//! Neuron manager - runs the neural pipeline
//!
//! One tick evaluates Context → State → Mood strictly in order, freezing
//! each layer's outputs before the next starts. Per-neuron failures are
//! sandboxed: a failing neuron contributes its layer's neutral value and
//! the tick continues. Mood values are smoothed against recent history
//! before the dominant mood is selected.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::NeuronSettings;

use super::context::{LightLevelNeuron, PresenceNeuron, TimeOfDayNeuron, WeatherNeuron};
use super::model::{
    EntityState, EvalContext, Evaluate, NeuronKind, NeuronSnapshot, clamp01,
};
use super::mood::default_mood_neurons;
use super::state::{
    AttentionLoadNeuron, ComfortIndexNeuron, EnergyLevelNeuron, RoutineStabilityNeuron,
    SleepDebtNeuron, StressIndexNeuron,
};
use super::suggestion::{Suggestion, suggest_for_mood};

/// Fallback dominant mood when no mood neuron produces a positive value.
const FALLBACK_MOOD: &str = "relax";

/// Result of one pipeline tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickResult {
    /// Tick time, epoch milliseconds
    pub timestamp_ms: i64,
    /// Context-layer outputs
    pub context_values: HashMap<String, f64>,
    /// State-layer outputs
    pub state_values: HashMap<String, f64>,
    /// Raw mood-layer outputs
    pub mood_values: HashMap<String, f64>,
    /// Smoothed mood values used for selection
    pub smoothed_moods: HashMap<String, f64>,
    /// The winning mood
    pub dominant_mood: String,
    /// Smoothed value at the winning mood
    pub mood_confidence: f64,
    /// Whether the dominant mood changed versus the previous tick
    pub mood_changed: bool,
    /// Suggestions produced from the dominant mood
    pub suggestions: Vec<Suggestion>,
}

/// Owns the neurons and drives the pipeline.
pub struct NeuronManager {
    context_neurons: Vec<Box<dyn Evaluate>>,
    state_neurons: Vec<Box<dyn Evaluate>>,
    mood_neurons: Vec<Box<dyn Evaluate>>,
    snapshots: HashMap<String, NeuronSnapshot>,

    states: HashMap<String, EntityState>,
    sun_elevation: Option<f64>,
    presence_zones: HashMap<String, f64>,
    utc_offset_hours: f64,

    mood_history: VecDeque<HashMap<String, f64>>,
    last_dominant: Option<String>,
    settings: NeuronSettings,
}

impl NeuronManager {
    /// Empty manager; add neurons with [`Self::add_neuron`].
    pub fn new(settings: NeuronSettings) -> Self {
        Self {
            context_neurons: Vec::new(),
            state_neurons: Vec::new(),
            mood_neurons: Vec::new(),
            snapshots: HashMap::new(),
            states: HashMap::new(),
            sun_elevation: None,
            presence_zones: HashMap::new(),
            utc_offset_hours: 0.0,
            mood_history: VecDeque::new(),
            last_dominant: None,
            settings,
        }
    }

    /// Manager with the default neuron catalogue installed.
    pub fn with_defaults(settings: NeuronSettings) -> Self {
        let mut manager = Self::new(settings);
        manager.add_neuron(Box::new(PresenceNeuron::new(Vec::new(), "house")));
        manager.add_neuron(Box::new(TimeOfDayNeuron::new()));
        manager.add_neuron(Box::new(LightLevelNeuron::new(Vec::new(), true)));
        manager.add_neuron(Box::new(WeatherNeuron::new(vec![
            "weather.home".to_string(),
        ])));

        manager.add_neuron(Box::new(EnergyLevelNeuron::new()));
        manager.add_neuron(Box::new(StressIndexNeuron::new()));
        manager.add_neuron(Box::new(RoutineStabilityNeuron::new()));
        manager.add_neuron(Box::new(SleepDebtNeuron::new()));
        manager.add_neuron(Box::new(AttentionLoadNeuron::new()));
        manager.add_neuron(Box::new(ComfortIndexNeuron::new(Vec::new())));

        for mood in default_mood_neurons() {
            manager.add_neuron(Box::new(mood));
        }
        info!(
            context = manager.context_neurons.len(),
            state = manager.state_neurons.len(),
            mood = manager.mood_neurons.len(),
            "neuron manager configured"
        );
        manager
    }

    /// Register a neuron into its layer.
    pub fn add_neuron(&mut self, neuron: Box<dyn Evaluate>) {
        let key = format!("{}.{}", neuron.kind(), neuron.name());
        self.snapshots.insert(
            key,
            NeuronSnapshot::new(
                neuron.name(),
                neuron.kind(),
                neuron.entity_ids().to_vec(),
                neuron.weights(),
            ),
        );
        match neuron.kind() {
            NeuronKind::Context => self.context_neurons.push(neuron),
            NeuronKind::State => self.state_neurons.push(neuron),
            NeuronKind::Mood => self.mood_neurons.push(neuron),
        }
    }

    /// Merge entity state updates; neurons see them on the next tick.
    pub fn update_states(&mut self, updates: HashMap<String, EntityState>) {
        debug!(count = updates.len(), "entity states updated");
        self.states.extend(updates);
    }

    /// Record a single entity transition.
    pub fn apply_event(&mut self, event: &crate::event::Event) {
        self.states
            .insert(event.entity_id.clone(), EntityState::new(event.transition.clone()));
    }

    /// Supply sun elevation for the light neuron.
    pub fn set_sun_elevation(&mut self, elevation: Option<f64>) {
        self.sun_elevation = elevation;
    }

    /// Supply per-zone presence scores.
    pub fn set_presence_zones(&mut self, zones: HashMap<String, f64>) {
        self.presence_zones = zones;
    }

    /// Local-time offset used by the time neuron.
    pub fn set_utc_offset_hours(&mut self, offset: f64) {
        self.utc_offset_hours = offset;
    }

    /// Snapshot of every neuron's runtime record.
    pub fn snapshots(&self) -> &HashMap<String, NeuronSnapshot> {
        &self.snapshots
    }

    /// Current entity states as seen by the pipeline.
    pub fn entity_states(&self) -> &HashMap<String, EntityState> {
        &self.states
    }

    /// The previous tick's dominant mood, if a tick ran.
    pub fn dominant_mood(&self) -> Option<&str> {
        self.last_dominant.as_deref()
    }

    /// Run one pipeline tick at `now`. Never fails; individual neuron
    /// failures degrade to neutral values.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickResult {
        let now_ms = now.timestamp_millis();
        let mut ctx = EvalContext::new(now);
        ctx.states = self.states.clone();
        ctx.sun_elevation = self.sun_elevation;
        ctx.presence_zones = self.presence_zones.clone();
        ctx.utc_offset_hours = self.utc_offset_hours;

        // 1. Context layer
        let context_values =
            evaluate_layer(&self.context_neurons, &ctx, &mut self.snapshots, now_ms);
        ctx.context_values = context_values.clone();

        // 2. State layer sees frozen context values
        let state_values = evaluate_layer(&self.state_neurons, &ctx, &mut self.snapshots, now_ms);
        ctx.state_values = state_values.clone();

        // 3. Mood layer sees both
        let mood_values = evaluate_layer(&self.mood_neurons, &ctx, &mut self.snapshots, now_ms);

        // 4. Smooth against recent snapshots and select
        let smoothed_moods = self.smooth(&mood_values);
        let (dominant_mood, mood_confidence) = select_dominant(&self.mood_neurons, &smoothed_moods);

        let mood_changed = self
            .last_dominant
            .as_deref()
            .is_some_and(|prev| prev != dominant_mood);
        if mood_changed {
            info!(mood = %dominant_mood, confidence = mood_confidence, "mood changed");
        }
        self.last_dominant = Some(dominant_mood.clone());

        self.mood_history.push_back(mood_values.clone());
        while self.mood_history.len() > self.settings.mood_history {
            self.mood_history.pop_front();
        }

        // 5. Suggestions from the dominant mood
        let suggestions: Vec<Suggestion> = suggest_for_mood(
            &dominant_mood,
            mood_confidence,
            &ctx,
            now_ms,
            self.settings.suggestion_ttl_min,
        )
        .into_iter()
        .collect();

        debug!(
            mood = %dominant_mood,
            confidence = mood_confidence,
            suggestions = suggestions.len(),
            "tick complete"
        );

        TickResult {
            timestamp_ms: now_ms,
            context_values,
            state_values,
            mood_values,
            smoothed_moods,
            dominant_mood,
            mood_confidence,
            mood_changed,
            suggestions,
        }
    }

    /// Average each raw mood value with the trailing snapshots.
    fn smooth(&self, mood_values: &HashMap<String, f64>) -> HashMap<String, f64> {
        let window = self.settings.smoothing_window;
        let trailing: Vec<&HashMap<String, f64>> = self
            .mood_history
            .iter()
            .rev()
            .take(window)
            .collect();

        mood_values
            .iter()
            .map(|(mood, value)| {
                let mut sum = *value;
                let mut count = 1.0;
                for snapshot in &trailing {
                    sum += snapshot.get(mood).copied().unwrap_or(0.0);
                    count += 1.0;
                }
                (mood.clone(), sum / count)
            })
            .collect()
    }
}

/// Evaluate one layer, sandboxing failures to the layer's neutral value.
fn evaluate_layer(
    neurons: &[Box<dyn Evaluate>],
    ctx: &EvalContext,
    snapshots: &mut HashMap<String, NeuronSnapshot>,
    now_ms: i64,
) -> HashMap<String, f64> {
    let mut values = HashMap::with_capacity(neurons.len());
    for neuron in neurons {
        let (value, confidence) = match neuron.evaluate(ctx) {
            Ok(raw) => (clamp01(raw), 1.0),
            Err(e) => {
                warn!(
                    neuron = neuron.name(),
                    layer = %neuron.kind(),
                    error = %e,
                    "neuron evaluation failed, substituting neutral value"
                );
                (neuron.kind().neutral_value(), 0.0)
            }
        };
        values.insert(neuron.name().to_string(), value);
        let key = format!("{}.{}", neuron.kind(), neuron.name());
        if let Some(snapshot) = snapshots.get_mut(&key) {
            snapshot.record(value, confidence, now_ms);
        }
    }
    values
}

/// Argmax over smoothed moods in registration order; falls back to
/// `relax` at zero confidence when nothing is positive.
fn select_dominant(
    mood_neurons: &[Box<dyn Evaluate>],
    smoothed: &HashMap<String, f64>,
) -> (String, f64) {
    let mut best: Option<(&str, f64)> = None;
    for neuron in mood_neurons {
        if let Some(value) = smoothed.get(neuron.name()) {
            match best {
                Some((_, best_value)) if *value <= best_value => {}
                _ => best = Some((neuron.name(), *value)),
            }
        }
    }
    match best {
        Some((name, value)) if value > 0.0 => (name.to_string(), value),
        _ => (FALLBACK_MOOD.to_string(), 0.0),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neurons::model::NeuronError;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Mood neuron driven directly by the test.
    struct ScriptedMood {
        name: String,
        values: Vec<f64>,
        calls: Arc<AtomicU64>,
    }

    impl ScriptedMood {
        fn new(name: &str, values: Vec<f64>) -> Self {
            Self {
                name: name.to_string(),
                values,
                calls: Arc::new(AtomicU64::new(0)),
            }
        }
    }

    impl Evaluate for ScriptedMood {
        fn name(&self) -> &str {
            &self.name
        }
        fn kind(&self) -> NeuronKind {
            NeuronKind::Mood
        }
        fn evaluate(&self, _ctx: &EvalContext) -> Result<f64, NeuronError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            Ok(self.values[call % self.values.len()])
        }
    }

    struct FailingNeuron(NeuronKind);

    impl Evaluate for FailingNeuron {
        fn name(&self) -> &str {
            "broken"
        }
        fn kind(&self) -> NeuronKind {
            self.0
        }
        fn evaluate(&self, _ctx: &EvalContext) -> Result<f64, NeuronError> {
            Err(NeuronError::MissingInput("everything".to_string()))
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 4, 12, minute, 0).unwrap()
    }

    #[test]
    fn test_layers_run_in_order_and_freeze() {
        let mut manager = NeuronManager::with_defaults(NeuronSettings::default());
        let result = manager.tick(at(0));
        // Context values fed the state layer
        assert!(result.context_values.contains_key("time_of_day"));
        assert!(result.state_values.contains_key("energy_level"));
        assert!(result.mood_values.contains_key("relax"));
        // I2: everything in [0, 1]
        for (name, v) in result
            .context_values
            .iter()
            .chain(&result.state_values)
            .chain(&result.mood_values)
        {
            assert!((0.0..=1.0).contains(v), "{name} out of range: {v}");
        }
    }

    #[test]
    fn test_empty_mood_layer_falls_back_to_relax() {
        // I1: dominant ∈ known moods ∪ {relax}
        let mut manager = NeuronManager::new(NeuronSettings::default());
        let result = manager.tick(at(0));
        assert_eq!(result.dominant_mood, "relax");
        assert_eq!(result.mood_confidence, 0.0);
        assert!(result.suggestions.is_empty());
    }

    #[test]
    fn test_failing_neuron_degrades_to_neutral() {
        let mut manager = NeuronManager::new(NeuronSettings::default());
        manager.add_neuron(Box::new(FailingNeuron(NeuronKind::Context)));
        manager.add_neuron(Box::new(FailingNeuron(NeuronKind::Mood)));
        let result = manager.tick(at(0));
        assert_eq!(result.context_values["broken"], 0.5);
        assert_eq!(result.mood_values["broken"], 0.0);
        // Confidence zero on the substituted snapshot
        assert_eq!(manager.snapshots()["context.broken"].confidence, 0.0);
    }

    #[test]
    fn test_mood_changed_fires_on_transitions_only() {
        let mut manager = NeuronManager::new(NeuronSettings::default());
        manager.add_neuron(Box::new(ScriptedMood::new(
            "focus",
            vec![0.9, 0.9, 0.0, 0.0, 0.0, 0.0],
        )));
        manager.add_neuron(Box::new(ScriptedMood::new("sleep", vec![0.2])));

        let first = manager.tick(at(0));
        assert_eq!(first.dominant_mood, "focus");
        assert!(!first.mood_changed, "first tick has no previous mood");

        let second = manager.tick(at(1));
        assert!(!second.mood_changed);

        // focus collapses; smoothing delays the flip but sleep wins
        // once the trailing mean crosses
        let mut changed_at = None;
        for minute in 2..8 {
            let result = manager.tick(at(minute));
            if result.mood_changed {
                changed_at = Some((minute, result.dominant_mood.clone()));
                break;
            }
        }
        let (_, new_mood) = changed_at.expect("mood change after collapse");
        assert_eq!(new_mood, "sleep");
    }

    #[test]
    fn test_smoothing_three_sample_trailing_mean() {
        // S6: raw focus alternates 0.9/0.1, everything else flat 0.2
        let mut manager = NeuronManager::new(NeuronSettings::default());
        manager.add_neuron(Box::new(ScriptedMood::new("focus", vec![0.9, 0.1])));
        for other in ["relax", "sleep", "away"] {
            manager.add_neuron(Box::new(ScriptedMood::new(other, vec![0.2])));
        }

        let mut last = None;
        for minute in 0..10 {
            last = Some(manager.tick(at(minute)));
        }
        let result = last.unwrap();
        let smoothed_focus = result.smoothed_moods["focus"];
        assert!(
            (0.4..=0.6).contains(&smoothed_focus),
            "smoothed focus {smoothed_focus} outside [0.4, 0.6]"
        );
        // Focus still dominates the flat 0.2 moods
        assert_eq!(result.dominant_mood, "focus");
    }

    #[test]
    fn test_mood_history_is_bounded() {
        let settings = NeuronSettings {
            mood_history: 10,
            ..Default::default()
        };
        let mut manager = NeuronManager::new(settings);
        manager.add_neuron(Box::new(ScriptedMood::new("focus", vec![0.7])));
        for minute in 0..30 {
            manager.tick(at(minute));
        }
        assert!(manager.mood_history.len() <= 10);
    }

    #[test]
    fn test_suggestions_follow_dominant_mood() {
        let mut manager = NeuronManager::new(NeuronSettings::default());
        manager.add_neuron(Box::new(ScriptedMood::new("sleep", vec![0.9])));
        let result = manager.tick(at(0));
        assert_eq!(result.dominant_mood, "sleep");
        assert_eq!(result.suggestions.len(), 1);
        assert_eq!(result.suggestions[0].source_mood, "sleep");
        assert_eq!(
            result.suggestions[0].expires_at_ms - result.suggestions[0].created_at_ms,
            30 * 60_000
        );
    }

    #[test]
    fn test_low_value_moods_suggest_nothing() {
        let mut manager = NeuronManager::new(NeuronSettings::default());
        manager.add_neuron(Box::new(ScriptedMood::new("sleep", vec![0.4])));
        let result = manager.tick(at(0));
        assert_eq!(result.dominant_mood, "sleep");
        assert!(result.suggestions.is_empty());
    }

    #[test]
    fn test_apply_event_updates_states() {
        let mut manager = NeuronManager::with_defaults(NeuronSettings::default());
        manager.apply_event(&crate::event::Event::new(1_000, "media_player.tv", "playing"));
        let result = manager.tick(at(0));
        // attention_load sees the playing media player
        assert!(result.state_values["attention_load"] > 0.0);
    }
}
