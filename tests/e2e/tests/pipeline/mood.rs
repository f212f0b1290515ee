//! Neural pipeline scenarios: smoothing (S6), invariants I1/I2,
//! failure sandboxing, suggestion gating.

use chrono::{TimeZone, Utc};
use hearth_core::{
    EntityState, EvalContext, Evaluate, NeuronError, NeuronKind, NeuronManager, NeuronSettings,
};
use hearth_e2e_tests::mocks::ScriptedMood;

fn at_minute(minute: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 4, 12, minute, 0).unwrap()
}

#[test]
fn s6_mood_smoothing_three_sample_mean() {
    // Raw focus alternates 0.9/0.1 while everything else sits at 0.2
    let mut manager = NeuronManager::new(NeuronSettings::default());
    manager.add_neuron(Box::new(ScriptedMood::new("focus", vec![0.9, 0.1])));
    for other in ["relax", "active", "sleep", "away"] {
        manager.add_neuron(Box::new(ScriptedMood::new(other, vec![0.2])));
    }

    let mut last = None;
    for minute in 0..10 {
        last = Some(manager.tick(at_minute(minute)));
    }
    let result = last.unwrap();
    let smoothed = result.smoothed_moods["focus"];
    assert!(
        (0.4..=0.6).contains(&smoothed),
        "smoothed focus {smoothed} outside [0.4, 0.6] after 10 ticks"
    );
}

#[test]
fn i1_dominant_mood_is_known_or_relax() {
    let known = [
        "relax", "focus", "active", "sleep", "away", "alert", "social", "recovery",
    ];

    // Full catalogue under assorted states
    let mut manager = NeuronManager::with_defaults(NeuronSettings::default());
    for (minute, entity, state) in [
        (0, "person.alice", "home"),
        (1, "person.alice", "not_home"),
        (2, "media_player.tv", "playing"),
    ] {
        manager.update_states(
            [(entity.to_string(), EntityState::new(state))]
                .into_iter()
                .collect(),
        );
        let result = manager.tick(at_minute(minute));
        assert!(known.contains(&result.dominant_mood.as_str()));
    }

    // No mood neurons at all: fallback is relax
    let mut empty = NeuronManager::new(NeuronSettings::default());
    let result = empty.tick(at_minute(0));
    assert_eq!(result.dominant_mood, "relax");
    assert_eq!(result.mood_confidence, 0.0);
}

#[test]
fn i2_all_neuron_values_in_unit_interval() {
    let mut manager = NeuronManager::with_defaults(NeuronSettings::default());
    manager.update_states(
        [
            ("person.alice".to_string(), EntityState::new("home")),
            ("media_player.tv".to_string(), EntityState::new("playing")),
            ("weather.home".to_string(), EntityState::new("rainy")),
        ]
        .into_iter()
        .collect(),
    );
    for minute in 0..5 {
        let result = manager.tick(at_minute(minute));
        for (name, value) in result
            .context_values
            .iter()
            .chain(&result.state_values)
            .chain(&result.mood_values)
        {
            assert!((0.0..=1.0).contains(value), "{name} escaped [0,1]: {value}");
        }
    }
}

struct ExplodingNeuron(NeuronKind);

impl Evaluate for ExplodingNeuron {
    fn name(&self) -> &str {
        "exploding"
    }
    fn kind(&self) -> NeuronKind {
        self.0
    }
    fn evaluate(&self, _ctx: &EvalContext) -> Result<f64, NeuronError> {
        Err(NeuronError::MissingInput("sensor.gone".to_string()))
    }
}

#[test]
fn failing_neuron_never_fails_the_tick() {
    let mut manager = NeuronManager::with_defaults(NeuronSettings::default());
    manager.add_neuron(Box::new(ExplodingNeuron(NeuronKind::Context)));
    manager.add_neuron(Box::new(ExplodingNeuron(NeuronKind::State)));
    manager.add_neuron(Box::new(ExplodingNeuron(NeuronKind::Mood)));

    let result = manager.tick(at_minute(0));
    // Neutral substitutions per layer
    assert_eq!(result.context_values["exploding"], 0.5);
    assert_eq!(result.state_values["exploding"], 0.5);
    assert_eq!(result.mood_values["exploding"], 0.0);
    // The rest of the pipeline still ran
    assert!(result.context_values.contains_key("time_of_day"));
    assert!(!result.dominant_mood.is_empty());
}

#[test]
fn mood_changed_only_fires_on_transitions() {
    let mut manager = NeuronManager::new(NeuronSettings::default());
    manager.add_neuron(Box::new(ScriptedMood::new("focus", vec![0.9])));

    let first = manager.tick(at_minute(0));
    assert!(!first.mood_changed, "no previous mood on the first tick");
    for minute in 1..5 {
        let result = manager.tick(at_minute(minute));
        assert!(!result.mood_changed, "stable mood must not re-fire");
    }
}

#[test]
fn suggestion_boundary_is_half() {
    // Values straddling the 0.5 decision boundary
    let mut below = NeuronManager::new(NeuronSettings::default());
    below.add_neuron(Box::new(ScriptedMood::new("sleep", vec![0.499])));
    assert!(below.tick(at_minute(0)).suggestions.is_empty());

    let mut above = NeuronManager::new(NeuronSettings::default());
    above.add_neuron(Box::new(ScriptedMood::new("sleep", vec![0.9])));
    let result = above.tick(at_minute(0));
    assert_eq!(result.suggestions.len(), 1);
    assert_eq!(result.suggestions[0].source_mood, "sleep");
}

#[test]
fn suggestions_expire_after_thirty_minutes() {
    let mut manager = NeuronManager::new(NeuronSettings::default());
    manager.add_neuron(Box::new(ScriptedMood::new("away", vec![0.9])));
    let result = manager.tick(at_minute(0));
    let suggestion = &result.suggestions[0];
    assert_eq!(
        suggestion.expires_at_ms - suggestion.created_at_ms,
        30 * 60_000
    );
}
