//! Mood neurons - weighted fan-in over context and state values
//!
//! Every mood is one concrete shape: a bias plus a weighted sum of
//! feature references (`context.presence`, `state.energy_level`,
//! `time.evening`, ...). Missing features contribute nothing, so a mood
//! degrades gracefully when an optional neuron is absent.

use std::collections::HashMap;

use super::model::{EvalContext, Evaluate, NeuronError, NeuronKind, clamp01};

/// A mood neuron: `clamp01(bias + Σ wᵢ · featureᵢ)`.
pub struct MoodNeuron {
    name: String,
    bias: f64,
    weights: HashMap<String, f64>,
}

impl MoodNeuron {
    /// Build a mood neuron from a weight table.
    pub fn new(name: impl Into<String>, bias: f64, weights: &[(&str, f64)]) -> Self {
        Self {
            name: name.into(),
            bias,
            weights: weights
                .iter()
                .map(|(k, w)| (k.to_string(), *w))
                .collect(),
        }
    }

}

impl Evaluate for MoodNeuron {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NeuronKind {
        NeuronKind::Mood
    }

    fn weights(&self) -> HashMap<String, f64> {
        self.weights.clone()
    }

    fn evaluate(&self, ctx: &EvalContext) -> Result<f64, NeuronError> {
        let mut activation = self.bias;
        for (feature, weight) in &self.weights {
            if let Some(value) = ctx.feature(feature) {
                activation += weight * value;
            }
        }
        Ok(clamp01(activation))
    }
}

/// The default mood catalogue.
///
/// Weights are hand-tuned against the context/state curves; each mood is
/// designed to clear 0.5 only in its characteristic situation.
pub fn default_mood_neurons() -> Vec<MoodNeuron> {
    vec![
        MoodNeuron::new(
            "relax",
            0.15,
            &[
                ("time.evening", 0.35),
                ("context.presence", 0.3),
                ("state.attention_load", -0.25),
                ("state.stress_index", -0.2),
                ("state.comfort_index", 0.2),
            ],
        ),
        MoodNeuron::new(
            "focus",
            0.0,
            &[
                ("time.day", 0.3),
                ("context.presence", 0.25),
                ("state.attention_load", 0.3),
                ("state.energy_level", 0.25),
                ("state.stress_index", -0.15),
            ],
        ),
        MoodNeuron::new(
            "active",
            0.0,
            &[
                ("state.energy_level", 0.4),
                ("context.presence", 0.3),
                ("time.day", 0.2),
                ("time.morning", 0.15),
            ],
        ),
        MoodNeuron::new(
            "sleep",
            0.0,
            &[
                ("time.night", 0.45),
                ("context.presence", 0.2),
                ("state.sleep_debt", 0.35),
                ("state.energy_level", -0.2),
            ],
        ),
        MoodNeuron::new(
            "away",
            0.75,
            &[
                ("context.presence", -0.8),
                ("state.attention_load", -0.1),
            ],
        ),
        MoodNeuron::new(
            "alert",
            0.0,
            &[
                ("state.stress_index", 0.5),
                ("context.weather", -0.25),
                ("context.net_quality", -0.3),
                ("time.night", 0.15),
                ("context.presence", 0.15),
            ],
        ),
        MoodNeuron::new(
            "social",
            0.0,
            &[
                ("context.presence", 0.4),
                ("time.evening", 0.3),
                ("context.weather", 0.15),
                ("state.attention_load", 0.15),
            ],
        ),
        MoodNeuron::new(
            "recovery",
            0.05,
            &[
                ("state.energy_level", -0.4),
                ("context.presence", 0.3),
                ("state.stress_index", 0.25),
                ("time.night", -0.2),
            ],
        ),
    ]
}
