//! Neural Pipeline
//!
//! A three-layer evaluator over household state: context neurons read raw
//! entity states, state neurons derive higher-level indices from context
//! values, and mood neurons aggregate both into per-mood activations. One
//! tick runs the layers strictly in order, smooths the mood values
//! against recent history, and selects the dominant mood.

mod context;
mod energy;
mod manager;
mod model;
mod mood;
mod network;
mod state;
mod suggestion;
mod zone_mood;

pub use context::{LightLevelNeuron, PresenceNeuron, TimeOfDayNeuron, WeatherNeuron};
pub use energy::{EnergyCostNeuron, GridOptimizationNeuron, PvForecastNeuron};
pub use manager::{NeuronManager, TickResult};
pub use model::{
    EntityState, EvalContext, Evaluate, NeuronError, NeuronKind, NeuronSnapshot, clamp01,
};
pub use mood::{MoodNeuron, default_mood_neurons};
pub use network::NetQualityNeuron;
pub use state::{
    AttentionLoadNeuron, ComfortIndexNeuron, EnergyLevelNeuron, RoutineStabilityNeuron,
    SleepDebtNeuron, StressIndexNeuron,
};
pub use suggestion::{SUGGESTION_THRESHOLD, Suggestion, SuggestionQueue};
pub use zone_mood::{
    ZoneMood, ZoneMoodEngine, ZoneMoodSummary, ZoneProfile, ZoneRole, infer_role,
};
