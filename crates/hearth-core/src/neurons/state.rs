//! State neurons - derived household indices
//!
//! State neurons combine the frozen context-layer outputs (and a few raw
//! states) into slower-moving indices: energy, stress, routine stability,
//! sleep debt, attention load, comfort. All mappings are deterministic
//! piecewise/weighted forms over [0, 1] inputs.

use super::model::{EvalContext, Evaluate, NeuronError, NeuronKind, clamp01, time_band};

fn context_value(ctx: &EvalContext, name: &str) -> f64 {
    ctx.context_values.get(name).copied().unwrap_or(0.5)
}

// ============================================================================
// ENERGY LEVEL
// ============================================================================

/// Circadian energy estimate.
///
/// Follows the time-of-day curve: low at night, rising through the
/// morning, peaking mid-day, declining through the evening. Bright light
/// nudges it up.
pub struct EnergyLevelNeuron;

impl EnergyLevelNeuron {
    /// Construct.
    pub fn new() -> Self {
        Self
    }
}

impl Default for EnergyLevelNeuron {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluate for EnergyLevelNeuron {
    fn name(&self) -> &str {
        "energy_level"
    }

    fn kind(&self) -> NeuronKind {
        NeuronKind::State
    }

    fn evaluate(&self, ctx: &EvalContext) -> Result<f64, NeuronError> {
        let t = context_value(ctx, "time_of_day");
        let light = context_value(ctx, "light_level");

        // Piecewise circadian base over the encoded time value
        let base = if t < 0.2 {
            0.15
        } else if t < 0.4 {
            // Morning ramp 0.4 → 0.8
            0.4 + (t - 0.2) / 0.2 * 0.4
        } else if t < 0.6 {
            // Day plateau around 0.85
            0.85
        } else if t < 0.8 {
            // Evening decline 0.8 → 0.35
            0.8 - (t - 0.6) / 0.2 * 0.45
        } else {
            0.2
        };

        Ok(clamp01(base + (light - 0.5) * 0.2))
    }
}

// ============================================================================
// STRESS INDEX
// ============================================================================

/// Household stress estimate from activity pressure and conditions.
pub struct StressIndexNeuron;

impl StressIndexNeuron {
    /// Construct.
    pub fn new() -> Self {
        Self
    }
}

impl Default for StressIndexNeuron {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluate for StressIndexNeuron {
    fn name(&self) -> &str {
        "stress_index"
    }

    fn kind(&self) -> NeuronKind {
        NeuronKind::State
    }

    fn evaluate(&self, ctx: &EvalContext) -> Result<f64, NeuronError> {
        let presence = context_value(ctx, "presence");
        let weather = context_value(ctx, "weather");
        let t = context_value(ctx, "time_of_day");

        // Busy house during the day, foul weather, and late-night
        // activity each contribute
        let activity_pressure = presence * time_band(t, "day");
        let night_activity = presence * time_band(t, "night");
        Ok(clamp01(
            0.4 * activity_pressure + 0.3 * (1.0 - weather) + 0.3 * night_activity,
        ))
    }
}

// ============================================================================
// ROUTINE STABILITY
// ============================================================================

/// How closely presence tracks the expected daily routine.
///
/// The expectation is a plain weekday shape: home at night and in the
/// evening, mostly away mid-day.
pub struct RoutineStabilityNeuron;

impl RoutineStabilityNeuron {
    /// Construct.
    pub fn new() -> Self {
        Self
    }

    fn expected_presence(t: f64) -> f64 {
        if t < 0.2 {
            1.0
        } else if t < 0.4 {
            0.8
        } else if t < 0.6 {
            0.3
        } else if t < 0.8 {
            0.9
        } else {
            1.0
        }
    }
}

impl Default for RoutineStabilityNeuron {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluate for RoutineStabilityNeuron {
    fn name(&self) -> &str {
        "routine_stability"
    }

    fn kind(&self) -> NeuronKind {
        NeuronKind::State
    }

    fn evaluate(&self, ctx: &EvalContext) -> Result<f64, NeuronError> {
        let presence = context_value(ctx, "presence");
        let t = context_value(ctx, "time_of_day");
        Ok(clamp01(1.0 - (presence - Self::expected_presence(t)).abs()))
    }
}

// ============================================================================
// SLEEP DEBT
// ============================================================================

/// Accumulating pressure to sleep: high late at night while the house is
/// still active.
pub struct SleepDebtNeuron;

impl SleepDebtNeuron {
    /// Construct.
    pub fn new() -> Self {
        Self
    }
}

impl Default for SleepDebtNeuron {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluate for SleepDebtNeuron {
    fn name(&self) -> &str {
        "sleep_debt"
    }

    fn kind(&self) -> NeuronKind {
        NeuronKind::State
    }

    fn evaluate(&self, ctx: &EvalContext) -> Result<f64, NeuronError> {
        let presence = context_value(ctx, "presence");
        let t = context_value(ctx, "time_of_day");
        let light = context_value(ctx, "light_level");

        let night = time_band(t, "night");
        let late_evening = ((t - 0.7) / 0.1).clamp(0.0, 1.0);
        // Bright rooms late at night push the debt up
        Ok(clamp01(
            presence * (0.7 * night + 0.3 * late_evening) * (0.6 + 0.4 * light),
        ))
    }
}

// ============================================================================
// ATTENTION LOAD
// ============================================================================

/// How much is competing for attention: active media players and busy
/// day-time presence.
pub struct AttentionLoadNeuron;

impl AttentionLoadNeuron {
    /// Construct.
    pub fn new() -> Self {
        Self
    }
}

impl Default for AttentionLoadNeuron {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluate for AttentionLoadNeuron {
    fn name(&self) -> &str {
        "attention_load"
    }

    fn kind(&self) -> NeuronKind {
        NeuronKind::State
    }

    fn evaluate(&self, ctx: &EvalContext) -> Result<f64, NeuronError> {
        let presence = context_value(ctx, "presence");
        let t = context_value(ctx, "time_of_day");

        let players = ctx.entities_in_domain("media_player");
        let playing = players
            .iter()
            .filter(|id| ctx.state_of(id).is_some_and(|s| s.is("playing")))
            .count();
        let media_load = if players.is_empty() {
            0.0
        } else {
            (playing as f64 / players.len() as f64).min(1.0)
        };

        let daytime = time_band(t, "day").max(0.5 * time_band(t, "evening"));
        Ok(clamp01(0.5 * media_load + 0.5 * presence * daytime))
    }
}

// ============================================================================
// COMFORT INDEX
// ============================================================================

/// Environmental comfort from weather, light balance, and indoor
/// temperature (21 °C is ideal, ±6 °C spans the scale).
pub struct ComfortIndexNeuron {
    entity_ids: Vec<String>,
}

impl ComfortIndexNeuron {
    const IDEAL_TEMP_C: f64 = 21.0;
    const TEMP_SPAN_C: f64 = 6.0;

    /// Construct over temperature sensor entities.
    pub fn new(entity_ids: Vec<String>) -> Self {
        Self { entity_ids }
    }

    fn temp_comfort(&self, ctx: &EvalContext) -> f64 {
        for entity_id in &self.entity_ids {
            if let Some(temp) = ctx.state_of(entity_id).and_then(|s| s.numeric()) {
                let deviation = ((temp - Self::IDEAL_TEMP_C).abs() / Self::TEMP_SPAN_C).min(1.0);
                return 1.0 - deviation;
            }
        }
        0.5
    }
}

impl Evaluate for ComfortIndexNeuron {
    fn name(&self) -> &str {
        "comfort_index"
    }

    fn kind(&self) -> NeuronKind {
        NeuronKind::State
    }

    fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    fn evaluate(&self, ctx: &EvalContext) -> Result<f64, NeuronError> {
        let weather = context_value(ctx, "weather");
        let light = context_value(ctx, "light_level");
        // Mid-range light is most comfortable
        let light_comfort = 1.0 - (light - 0.5).abs() * 2.0 * 0.6;
        Ok(clamp01(
            0.4 * weather + 0.3 * light_comfort + 0.3 * self.temp_comfort(ctx),
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================
