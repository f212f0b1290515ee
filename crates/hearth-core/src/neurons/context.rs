//! Context neurons - objective environmental factors
//!
//! Context neurons evaluate measurable, non-subjective aspects of the
//! environment: presence, time of day, ambient light, weather. Each has a
//! fixed, documented mapping from inputs to [0, 1].

use chrono::Timelike;

use super::model::{EvalContext, Evaluate, NeuronError, NeuronKind};

// ============================================================================
// PRESENCE
// ============================================================================

/// Presence in a zone or the whole house.
///
/// Person entities dominate: the value is the fraction of configured
/// person entities that are `home`. With no person signal, any `on`
/// presence/binary sensor for the zone forces 1.0.
pub struct PresenceNeuron {
    entity_ids: Vec<String>,
    zone: String,
}

impl PresenceNeuron {
    /// Presence over the given entities, scoped to `zone`.
    pub fn new(entity_ids: Vec<String>, zone: impl Into<String>) -> Self {
        Self {
            entity_ids,
            zone: zone.into(),
        }
    }
}

impl Evaluate for PresenceNeuron {
    fn name(&self) -> &str {
        "presence"
    }

    fn kind(&self) -> NeuronKind {
        NeuronKind::Context
    }

    fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    fn evaluate(&self, ctx: &EvalContext) -> Result<f64, NeuronError> {
        let person_entities: Vec<&String> = self
            .entity_ids
            .iter()
            .filter(|id| id.starts_with("person."))
            .collect();

        if !person_entities.is_empty() {
            let home = person_entities
                .iter()
                .filter(|id| ctx.state_of(id).is_some_and(|s| s.is("home")))
                .count();
            if home > 0 {
                return Ok(home as f64 / person_entities.len() as f64);
            }
        }

        if let Some(score) = ctx.presence_zones.get(&self.zone) {
            return Ok(*score);
        }

        let sensor_on = self
            .entity_ids
            .iter()
            .filter(|id| id.starts_with("binary_sensor."))
            .any(|id| ctx.state_of(id).is_some_and(|s| s.is("on")));
        Ok(if sensor_on { 1.0 } else { 0.0 })
    }
}

// ============================================================================
// TIME OF DAY
// ============================================================================

/// Time of day as a continuous value.
///
/// - Night (22:00-06:00): 0.0-0.2
/// - Morning (06:00-09:00): 0.2-0.4
/// - Day (09:00-17:00): 0.4-0.6
/// - Evening (17:00-22:00): 0.6-0.8
///
/// Weekends delay morning recognition slightly.
pub struct TimeOfDayNeuron;

impl TimeOfDayNeuron {
    const NIGHT_START: f64 = 22.0;
    const NIGHT_END: f64 = 6.0;
    const MORNING_END: f64 = 9.0;
    const DAY_END: f64 = 17.0;

    /// Construct.
    pub fn new() -> Self {
        Self
    }
}

impl Default for TimeOfDayNeuron {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluate for TimeOfDayNeuron {
    fn name(&self) -> &str {
        "time_of_day"
    }

    fn kind(&self) -> NeuronKind {
        NeuronKind::Context
    }

    fn evaluate(&self, ctx: &EvalContext) -> Result<f64, NeuronError> {
        let hour = (ctx.now.hour() as f64 + ctx.now.minute() as f64 / 60.0
            + ctx.utc_offset_hours)
            .rem_euclid(24.0);
        let weekday = chrono::Datelike::weekday(&ctx.now).num_days_from_monday();
        let is_weekend = weekday >= 5;

        let mut value = if hour >= Self::NIGHT_START || hour < Self::NIGHT_END {
            let normalized = if hour >= Self::NIGHT_START {
                (hour - Self::NIGHT_START) / (24.0 - Self::NIGHT_START + Self::NIGHT_END)
            } else {
                (hour + (24.0 - Self::NIGHT_START)) / (24.0 - Self::NIGHT_START + Self::NIGHT_END)
            };
            normalized * 0.2
        } else if hour < Self::MORNING_END {
            0.2 + (hour - Self::NIGHT_END) / (Self::MORNING_END - Self::NIGHT_END) * 0.2
        } else if hour < Self::DAY_END {
            0.4 + (hour - Self::MORNING_END) / (Self::DAY_END - Self::MORNING_END) * 0.2
        } else {
            0.6 + (hour - Self::DAY_END) / (Self::NIGHT_START - Self::DAY_END) * 0.2
        };

        // Mornings start later on weekends
        if is_weekend && (Self::NIGHT_END..Self::NIGHT_END + 2.0).contains(&hour) {
            value = (value - 0.1).max(0.2);
        }

        Ok((value * 1000.0).round() / 1000.0)
    }
}

// ============================================================================
// LIGHT LEVEL
// ============================================================================

/// Ambient light level: 0.0 dark to 1.0 bright.
///
/// Prefers lux sensors; falls back to sun elevation, then to "lights are
/// on, so it is probably dark".
pub struct LightLevelNeuron {
    entity_ids: Vec<String>,
    use_sun_position: bool,
}

impl LightLevelNeuron {
    const DARK_LUX: f64 = 10.0;
    const DIM_LUX: f64 = 100.0;
    const NORMAL_LUX: f64 = 300.0;
    const BRIGHT_LUX: f64 = 1000.0;

    /// Construct over lux/light entities.
    pub fn new(entity_ids: Vec<String>, use_sun_position: bool) -> Self {
        Self {
            entity_ids,
            use_sun_position,
        }
    }

    fn lux_to_value(lux: f64) -> f64 {
        if lux <= Self::DARK_LUX {
            0.0
        } else if lux <= Self::DIM_LUX {
            0.1 + 0.2 * (lux - Self::DARK_LUX) / (Self::DIM_LUX - Self::DARK_LUX)
        } else if lux <= Self::NORMAL_LUX {
            0.3 + 0.3 * (lux - Self::DIM_LUX) / (Self::NORMAL_LUX - Self::DIM_LUX)
        } else if lux <= Self::BRIGHT_LUX {
            0.6 + 0.3 * (lux - Self::NORMAL_LUX) / (Self::BRIGHT_LUX - Self::NORMAL_LUX)
        } else {
            (0.9 + 0.1 * ((lux / Self::BRIGHT_LUX - 1.0).min(1.0))).min(1.0)
        }
    }

    fn elevation_to_value(elevation: f64) -> f64 {
        if elevation < -18.0 {
            0.0
        } else if elevation < -6.0 {
            0.1
        } else if elevation < 0.0 {
            0.2
        } else if elevation < 10.0 {
            0.4
        } else if elevation < 30.0 {
            0.6
        } else {
            0.9
        }
    }
}

impl Evaluate for LightLevelNeuron {
    fn name(&self) -> &str {
        "light_level"
    }

    fn kind(&self) -> NeuronKind {
        NeuronKind::Context
    }

    fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    fn evaluate(&self, ctx: &EvalContext) -> Result<f64, NeuronError> {
        for entity_id in self
            .entity_ids
            .iter()
            .filter(|id| id.contains("illuminance") || id.contains("lux"))
        {
            if let Some(lux) = ctx.state_of(entity_id).and_then(|s| s.numeric()) {
                return Ok(Self::lux_to_value(lux));
            }
        }

        if self.use_sun_position {
            if let Some(elevation) = ctx.sun_elevation {
                return Ok(Self::elevation_to_value(elevation));
            }
        }

        let lights_on = self
            .entity_ids
            .iter()
            .filter(|id| id.starts_with("light."))
            .any(|id| ctx.state_of(id).is_some_and(|s| s.is("on")));
        Ok(if lights_on { 0.3 } else { 0.5 })
    }
}

// ============================================================================
// WEATHER
// ============================================================================

/// Weather quality: 0.0 foul to 1.0 fair.
pub struct WeatherNeuron {
    entity_ids: Vec<String>,
}

impl WeatherNeuron {
    const GOOD: [&'static str; 3] = ["sunny", "clear", "clear-night"];
    const MODERATE: [&'static str; 3] = ["partlycloudy", "cloudy", "fog"];
    const POOR: [&'static str; 5] = ["rainy", "snowy", "lightning", "hail", "windy"];

    /// Construct over weather entities.
    pub fn new(entity_ids: Vec<String>) -> Self {
        Self { entity_ids }
    }
}

impl Evaluate for WeatherNeuron {
    fn name(&self) -> &str {
        "weather"
    }

    fn kind(&self) -> NeuronKind {
        NeuronKind::Context
    }

    fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    fn evaluate(&self, ctx: &EvalContext) -> Result<f64, NeuronError> {
        for entity_id in self.entity_ids.iter().filter(|id| id.starts_with("weather.")) {
            if let Some(state) = ctx.state_of(entity_id) {
                let condition = state.state.to_lowercase();
                if Self::GOOD.contains(&condition.as_str()) {
                    return Ok(0.9);
                }
                if Self::MODERATE.contains(&condition.as_str()) {
                    return Ok(0.5);
                }
                if Self::POOR.contains(&condition.as_str()) {
                    return Ok(0.2);
                }
            }
        }
        Ok(0.5)
    }
}

// ============================================================================
// TESTS
// ============================================================================
