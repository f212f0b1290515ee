//! Per-zone mood tracking
//!
//! Computes Comfort / Joy / Frugality per zone directly from entity
//! states, independent of the neural pipeline's household-level mood.
//! Entities contribute through roles (temperature, humidity, co2, noise,
//! brightness, media, power); roles are inferred from entity ids when a
//! zone is assembled from graph membership.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::EntityState;

// ---------------------------------------------------------------------------
// Comfort thresholds
// ---------------------------------------------------------------------------
const TEMP_OPTIMAL_LOW: f64 = 22.0;
const TEMP_OPTIMAL_HIGH: f64 = 24.0;
const TEMP_MIN: f64 = 18.0;
const TEMP_MAX: f64 = 28.0;

const HUMIDITY_OPTIMAL_LOW: f64 = 40.0;
const HUMIDITY_OPTIMAL_HIGH: f64 = 60.0;
const HUMIDITY_MIN: f64 = 20.0;
const HUMIDITY_MAX: f64 = 80.0;

const CO2_GOOD: f64 = 800.0;
const CO2_BAD: f64 = 1200.0;

const NOISE_GOOD: f64 = 50.0;
const NOISE_BAD: f64 = 80.0;

// Brightness thresholds (time-adaptive, lux)
const BRIGHTNESS_DAY_OPTIMAL: f64 = 400.0;
const BRIGHTNESS_DAY_MAX: f64 = 1000.0;
const BRIGHTNESS_EVENING_OPTIMAL: f64 = 150.0;
const BRIGHTNESS_EVENING_MAX: f64 = 400.0;
const BRIGHTNESS_NIGHT_OPTIMAL: f64 = 5.0;
const BRIGHTNESS_NIGHT_MAX: f64 = 50.0;

// Power thresholds (per zone, watts)
const POWER_LOW: f64 = 50.0;
const POWER_HIGH: f64 = 500.0;

/// A zone mood dimension must move at least this much to count as a
/// change.
const CHANGE_THRESHOLD: f64 = 0.01;

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// What an entity contributes to a zone's mood.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneRole {
    /// Temperature sensor (°C) → comfort
    Temperature,
    /// Humidity sensor (%) → comfort
    Humidity,
    /// CO₂ sensor (ppm) → comfort
    Co2,
    /// Noise sensor (dB) → comfort
    Noise,
    /// Illuminance sensor (lux) → comfort, time-adaptive
    Brightness,
    /// Media player → joy
    Media,
    /// Power sensor (W) → frugality
    Power,
}

/// Infer a role from an entity id, when it carries one.
pub fn infer_role(entity_id: &str) -> Option<ZoneRole> {
    let id = entity_id.to_lowercase();
    if id.starts_with("media_player.") {
        return Some(ZoneRole::Media);
    }
    if id.contains("temperature") || id.contains("temp_") {
        return Some(ZoneRole::Temperature);
    }
    if id.contains("humidity") {
        return Some(ZoneRole::Humidity);
    }
    if id.contains("co2") {
        return Some(ZoneRole::Co2);
    }
    if id.contains("noise") || id.contains("sound_level") {
        return Some(ZoneRole::Noise);
    }
    if id.contains("illuminance") || id.contains("lux") || id.contains("brightness") {
        return Some(ZoneRole::Brightness);
    }
    if id.contains("power") || id.contains("watt") {
        return Some(ZoneRole::Power);
    }
    None
}

/// Role-mapped entities of one zone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneProfile {
    /// Zone node id
    pub zone_id: String,
    /// Role → entity ids
    pub roles: HashMap<ZoneRole, Vec<String>>,
}

impl ZoneProfile {
    /// Empty profile for a zone.
    pub fn new(zone_id: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            roles: HashMap::new(),
        }
    }

    /// Add an entity under an explicit role.
    pub fn add(&mut self, role: ZoneRole, entity_id: impl Into<String>) {
        let entity_id = entity_id.into();
        let entities = self.roles.entry(role).or_default();
        if !entities.contains(&entity_id) {
            entities.push(entity_id);
        }
    }

    /// Add an entity, inferring its role; unclassifiable entities are
    /// ignored.
    pub fn assign(&mut self, entity_id: &str) -> bool {
        match infer_role(entity_id) {
            Some(role) => {
                self.add(role, entity_id);
                true
            }
            None => false,
        }
    }

    fn entities(&self, role: ZoneRole) -> &[String] {
        self.roles.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every entity across all roles.
    pub fn all_entities(&self) -> Vec<&str> {
        self.roles
            .values()
            .flat_map(|v| v.iter().map(String::as_str))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Mood
// ---------------------------------------------------------------------------

/// Mood of one zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneMood {
    /// Environmental comfort, 0..1
    pub comfort: f64,
    /// Liveliness, 0..1
    pub joy: f64,
    /// Energy thrift, 0..1 (low consumption scores high)
    pub frugality: f64,
    /// Last recompute, epoch milliseconds
    pub updated_at_ms: i64,
}

impl ZoneMood {
    fn changed_from(&self, old: &ZoneMood) -> bool {
        (self.comfort - old.comfort).abs() >= CHANGE_THRESHOLD
            || (self.joy - old.joy).abs() >= CHANGE_THRESHOLD
            || (self.frugality - old.frugality).abs() >= CHANGE_THRESHOLD
    }
}

/// Averages across all tracked zones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneMoodSummary {
    /// Zones with a computed mood
    pub zones_tracked: usize,
    /// Mean comfort
    pub average_comfort: f64,
    /// Mean joy
    pub average_joy: f64,
    /// Mean frugality
    pub average_frugality: f64,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn numeric_state(states: &HashMap<String, EntityState>, entity_id: &str) -> Option<f64> {
    let state = states.get(entity_id)?;
    if matches!(state.state.as_str(), "unknown" | "unavailable" | "") {
        return None;
    }
    state.numeric()
}

/// Map a value linearly to 0..1: 1.0 inside `[good_low, good_high]`,
/// 0.0 outside `[bad_low, bad_high]`, linear in between.
fn linear_score(value: f64, good_low: f64, good_high: f64, bad_low: f64, bad_high: f64) -> f64 {
    if (good_low..=good_high).contains(&value) {
        return 1.0;
    }
    if value < good_low {
        if value <= bad_low {
            return 0.0;
        }
        return (value - bad_low) / (good_low - bad_low);
    }
    if value >= bad_high {
        return 0.0;
    }
    (bad_high - value) / (bad_high - good_high)
}

fn avg_or_neutral(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.5
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Brightness expectations per local hour.
fn brightness_bounds(hour: u32) -> (f64, f64) {
    match hour {
        7..=17 => (BRIGHTNESS_DAY_OPTIMAL, BRIGHTNESS_DAY_MAX),
        18..=21 => (BRIGHTNESS_EVENING_OPTIMAL, BRIGHTNESS_EVENING_MAX),
        _ => (BRIGHTNESS_NIGHT_OPTIMAL, BRIGHTNESS_NIGHT_MAX),
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Tracks Comfort/Joy/Frugality per zone from raw entity states.
#[derive(Debug, Default)]
pub struct ZoneMoodEngine {
    profiles: HashMap<String, ZoneProfile>,
    entity_to_zones: HashMap<String, Vec<String>>,
    moods: HashMap<String, ZoneMood>,
}

impl ZoneMoodEngine {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or extend a zone's profile.
    pub fn upsert_profile(&mut self, profile: ZoneProfile) {
        for entity in profile.all_entities() {
            let zones = self.entity_to_zones.entry(entity.to_string()).or_default();
            if !zones.contains(&profile.zone_id) {
                zones.push(profile.zone_id.clone());
            }
        }
        self.profiles.insert(profile.zone_id.clone(), profile);
    }

    /// Assign one entity to a zone, inferring its role. Unclassifiable
    /// entities are ignored and `false` is returned.
    pub fn assign(&mut self, zone_id: &str, entity_id: &str) -> bool {
        let profile = self
            .profiles
            .entry(zone_id.to_string())
            .or_insert_with(|| ZoneProfile::new(zone_id));
        if !profile.assign(entity_id) {
            return false;
        }
        let zones = self.entity_to_zones.entry(entity_id.to_string()).or_default();
        if !zones.contains(&profile.zone_id) {
            zones.push(zone_id.to_string());
        }
        true
    }

    /// Zones whose mood depends on this entity.
    pub fn affected_zones(&self, entity_id: &str) -> &[String] {
        self.entity_to_zones
            .get(entity_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Recompute one zone; returns the new mood when it moved beyond
    /// the change threshold (or was never computed).
    pub fn recompute_zone(
        &mut self,
        zone_id: &str,
        states: &HashMap<String, EntityState>,
        persons_home: usize,
        local_hour: u32,
        now_ms: i64,
    ) -> Option<ZoneMood> {
        let profile = self.profiles.get(zone_id)?;
        let mood = ZoneMood {
            comfort: compute_comfort(profile, states, local_hour),
            joy: compute_joy(profile, states, persons_home),
            frugality: compute_frugality(profile, states),
            updated_at_ms: now_ms,
        };

        let changed = match self.moods.get(zone_id) {
            Some(old) => mood.changed_from(old),
            None => true,
        };
        self.moods.insert(zone_id.to_string(), mood);
        if changed {
            debug!(
                zone = zone_id,
                comfort = mood.comfort,
                joy = mood.joy,
                frugality = mood.frugality,
                "zone mood updated"
            );
            Some(mood)
        } else {
            None
        }
    }

    /// Recompute every zone; returns the ids whose mood changed.
    pub fn recompute_all(
        &mut self,
        states: &HashMap<String, EntityState>,
        persons_home: usize,
        local_hour: u32,
        now_ms: i64,
    ) -> Vec<String> {
        let zone_ids: Vec<String> = self.profiles.keys().cloned().collect();
        zone_ids
            .into_iter()
            .filter(|zone_id| {
                self.recompute_zone(zone_id, states, persons_home, local_hour, now_ms)
                    .is_some()
            })
            .collect()
    }

    /// Current mood of a zone, if computed.
    pub fn zone_mood(&self, zone_id: &str) -> Option<&ZoneMood> {
        self.moods.get(zone_id)
    }

    /// All current zone moods.
    pub fn all_moods(&self) -> &HashMap<String, ZoneMood> {
        &self.moods
    }

    /// Averages across all tracked zones.
    pub fn summary(&self) -> ZoneMoodSummary {
        let moods: Vec<&ZoneMood> = self.moods.values().collect();
        if moods.is_empty() {
            return ZoneMoodSummary {
                zones_tracked: 0,
                average_comfort: 0.5,
                average_joy: 0.5,
                average_frugality: 0.5,
            };
        }
        let comforts: Vec<f64> = moods.iter().map(|m| m.comfort).collect();
        let joys: Vec<f64> = moods.iter().map(|m| m.joy).collect();
        let frugalities: Vec<f64> = moods.iter().map(|m| m.frugality).collect();
        ZoneMoodSummary {
            zones_tracked: moods.len(),
            average_comfort: avg_or_neutral(&comforts),
            average_joy: avg_or_neutral(&joys),
            average_frugality: avg_or_neutral(&frugalities),
        }
    }
}

fn compute_comfort(
    profile: &ZoneProfile,
    states: &HashMap<String, EntityState>,
    local_hour: u32,
) -> f64 {
    let mut scores = Vec::new();

    for entity in profile.entities(ZoneRole::Temperature) {
        if let Some(value) = numeric_state(states, entity) {
            scores.push(linear_score(
                value,
                TEMP_OPTIMAL_LOW,
                TEMP_OPTIMAL_HIGH,
                TEMP_MIN,
                TEMP_MAX,
            ));
        }
    }
    for entity in profile.entities(ZoneRole::Humidity) {
        if let Some(value) = numeric_state(states, entity) {
            scores.push(linear_score(
                value,
                HUMIDITY_OPTIMAL_LOW,
                HUMIDITY_OPTIMAL_HIGH,
                HUMIDITY_MIN,
                HUMIDITY_MAX,
            ));
        }
    }
    for entity in profile.entities(ZoneRole::Co2) {
        if let Some(value) = numeric_state(states, entity) {
            // Lower is better
            scores.push(linear_score(value, 0.0, CO2_GOOD, 0.0, CO2_BAD));
        }
    }
    for entity in profile.entities(ZoneRole::Noise) {
        if let Some(value) = numeric_state(states, entity) {
            scores.push(linear_score(value, 0.0, NOISE_GOOD, 0.0, NOISE_BAD));
        }
    }

    let (bright_opt, bright_max) = brightness_bounds(local_hour);
    for entity in profile.entities(ZoneRole::Brightness) {
        if let Some(value) = numeric_state(states, entity) {
            // Darkness is acceptable; excess brightness is not
            let score = if value <= bright_opt {
                0.7 + 0.3 * (value / bright_opt)
            } else {
                let overshoot = (value - bright_opt) / (bright_max - bright_opt);
                (1.0 - overshoot * 0.7).max(0.3)
            };
            scores.push(score.clamp(0.0, 1.0));
        }
    }

    (avg_or_neutral(&scores) * 1000.0).round() / 1000.0
}

fn compute_joy(
    profile: &ZoneProfile,
    states: &HashMap<String, EntityState>,
    persons_home: usize,
) -> f64 {
    let mut score: f64 = 0.0;

    let playing = profile
        .entities(ZoneRole::Media)
        .iter()
        .filter(|entity| states.get(*entity).is_some_and(|s| s.is("playing")))
        .count();
    if playing > 0 {
        // Each playing media player adds 0.25, capped at 0.6
        score += (playing as f64 * 0.25).min(0.6);
    }

    match persons_home {
        0 => {}
        1 => score += 0.05,
        _ => score += 0.15,
    }

    // Quiet baseline when the zone is instrumented at all
    if score == 0.0 && !profile.all_entities().is_empty() {
        score = 0.1;
    }

    (score.clamp(0.0, 1.0) * 1000.0).round() / 1000.0
}

fn compute_frugality(profile: &ZoneProfile, states: &HashMap<String, EntityState>) -> f64 {
    let power_entities = profile.entities(ZoneRole::Power);
    if power_entities.is_empty() {
        return 0.5;
    }

    let mut total_watts = 0.0;
    let mut valid = 0;
    for entity in power_entities {
        if let Some(value) = numeric_state(states, entity) {
            if value >= 0.0 {
                total_watts += value;
                valid += 1;
            }
        }
    }
    if valid == 0 {
        return 0.5;
    }

    if total_watts <= POWER_LOW {
        1.0
    } else if total_watts >= POWER_HIGH {
        0.0
    } else {
        let score = 1.0 - (total_watts - POWER_LOW) / (POWER_HIGH - POWER_LOW);
        (score * 1000.0).round() / 1000.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
