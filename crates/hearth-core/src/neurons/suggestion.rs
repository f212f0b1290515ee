//! Suggestion generation
//!
//! Suggestions are the pipeline's user-facing output: value objects tied
//! to the dominant mood, with an action payload a transport collaborator
//! can render or execute. A suggestion is only emitted when the mood
//! value clears [`SUGGESTION_THRESHOLD`]; everything expires after a
//! configurable TTL (default 30 minutes).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::model::EvalContext;

/// Decision boundary: no suggestion below this mood value.
pub const SUGGESTION_THRESHOLD: f64 = 0.5;

/// A generated suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Unique id
    pub id: String,
    /// Mood that produced this suggestion
    pub source_mood: String,
    /// Action category: `light`, `environment`, `automation`, `notification`
    pub action_type: String,
    /// Action payload for the executing collaborator
    pub action_data: Map<String, Value>,
    /// Importance in [0, 1]
    pub priority: f64,
    /// Confidence in [0, 1] (the mood value)
    pub confidence: f64,
    /// Why this was suggested
    pub reasoning: String,
    /// Creation time, epoch milliseconds
    pub created_at_ms: i64,
    /// Expiry time, epoch milliseconds
    pub expires_at_ms: i64,
}

impl Suggestion {
    /// Whether the suggestion is still live at `now_ms`.
    pub fn is_active(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms
    }
}

/// Generate the suggestion for a dominant mood, if any.
///
/// The mapping follows the built-in table: relax dims bright rooms,
/// focus boosts light and mutes media, sleep and away shut things down,
/// alert notifies. Social and recovery carry no automatic action.
pub fn suggest_for_mood(
    mood: &str,
    value: f64,
    ctx: &EvalContext,
    now_ms: i64,
    ttl_min: i64,
) -> Option<Suggestion> {
    if value < SUGGESTION_THRESHOLD {
        return None;
    }

    let light_level = ctx.context_values.get("light_level").copied().unwrap_or(0.5);
    let expires_at_ms = now_ms + ttl_min * 60_000;
    let base = |action_type: &str, action_data: Map<String, Value>, priority: f64, reasoning: String| {
        Suggestion {
            id: format!("sugg_{}", Uuid::new_v4()),
            source_mood: mood.to_string(),
            action_type: action_type.to_string(),
            action_data,
            priority: priority.clamp(0.0, 1.0),
            confidence: value,
            reasoning,
            created_at_ms: now_ms,
            expires_at_ms,
        }
    };

    match mood {
        "relax" => {
            // Only worth dimming when the room is actually bright
            if light_level <= 0.6 {
                return None;
            }
            Some(base(
                "light",
                object(&[
                    ("action", json!("dim_lights")),
                    ("brightness_pct", json!(30)),
                ]),
                0.6 * value,
                format!(
                    "Relaxed state detected ({:.0}% confidence); dimming for ambiance",
                    value * 100.0
                ),
            ))
        }
        "focus" => Some(base(
            "environment",
            object(&[
                ("action", json!("optimize_for_focus")),
                ("brightness_pct", json!(80)),
                ("media_volume", json!(0.2)),
            ]),
            0.7 * value,
            format!(
                "Focus state detected ({:.0}% confidence); boosting light, lowering media",
                value * 100.0
            ),
        )),
        "sleep" => Some(base(
            "light",
            object(&[
                ("action", json!("night_mode")),
                ("lights_off", json!(true)),
                ("media_off", json!(true)),
            ]),
            0.8 * value,
            format!("Sleep state detected ({:.0}% confidence); preparing for rest", value * 100.0),
        )),
        "away" => Some(base(
            "automation",
            object(&[
                ("action", json!("away_mode")),
                ("lights_off", json!(true)),
                ("climate_eco", json!(true)),
            ]),
            0.7 * value,
            format!(
                "Nobody home ({:.0}% confidence); switching to eco mode",
                value * 100.0
            ),
        )),
        "alert" => Some(base(
            "notification",
            object(&[("action", json!("alert_user")), ("priority", json!("high"))]),
            0.9 * value,
            format!(
                "Alert state detected ({:.0}% confidence); attention may be needed",
                value * 100.0
            ),
        )),
        "active" => Some(base(
            "environment",
            object(&[
                ("action", json!("boost_energy")),
                ("brightness_pct", json!(100)),
            ]),
            0.5 * value,
            format!("Active state detected ({:.0}% confidence); brightening", value * 100.0),
        )),
        // social and recovery have no automatic actions
        _ => None,
    }
}

fn object(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

// ============================================================================
// QUEUE
// ============================================================================

/// Bounded holding area for live suggestions.
#[derive(Debug, Default)]
pub struct SuggestionQueue {
    suggestions: Vec<Suggestion>,
}

impl SuggestionQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a suggestion.
    pub fn push(&mut self, suggestion: Suggestion) {
        self.suggestions.push(suggestion);
    }

    /// Live suggestions at `now_ms`, newest first.
    pub fn active(&self, now_ms: i64) -> Vec<&Suggestion> {
        let mut live: Vec<&Suggestion> = self
            .suggestions
            .iter()
            .filter(|s| s.is_active(now_ms))
            .collect();
        live.sort_by_key(|s| std::cmp::Reverse(s.created_at_ms));
        live
    }

    /// Find a suggestion by id.
    pub fn get(&self, id: &str) -> Option<&Suggestion> {
        self.suggestions.iter().find(|s| s.id == id)
    }

    /// Drop expired suggestions, returning how many were removed.
    pub fn sweep(&mut self, now_ms: i64) -> usize {
        let before = self.suggestions.len();
        self.suggestions.retain(|s| s.is_active(now_ms));
        before - self.suggestions.len()
    }

    /// Total retained (live and not yet swept).
    pub fn len(&self) -> usize {
        self.suggestions.len()
    }

    /// Whether the queue holds nothing.
    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty()
    }
}
