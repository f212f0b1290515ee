//! Event-stream fixtures
//!
//! Deterministic streams shaped like real households: repeated
//! trigger/response pairs, flapping sensors, zone-tagged activity.

use std::collections::BTreeMap;

use hearth_core::{EvalContext, Evaluate, Event, NeuronError, NeuronKind};

/// Base timestamp for fixtures (well past epoch zero).
pub const BASE_TS: i64 = 1_700_000_000_000;

/// `sessions` repetitions of "A then B `latency_ms` later", sessions
/// separated by `gap_ms`.
pub fn follows(
    a: (&str, &str),
    b: (&str, &str),
    sessions: usize,
    latency_ms: i64,
    gap_ms: i64,
) -> Vec<Event> {
    let mut events = Vec::with_capacity(sessions * 2);
    for i in 0..sessions {
        let t0 = BASE_TS + i as i64 * gap_ms;
        events.push(Event::new(t0, a.0, a.1));
        events.push(Event::new(t0 + latency_ms, b.0, b.1));
    }
    events
}

/// `count` flaps of one key, `period_ms` apart.
pub fn chatter(entity: &str, transition: &str, count: usize, period_ms: i64) -> Vec<Event> {
    (0..count)
        .map(|i| Event::new(BASE_TS + i as i64 * period_ms, entity, transition))
        .collect()
}

/// Tag every event with a zone area context.
pub fn in_zone(events: Vec<Event>, area: &str) -> Vec<Event> {
    events
        .into_iter()
        .map(|event| {
            let mut ctx = BTreeMap::new();
            ctx.insert("area".to_string(), area.to_string());
            event.with_context(ctx)
        })
        .collect()
}

/// A mood neuron that replays a scripted value sequence, cycling.
pub struct ScriptedMood {
    name: String,
    values: Vec<f64>,
    calls: std::sync::atomic::AtomicUsize,
}

impl ScriptedMood {
    /// Script a mood's raw values per tick.
    pub fn new(name: &str, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            values,
            calls: std::sync::atomic::AtomicUsize::new(0),
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
        let call = self
            .calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.values[call % self.values.len()])
    }
}
