//! Engine - composition root
//!
//! Wires the subsystems together in their required initialization order
//! (graph store → neuron manager → candidate store → miner → dispatcher)
//! and owns the data paths between them: event ingress folds into the
//! graph and the neuron states, ticks drive moods and suggestions, mining
//! runs turn rules into candidates and graph edges, and user feedback
//! flows back into the synapse network. Teardown runs in reverse under
//! cancellation.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::candidates::{
    Candidate, CandidateError, CandidateState, CandidateStore, CreateOutcome, Decision,
};
use crate::cancel::CancelToken;
use crate::config::{ConfigError, CoreConfig};
use crate::dispatch::{CoreEvent, Dispatcher, Subscription};
use crate::error::{CoreError, ErrorKind};
use crate::event::{Event, EventError, EventIngress, IngressOutcome};
use crate::graph::{
    EdgeType, GetNodesPage, GetStateFilters, GetStateResult, GraphApi, GraphEdge, GraphNode,
    GraphStore, NodeKind, NodeSort, PatternSummary, Provenance, PruneReport, SortOrder,
    StorageError, StoreStats,
};
use crate::miner::{
    HabitusMiner, MinerError, MiningReport, MiningStatus, Rule, RulesFilter, TopSuggestion,
    ZoneMiner, ZoneMiningResult,
};
use crate::neurons::{
    NeuronManager, SuggestionQueue, TickResult, ZoneMood, ZoneMoodEngine, ZoneMoodSummary,
};
use crate::synapses::{SynapseError, SynapseManager};

/// Discovery method recorded on globally mined candidates.
const DISCOVERY_HABITUS: &str = "habitus";
/// Discovery method recorded on zone-scoped candidates.
const DISCOVERY_HABITUS_ZONE: &str = "habitus_zone";

/// Whether a person state string counts as present somewhere.
fn is_present(state: &str) -> bool {
    !matches!(state, "not_home" | "away" | "unknown" | "")
}

// ============================================================================
// ERRORS
// ============================================================================

/// Engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Graph store failure
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Miner failure
    #[error(transparent)]
    Miner(#[from] MinerError),
    /// Candidate store failure
    #[error(transparent)]
    Candidate(#[from] CandidateError),
    /// Synapse store failure
    #[error(transparent)]
    Synapse(#[from] SynapseError),
    /// Event validation failure
    #[error(transparent)]
    Event(#[from] EventError),
}

impl CoreError for EngineError {
    fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Config(e) => e.kind(),
            EngineError::Storage(e) => e.kind(),
            EngineError::Miner(e) => e.kind(),
            EngineError::Candidate(e) => e.kind(),
            EngineError::Synapse(e) => e.kind(),
            EngineError::Event(e) => e.kind(),
        }
    }
}

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

// ============================================================================
// REPORTS
// ============================================================================

/// Result of a mine-and-create-candidates pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MineOutcome {
    /// The underlying mining report (status, counters)
    pub report: MiningReport,
    /// Candidates created this pass
    pub candidates_created: usize,
    /// Patterns skipped because a decision already exists
    pub already_decided: usize,
    /// Zone rules withheld by safety governance
    pub safety_blocked: usize,
}

// ============================================================================
// ENGINE
// ============================================================================

/// The core inference pipeline, fully wired.
pub struct Engine {
    config: CoreConfig,
    graph: Arc<GraphStore>,
    neurons: NeuronManager,
    candidates: CandidateStore,
    miner: HabitusMiner,
    zone_miner: ZoneMiner,
    synapses: SynapseManager,
    dispatcher: Arc<Dispatcher>,
    ingress: EventIngress,
    suggestions: SuggestionQueue,
    zone_moods: ZoneMoodEngine,
    person_states: std::collections::HashMap<String, String>,
    cancel: CancelToken,
}

impl Engine {
    /// Build the engine from configuration.
    ///
    /// Components come up in the required order: graph store, neuron
    /// manager, candidate store, miner, dispatcher.
    pub fn open(config: CoreConfig) -> Result<Self> {
        let data_dir = config.resolve_data_dir()?;

        let graph = Arc::new(GraphStore::open(
            &data_dir.join("brain_graph.db"),
            config.graph.clone(),
        )?);

        let mut neurons = NeuronManager::with_defaults(config.neurons.clone());
        neurons.set_utc_offset_hours(config.utc_offset_hours);

        let mut candidates = CandidateStore::open(&data_dir.join("candidates.json"))?;

        let miner = HabitusMiner::open(&data_dir.join("miner"), config.miner.clone())?;
        let zone_miner = ZoneMiner::new(config.miner.clone());

        let mut synapses =
            SynapseManager::open(&data_dir.join("synapses.json"), config.synapses.clone())?;
        synapses.ensure_default_wiring(
            &["relax", "focus", "active", "sleep", "away", "alert", "social", "recovery"],
            Utc::now().timestamp_millis(),
        );

        let dispatcher = Arc::new(Dispatcher::new(config.dispatch.queue_capacity));
        candidates.set_dispatcher(Arc::clone(&dispatcher));

        let ingress = EventIngress::new(
            config.events.replay_capacity,
            config.events.debounce_keys,
            config.events.monotonic_tolerance_ms,
        );

        info!(data_dir = %data_dir.display(), "engine initialized");
        Ok(Self {
            config,
            graph,
            neurons,
            candidates,
            miner,
            zone_miner,
            synapses,
            dispatcher,
            ingress,
            suggestions: SuggestionQueue::new(),
            zone_moods: ZoneMoodEngine::new(),
            person_states: std::collections::HashMap::new(),
            cancel: CancelToken::new(),
        })
    }

    /// The engine-wide cancellation token. Cancelling it makes every
    /// in-flight long operation return promptly.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Subscribe to the internal event bus.
    pub fn subscribe(&self, name: impl Into<String>) -> Subscription {
        self.dispatcher.subscribe(name)
    }

    /// The active configuration.
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Event ingress
    // ------------------------------------------------------------------

    /// Ingest one normalized event.
    ///
    /// Validates, buffers for the miner, folds the entity (and its zone,
    /// when the context names one) into the graph, updates the neuron
    /// states, and publishes `StateChanged`.
    pub fn ingest(&mut self, event: Event) -> Result<IngressOutcome> {
        let outcome = self.ingress.ingest(event.clone())?;
        if outcome == IngressOutcome::Duplicate {
            return Ok(outcome);
        }

        self.fold_into_graph(&event)?;
        self.neurons.apply_event(&event);
        if event.domain == "person" {
            self.track_presence(&event);
        }
        self.refresh_zone_moods(&event);
        self.dispatcher.publish(CoreEvent::StateChanged { event });
        Ok(outcome)
    }

    /// Recompute the mood of every zone this entity contributes to.
    fn refresh_zone_moods(&mut self, event: &Event) {
        if let Some(area) = event
            .context
            .as_ref()
            .and_then(|c| c.get("area").or_else(|| c.get("zone")))
        {
            self.zone_moods
                .assign(&format!("zone:{area}"), &event.entity_id);
        }

        let affected: Vec<String> = self.zone_moods.affected_zones(&event.entity_id).to_vec();
        if affected.is_empty() {
            return;
        }

        let persons_home = self
            .person_states
            .values()
            .filter(|state| is_present(state))
            .count();
        let local_hour = chrono::DateTime::from_timestamp_millis(event.ts_ms)
            .map(|dt| {
                let utc_hour = chrono::Timelike::hour(&dt) as f64;
                (utc_hour + self.config.utc_offset_hours).rem_euclid(24.0) as u32
            })
            .unwrap_or(12);

        for zone_id in affected {
            let changed = self.zone_moods.recompute_zone(
                &zone_id,
                self.neurons.entity_states(),
                persons_home,
                local_hour,
                event.ts_ms,
            );
            if let Some(mood) = changed {
                self.dispatcher.publish(CoreEvent::ZoneMoodUpdated {
                    zone_id,
                    comfort: mood.comfort,
                    joy: mood.joy,
                    frugality: mood.frugality,
                });
            }
        }
    }

    /// Person transitions become zone and presence events.
    ///
    /// `home` and zone names count as present; `not_home`/`away` count
    /// as absent.
    fn track_presence(&mut self, event: &Event) {
        let previous = self
            .person_states
            .insert(event.entity_id.clone(), event.transition.clone());

        let was_present = previous.as_deref().is_some_and(is_present);
        let is_now_present = is_present(&event.transition);
        let zone_changed = previous.as_deref() != Some(event.transition.as_str());

        if was_present && zone_changed {
            // previous is Some by construction here
            if let Some(prev_zone) = &previous {
                self.dispatcher.publish(CoreEvent::ZoneLeft {
                    person_id: event.entity_id.clone(),
                    zone_id: format!("zone:{prev_zone}"),
                });
            }
        }
        if is_now_present && zone_changed {
            self.dispatcher.publish(CoreEvent::ZoneEntered {
                person_id: event.entity_id.clone(),
                zone_id: format!("zone:{}", event.transition),
            });
        }

        if was_present != is_now_present {
            let total_home = self
                .person_states
                .values()
                .filter(|state| is_present(state))
                .count() as u32;
            self.dispatcher
                .publish(CoreEvent::PresenceChanged { total_home });
        }
    }

    /// Upsert the entity node (recency-bumped score) and its zone edge.
    fn fold_into_graph(&self, event: &Event) -> Result<()> {
        let now_ms = event.ts_ms;
        let score = match self.graph.get_node(&event.entity_id)? {
            Some(existing) => {
                existing.effective_score(now_ms, self.config.graph.node_half_life_h) + 1.0
            }
            None => 1.0,
        };
        let node = GraphNode::new(&event.entity_id, NodeKind::Entity, &event.entity_id, now_ms, score)
            .with_domain(&event.domain)
            .with_source(Provenance::new("ingress", "state_changed", "observed transition"));
        self.graph.upsert_node(&node)?;

        if let Some(area) = event
            .context
            .as_ref()
            .and_then(|c| c.get("area").or_else(|| c.get("zone")))
        {
            let zone_id = format!("zone:{area}");
            let zone =
                GraphNode::new(&zone_id, NodeKind::Zone, area.as_str(), now_ms, 1.0);
            self.graph.upsert_node(&zone)?;
            let edge = GraphEdge::new(&event.entity_id, EdgeType::InZone, &zone_id, now_ms, 1.0)
                .with_evidence(Provenance::new("ingress", "area", "entity context"));
            self.graph.upsert_edge(&edge)?;
        }
        Ok(())
    }

    /// Events currently buffered for replay.
    pub fn buffered_events(&self) -> usize {
        self.ingress.buffered()
    }

    /// Persist the replay buffer through the miner's event cache so a
    /// later process can mine these events.
    pub fn persist_replay(&mut self) -> Result<()> {
        let events = self.ingress.replay();
        Ok(self.miner.cache_events(&events)?)
    }

    /// The replay buffer, falling back to the miner's persisted cache
    /// when this process has not observed events itself.
    fn replay_or_cached(&self) -> Vec<Event> {
        let events = self.ingress.replay();
        if !events.is_empty() {
            return events;
        }
        match self.miner.cached_events() {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "failed to load cached events");
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // Ticks
    // ------------------------------------------------------------------

    /// Run one neural pipeline tick.
    ///
    /// Publishes `MoodChanged` on transitions and `SuggestionCreated` for
    /// every emitted suggestion; sweeps expired suggestions afterwards.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickResult {
        let result = self.neurons.tick(now);

        if result.mood_changed {
            self.dispatcher.publish(CoreEvent::MoodChanged {
                mood: result.dominant_mood.clone(),
                confidence: result.mood_confidence,
                timestamp: now,
            });
        }

        for suggestion in &result.suggestions {
            self.synapses.propagate(
                &format!("mood.{}", suggestion.source_mood),
                suggestion.confidence,
                result.timestamp_ms,
            );
            self.suggestions.push(suggestion.clone());
            self.dispatcher.publish(CoreEvent::SuggestionCreated {
                suggestion: suggestion.clone(),
            });
        }

        let swept = self.suggestions.sweep(result.timestamp_ms);
        if swept > 0 {
            debug!(swept, "expired suggestions removed");
        }
        result
    }

    /// Entity state updates outside the event stream (bulk refresh).
    pub fn update_entity_states(
        &mut self,
        states: std::collections::HashMap<String, crate::neurons::EntityState>,
    ) {
        self.neurons.update_states(states);
    }

    /// Live suggestions at `now_ms`.
    pub fn active_suggestions(&self, now_ms: i64) -> Vec<crate::neurons::Suggestion> {
        self.suggestions
            .active(now_ms)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Apply user feedback on a suggestion: Hebbian adjustment of the
    /// synapses feeding its source mood.
    pub fn suggestion_feedback(&mut self, suggestion_id: &str, accepted: bool) -> Result<usize> {
        let Some(suggestion) = self.suggestions.get(suggestion_id) else {
            warn!(suggestion_id, "feedback for unknown suggestion ignored");
            return Ok(0);
        };
        let mood = suggestion.source_mood.clone();
        Ok(self.synapses.apply_feedback(&mood, accepted)?)
    }

    // ------------------------------------------------------------------
    // Mining
    // ------------------------------------------------------------------

    /// Run mining over the replay buffer and convert kept rules into
    /// candidates.
    ///
    /// `zone` restricts the run to entities with an `in_zone` edge to
    /// that zone and applies zone governance; safety-blocked rules never
    /// become candidates. Runs inside the throttle window return a
    /// `Skipped` report unless `force` is set.
    pub fn mine_and_create_candidates(
        &mut self,
        now_ms: i64,
        force: bool,
        zone: Option<&str>,
    ) -> Result<MineOutcome> {
        // Throttle before touching the (potentially large) replay buffer
        if !force {
            if let Some(retry_in_sec) = self.miner.throttle_remaining(now_ms) {
                return Ok(MineOutcome {
                    report: MiningReport {
                        status: MiningStatus::Skipped,
                        rules: self.miner.rules(&RulesFilter::default()).len(),
                        stats: None,
                        retry_in_sec: Some(retry_in_sec),
                    },
                    candidates_created: 0,
                    already_decided: 0,
                    safety_blocked: 0,
                });
            }
        }

        let events = self.replay_or_cached();

        match zone {
            None => {
                let report = self.miner.mine(&events, now_ms, true, &self.cancel)?;
                let rules = self.miner.rules(&RulesFilter::default());
                let (created, decided) =
                    self.adopt_rules(&rules, DISCOVERY_HABITUS, now_ms)?;
                Ok(MineOutcome {
                    report,
                    candidates_created: created,
                    already_decided: decided,
                    safety_blocked: 0,
                })
            }
            Some(zone_id) => {
                let members: HashSet<String> =
                    self.graph.zone_members(zone_id)?.into_iter().collect();
                let result =
                    self.zone_miner
                        .mine_zone(&events, zone_id, &members, now_ms, &self.cancel)?;
                self.miner.mark_run(now_ms)?;

                let (created, decided) =
                    self.adopt_rules(&result.filtered_rules, DISCOVERY_HABITUS_ZONE, now_ms)?;
                Ok(MineOutcome {
                    report: MiningReport {
                        status: MiningStatus::Completed,
                        rules: result.filtered_rules.len(),
                        stats: None,
                        retry_in_sec: None,
                    },
                    candidates_created: created,
                    already_decided: decided,
                    safety_blocked: result.safety_blocked.len(),
                })
            }
        }
    }

    /// Publish rules, fold them into the graph, and offer them to the
    /// candidate store.
    fn adopt_rules(
        &mut self,
        rules: &[Rule],
        discovery_method: &str,
        now_ms: i64,
    ) -> Result<(usize, usize)> {
        let mut created = 0;
        let mut already_decided = 0;
        for rule in rules {
            self.dispatcher
                .publish(CoreEvent::RuleDiscovered { rule: rule.clone() });
            if let Err(e) = self.fold_rule_into_graph(rule, now_ms) {
                warn!(error = %e, "failed to fold rule into graph");
            }
            match self
                .candidates
                .create_from_rule(rule, discovery_method, now_ms)?
            {
                CreateOutcome::Created(_) => created += 1,
                CreateOutcome::AlreadyDecided { .. } => already_decided += 1,
                CreateOutcome::AlreadyPending { .. } => {}
            }
        }
        Ok((created, already_decided))
    }

    /// A mined rule becomes a `triggered_by` edge (consequent →
    /// antecedent) weighted by its confidence.
    fn fold_rule_into_graph(&self, rule: &Rule, now_ms: i64) -> Result<()> {
        for entity in [rule.a_entity(), rule.b_entity()] {
            if self.graph.get_node(entity)?.is_none() {
                let node = GraphNode::new(entity, NodeKind::Entity, entity, now_ms, 1.0)
                    .with_domain(crate::event::domain_of(entity));
                self.graph.upsert_node(&node)?;
            }
        }
        let edge = GraphEdge::new(
            rule.b_entity(),
            EdgeType::TriggeredBy,
            rule.a_entity(),
            now_ms,
            rule.confidence,
        )
        .with_evidence(Provenance::new(
            "miner",
            rule.pattern_id(),
            format!("{} → {}", rule.a, rule.b),
        ));
        self.graph.upsert_edge(&edge)?;
        Ok(())
    }

    /// Zone mining across every zone node in the graph, without
    /// candidate conversion (inspection/export path).
    pub fn mine_all_zones(&mut self, now_ms: i64) -> Result<Vec<ZoneMiningResult>> {
        let events = self.replay_or_cached();
        let mut results = Vec::new();
        for zone_id in self.graph.zone_ids()? {
            let members: HashSet<String> =
                self.graph.zone_members(&zone_id)?.into_iter().collect();
            results.push(self.zone_miner.mine_zone(
                &events,
                &zone_id,
                &members,
                now_ms,
                &self.cancel,
            )?);
        }
        Ok(results)
    }

    /// Mine every zone and export the best governance-passing rules,
    /// each tagged with its zone's confirmation requirement.
    pub fn top_zone_suggestions(
        &mut self,
        now_ms: i64,
        limit: usize,
    ) -> Result<Vec<TopSuggestion>> {
        let results = self.mine_all_zones(now_ms)?;
        let by_zone: std::collections::HashMap<String, ZoneMiningResult> = results
            .into_iter()
            .map(|result| (result.zone_id.clone(), result))
            .collect();
        Ok(self.zone_miner.top_suggestions(&by_zone, limit))
    }

    /// Read access to the miner (rules, summaries, explanations).
    pub fn miner(&self) -> &HabitusMiner {
        &self.miner
    }

    /// Install governance for a zone's mining runs.
    pub fn set_zone_governance(
        &mut self,
        zone_id: impl Into<String>,
        governance: crate::miner::ZoneGovernance,
    ) {
        self.zone_miner.set_zone_governance(zone_id, governance);
    }

    // ------------------------------------------------------------------
    // Candidates
    // ------------------------------------------------------------------

    /// List candidates, optionally by state.
    pub fn list_candidates(&self, state: Option<CandidateState>) -> Vec<Candidate> {
        self.candidates.list(state)
    }

    /// Apply a user decision to a candidate.
    pub fn decide_candidate(
        &mut self,
        candidate_id: &str,
        decision: Decision,
        reason: Option<String>,
        now_ms: i64,
    ) -> Result<Candidate> {
        Ok(self
            .candidates
            .decide(candidate_id, decision, reason, now_ms)?)
    }

    // ------------------------------------------------------------------
    // Graph queries
    // ------------------------------------------------------------------

    /// Filtered graph snapshot (§6.2 `GetState`).
    pub fn get_state(&self, filters: &GetStateFilters, now_ms: i64) -> Result<GetStateResult> {
        Ok(GraphApi::new(&self.graph).get_state(filters, now_ms, &self.cancel)?)
    }

    /// Paged node listing (§6.2 `GetNodes`).
    pub fn get_nodes_page(
        &self,
        page: usize,
        per_page: usize,
        sort: NodeSort,
        order: SortOrder,
    ) -> Result<GetNodesPage> {
        Ok(GraphApi::new(&self.graph).get_nodes_page(page, per_page, sort, order)?)
    }

    /// Graph statistics.
    pub fn graph_stats(&self) -> Result<StoreStats> {
        Ok(self.graph.stats()?)
    }

    /// Prune the graph now.
    pub fn prune_graph(&self, now_ms: i64) -> Result<PruneReport> {
        Ok(self.graph.prune(now_ms, &self.cancel)?)
    }

    /// Top mined patterns (§6.2 `Patterns`), at most 20.
    pub fn patterns(&self, limit: usize) -> Vec<PatternSummary> {
        let rules = self.miner.rules(&RulesFilter::default());
        GraphApi::patterns(&rules, limit)
    }

    /// Synapse network statistics.
    pub fn synapse_stats(&self) -> crate::synapses::SynapseStats {
        self.synapses.stats()
    }

    // ------------------------------------------------------------------
    // Zone moods
    // ------------------------------------------------------------------

    /// Current mood of one zone, if any of its entities reported yet.
    pub fn zone_mood(&self, zone_id: &str) -> Option<ZoneMood> {
        self.zone_moods.zone_mood(zone_id).copied()
    }

    /// All current zone moods.
    pub fn zone_moods(&self) -> std::collections::HashMap<String, ZoneMood> {
        self.zone_moods.all_moods().clone()
    }

    /// Averages across tracked zones.
    pub fn zone_mood_summary(&self) -> ZoneMoodSummary {
        self.zone_moods.summary()
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Shut the engine down: cancel in-flight work, decay and persist
    /// the synapse network. Components unwind in reverse of their
    /// initialization order when the engine drops.
    pub fn shutdown(&mut self) -> Result<()> {
        self.cancel.cancel();
        let now_ms = Utc::now().timestamp_millis();
        self.synapses.apply_decay(now_ms);
        self.synapses.sweep_pruned();
        self.synapses.save()?;
        info!("engine shut down");
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::MiningConfig;

    fn engine() -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig {
            data_dir: Some(dir.path().to_path_buf()),
            miner: MiningConfig {
                min_support_a: 2,
                min_support_b: 2,
                min_hits: 2,
                min_confidence: 0.3,
                min_confidence_lb: 0.0,
                min_lift: 0.5,
                min_leverage: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let engine = Engine::open(config).unwrap();
        (dir, engine)
    }

    fn feed_pattern(engine: &mut Engine) {
        for i in 0..10i64 {
            engine
                .ingest(Event::new(1_000_000 + i * 60_000, "light.kitchen", "on"))
                .unwrap();
            engine
                .ingest(Event::new(1_000_000 + i * 60_000 + 5_000, "switch.fan", "on"))
                .unwrap();
        }
    }

    #[test]
    fn test_ingest_folds_entities_and_zones() {
        let (_dir, mut engine) = engine();
        let mut ctx = std::collections::BTreeMap::new();
        ctx.insert("area".to_string(), "kitchen".to_string());
        engine
            .ingest(Event::new(1_000, "light.kitchen", "on").with_context(ctx))
            .unwrap();

        let stats = engine.graph_stats().unwrap();
        assert_eq!(stats.nodes, 2); // entity + zone
        assert_eq!(stats.edges, 1); // in_zone
        let state = engine
            .get_state(&GetStateFilters::default(), 1_000)
            .unwrap();
        assert!(state.nodes.iter().any(|n| n.id == "zone:kitchen"));
    }

    #[test]
    fn test_ingest_publishes_state_changed() {
        let (_dir, mut engine) = engine();
        let sub = engine.subscribe("test");
        engine.ingest(Event::new(1_000, "light.kitchen", "on")).unwrap();
        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tag(), "state_changed");
    }

    #[test]
    fn test_invalid_event_rejected() {
        let (_dir, mut engine) = engine();
        let err = engine.ingest(Event::new(1_000, "", "on")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_mine_creates_candidates_and_edges() {
        let (_dir, mut engine) = engine();
        feed_pattern(&mut engine);
        let sub = engine.subscribe("test");

        let outcome = engine
            .mine_and_create_candidates(2_000_000, true, None)
            .unwrap();
        assert_eq!(outcome.report.status, MiningStatus::Completed);
        assert!(outcome.candidates_created > 0);

        let pending = engine.list_candidates(Some(CandidateState::Pending));
        assert_eq!(pending.len(), outcome.candidates_created);

        // Rule edges landed in the graph
        let state = engine
            .get_state(&GetStateFilters::default(), 2_000_000)
            .unwrap();
        assert!(
            state
                .edges
                .iter()
                .any(|e| e.edge_type == EdgeType::TriggeredBy)
        );

        let tags: Vec<&str> = sub.drain().iter().map(|e| e.tag()).collect();
        assert!(tags.contains(&"rule_discovered"));
        assert!(tags.contains(&"candidate_created"));
    }

    #[test]
    fn test_mining_throttle_and_force() {
        let (_dir, mut engine) = engine();
        feed_pattern(&mut engine);
        engine
            .mine_and_create_candidates(2_000_000, true, None)
            .unwrap();

        let skipped = engine
            .mine_and_create_candidates(2_000_500, false, None)
            .unwrap();
        assert_eq!(skipped.report.status, MiningStatus::Skipped);
        assert!(skipped.report.retry_in_sec.is_some());

        let forced = engine
            .mine_and_create_candidates(2_001_000, true, None)
            .unwrap();
        assert_eq!(forced.report.status, MiningStatus::Completed);
    }

    #[test]
    fn test_dismissed_patterns_not_recreated_by_next_run() {
        // S5 at the engine level
        let (_dir, mut engine) = engine();
        feed_pattern(&mut engine);
        let outcome = engine
            .mine_and_create_candidates(2_000_000, true, None)
            .unwrap();
        assert!(outcome.candidates_created > 0);

        for candidate in engine.list_candidates(Some(CandidateState::Pending)) {
            engine
                .decide_candidate(&candidate.candidate_id, Decision::Dismissed, None, 2_100_000)
                .unwrap();
        }

        let rerun = engine
            .mine_and_create_candidates(9_000_000, true, None)
            .unwrap();
        assert_eq!(rerun.candidates_created, 0);
        assert!(rerun.already_decided > 0);
        assert!(engine.list_candidates(Some(CandidateState::Pending)).is_empty());
    }

    #[test]
    fn test_zone_scoped_mining_path() {
        let (_dir, mut engine) = engine();
        // Zone membership arrives through event context
        for i in 0..10i64 {
            let mut ctx = std::collections::BTreeMap::new();
            ctx.insert("area".to_string(), "kitchen".to_string());
            engine
                .ingest(
                    Event::new(1_000_000 + i * 60_000, "light.kitchen", "on")
                        .with_context(ctx.clone()),
                )
                .unwrap();
            engine
                .ingest(
                    Event::new(1_000_000 + i * 60_000 + 5_000, "switch.fan", "on")
                        .with_context(ctx),
                )
                .unwrap();
        }
        // Loosen zone governance so the relaxed thresholds pass
        engine.zone_miner.set_zone_governance(
            "zone:kitchen",
            crate::miner::ZoneGovernance {
                min_events: 2,
                confidence_threshold: 0.3,
                lift_threshold: 0.5,
                ..Default::default()
            },
        );

        let outcome = engine
            .mine_and_create_candidates(2_000_000, true, Some("zone:kitchen"))
            .unwrap();
        assert_eq!(outcome.report.status, MiningStatus::Completed);
        assert!(outcome.candidates_created > 0);
        let candidates = engine.list_candidates(None);
        assert!(
            candidates
                .iter()
                .all(|c| c.metadata.discovery_method == "habitus_zone")
        );
        assert!(
            candidates
                .iter()
                .all(|c| c.metadata.zone_filter.as_deref() == Some("zone:kitchen"))
        );
    }

    #[test]
    fn test_top_zone_suggestions_carry_confirmation_flag() {
        let (_dir, mut engine) = engine();
        for i in 0..10i64 {
            let mut ctx = std::collections::BTreeMap::new();
            ctx.insert("area".to_string(), "kitchen".to_string());
            engine
                .ingest(
                    Event::new(1_000_000 + i * 60_000, "light.kitchen", "on")
                        .with_context(ctx.clone()),
                )
                .unwrap();
            engine
                .ingest(
                    Event::new(1_000_000 + i * 60_000 + 5_000, "switch.fan", "on")
                        .with_context(ctx),
                )
                .unwrap();
        }
        engine.set_zone_governance(
            "zone:kitchen",
            crate::miner::ZoneGovernance {
                min_events: 2,
                confidence_threshold: 0.3,
                lift_threshold: 0.5,
                ..Default::default()
            },
        );

        let suggestions = engine.top_zone_suggestions(2_000_000, 10).unwrap();
        assert!(!suggestions.is_empty());
        for suggestion in &suggestions {
            assert_eq!(suggestion.rule.zone.as_deref(), Some("zone:kitchen"));
            // Default governance keeps the confirmation requirement
            assert!(suggestion.requires_confirmation);
        }
    }

    #[test]
    fn test_zone_mining_unknown_zone_yields_nothing() {
        let (_dir, mut engine) = engine();
        feed_pattern(&mut engine);
        let outcome = engine
            .mine_and_create_candidates(2_000_000, true, Some("zone:attic"))
            .unwrap();
        assert_eq!(outcome.candidates_created, 0);
        assert_eq!(outcome.report.rules, 0);
    }

    #[test]
    fn test_tick_publishes_and_queues() {
        let (_dir, mut engine) = engine();
        let result = engine.tick(Utc::now());
        assert!(!result.dominant_mood.is_empty());
        // Neutral states rarely produce suggestions; the tick must
        // nonetheless complete and queue whatever it produced
        assert_eq!(
            engine
                .active_suggestions(result.timestamp_ms)
                .len(),
            result.suggestions.len()
        );
    }

    #[test]
    fn test_patterns_view() {
        let (_dir, mut engine) = engine();
        feed_pattern(&mut engine);
        engine
            .mine_and_create_candidates(2_000_000, true, None)
            .unwrap();
        let patterns = engine.patterns(20);
        assert!(!patterns.is_empty());
        assert!(patterns.len() <= 20);
        assert!(patterns.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_zone_moods_track_sensor_entities() {
        let (_dir, mut engine) = engine();
        let sub = engine.subscribe("moods");

        let mut ctx = std::collections::BTreeMap::new();
        ctx.insert("area".to_string(), "kitchen".to_string());
        engine
            .ingest(
                Event::new(1_000, "sensor.kitchen_temperature", "23").with_context(ctx.clone()),
            )
            .unwrap();

        let mood = engine.zone_mood("zone:kitchen").expect("zone mood computed");
        assert_eq!(mood.comfort, 1.0);
        assert!(
            sub.drain()
                .iter()
                .any(|e| e.tag() == "zone_mood_updated")
        );

        // A harsh reading moves comfort and fires again
        engine
            .ingest(Event::new(2_000, "sensor.kitchen_temperature", "30").with_context(ctx))
            .unwrap();
        let mood = engine.zone_mood("zone:kitchen").unwrap();
        assert_eq!(mood.comfort, 0.0);
        assert_eq!(engine.zone_mood_summary().zones_tracked, 1);
    }

    #[test]
    fn test_person_events_drive_presence_stream() {
        let (_dir, mut engine) = engine();
        let sub = engine.subscribe("presence");

        engine.ingest(Event::new(1_000, "person.alice", "home")).unwrap();
        engine.ingest(Event::new(2_000, "person.alice", "kitchen")).unwrap();
        engine.ingest(Event::new(3_000, "person.alice", "not_home")).unwrap();

        let events = sub.drain();
        let tags: Vec<&str> = events
            .iter()
            .map(|e| e.tag())
            .filter(|t| *t != "state_changed")
            .collect();
        assert_eq!(
            tags,
            vec![
                "zone_entered",     // arrives home
                "presence_changed", // 0 → 1
                "zone_left",        // home → kitchen
                "zone_entered",
                "zone_left", // kitchen → gone
                "presence_changed", // 1 → 0
            ]
        );
    }

    #[test]
    fn test_shutdown_persists_synapses() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let mut engine = Engine::open(config).unwrap();
        engine.shutdown().unwrap();
        assert!(dir.path().join("synapses.json").exists());
        assert!(engine.cancel_token().is_cancelled());
    }
}
