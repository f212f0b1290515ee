//! # Hearth Core
//!
//! Privacy-first smart-home co-pilot core: a long-running inference
//! pipeline that ingests normalized state-change events and produces
//!
//! - **Live mood estimates** per household, via a three-layer neural
//!   pipeline (Context → State → Mood) with smoothing and dominant-mood
//!   selection
//! - **Discovered behavior rules** of the form "when A happens, B
//!   usually follows within Δt", mined with Wilson-lower-bound
//!   confidence, lift, and leverage, with optional zone scoping and
//!   context stratification
//! - **Candidate automations** the user can adopt or dismiss, with
//!   sticky dismissals and Hebbian feedback into the synapse network
//!
//! Underneath sits a bounded, time-decayed **brain graph**: entities,
//! zones, and concepts whose salience decays exponentially and whose
//! size is enforced by capacity pruning. All free text entering the
//! graph is PII-redacted.
//!
//! Transport (HTTP, IPC, CLI) is deliberately out of scope - the
//! contracts here are plain types a collaborator can wire up any way it
//! likes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hearth_core::{CoreConfig, Engine, Event};
//!
//! let mut engine = Engine::open(CoreConfig::default())?;
//!
//! // Feed normalized events
//! engine.ingest(Event::new(ts_ms, "light.kitchen", "on"))?;
//!
//! // Drive the neural pipeline
//! let tick = engine.tick(chrono::Utc::now());
//! println!("mood: {}", tick.dominant_mood);
//!
//! // Discover habits and surface candidates
//! let outcome = engine.mine_and_create_candidates(now_ms, false, None)?;
//! ```

// ============================================================================
// MODULES
// ============================================================================

pub mod cancel;
pub mod candidates;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod graph;
pub mod miner;
pub mod neurons;
pub mod synapses;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Cancellation
pub use cancel::{CancelToken, Cancelled};

// Errors
pub use error::{CoreError, ErrorKind};

// Configuration
pub use config::{
    ConfigError, CoreConfig, DispatchSettings, EventSettings, GraphConfig, NeuronSettings,
    SynapseSettings,
};

// Events
pub use event::{
    Event, EventError, EventIngress, EventKey, IngressOutcome, RawStateChange, ReplayRing,
    domain_of, normalize_state_change, split_key,
};

// Brain graph
pub use graph::{
    EdgeType, GetNodesPage, GetStateFilters, GetStateResult, GraphApi, GraphEdge, GraphNode,
    GraphStore, NodeKind, NodeSort, PatternSummary, Provenance, PruneReport, SortOrder,
    StorageError, StoreStats,
};

// Neural pipeline
pub use neurons::{
    EntityState, EvalContext, Evaluate, MoodNeuron, NeuronError, NeuronKind, NeuronManager,
    NeuronSnapshot, SUGGESTION_THRESHOLD, Suggestion, SuggestionQueue, TickResult, ZoneMood,
    ZoneMoodEngine, ZoneMoodSummary, ZoneProfile, ZoneRole,
};

// Habitus miner
pub use miner::{
    HabitusMiner, MinerError, MiningConfig, MiningOutcome, MiningReport, MiningStats,
    MiningStatus, Rule, RuleEvidence, RulesFilter, RulesSummary, SafetyBlocked, TopSuggestion,
    ZoneGovernance, ZoneMiner, ZoneMiningResult, latency_quantiles, mine_rules,
    mine_with_context, wilson_lower_bound,
};

// Candidates
pub use candidates::{
    Candidate, CandidateError, CandidateMetadata, CandidateState, CandidateStore, CreateOutcome,
    Decision,
};

// Synapses
pub use synapses::{Synapse, SynapseManager, SynapseState, SynapseStats, SynapseType};

// Dispatcher
pub use dispatch::{CoreEvent, Dispatcher, Subscription};

// Engine
pub use engine::{Engine, EngineError, MineOutcome};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        CancelToken, Candidate, CandidateState, CoreConfig, CoreError, CoreEvent, Decision,
        Dispatcher, Engine, ErrorKind, Event, GraphEdge, GraphNode, GraphStore, MiningConfig,
        MiningStatus, NeuronManager, Rule, Suggestion, TickResult,
    };
}
